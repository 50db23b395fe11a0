// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that touch the filesystem:
//
//   checkpoint.rs      — checkpoint-<step> directories holding
//                        model weights (NamedMpk), trainer state
//                        and RNG state; training_args.json; and
//                        the resume-or-fresh model source
//
//   tokenizer_store.rs — loads the pretrained HuggingFace
//                        tokenizer and fixes its length
//                        (truncate + pad to max_length)
//
//   token_cache.rs     — tokenizes a split once and caches the
//                        ids/masks as JSON, keyed by a fingerprint
//
//   metrics.rs         — step and epoch metrics CSV logs
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Pretrained tokenizer loading
pub mod tokenizer_store;

/// On-disk tokenization cache
pub mod token_cache;

/// Training metrics CSV logger
pub mod metrics;
