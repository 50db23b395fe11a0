// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// The model, the objective and the training loop.
//
// What's in this layer:
//
//   model.rs    — Transformer encoder with a classification head
//                 • Token + positional embeddings
//                 • Multi-head self-attention (padding masked)
//                 • Feed-forward networks (GELU activation)
//                 • Dense → tanh → projection over the first token
//
//   loss.rs     — Balanced class weights and the pluggable
//                 LossFunction strategy (weighted cross-entropy)
//
//   metrics.rs  — Accuracy and macro-F1 from raw logits
//
//   schedule.rs — Linear warmup / linear decay learning rate
//
//   grad_clip.rs — Gradient clipping by global L2 norm
//
//   trainer.rs  — The training loop: AdamW, global-norm clipping,
//                 per-epoch evaluation, checkpoints, early stopping
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need

/// Transformer encoder classifier
pub mod model;

/// Class weights and loss strategies
pub mod loss;

/// Evaluation metrics
pub mod metrics;

/// Learning-rate schedule
pub mod schedule;

/// Global-norm gradient clipping
pub mod grad_clip;

/// Full training loop with validation and checkpointing
pub mod trainer;
