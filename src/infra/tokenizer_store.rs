// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads a HuggingFace `tokenizer.json` (e.g. the one shipped
// with allenai/longformer-base-4096) and configures it so every
// encoding is exactly `max_length` tokens:
//
//   - truncation on the right at max_length
//   - fixed-length padding with the tokenizer's own pad token
//
// The pad token is looked up by name: RoBERTa-family
// tokenizers use "<pad>" (id 1), BERT-family "[PAD]" (id 0).

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

const PAD_TOKEN_CANDIDATES: [&str; 2] = ["<pad>", "[PAD]"];

pub struct TokenizerStore {
    path: PathBuf,
}

impl TokenizerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the tokenizer and configure fixed-length encoding.
    pub fn load(&self, max_length: usize) -> Result<Tokenizer> {
        let tokenizer = Tokenizer::from_file(&self.path).map_err(|e| {
            anyhow!("Cannot load tokenizer from '{}': {}", self.path.display(), e)
        })?;
        tracing::info!("Loaded tokenizer from '{}'", self.path.display());
        configure_fixed_length(tokenizer, max_length)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Enable truncation and fixed padding to `max_length`.
pub fn configure_fixed_length(mut tokenizer: Tokenizer, max_length: usize) -> Result<Tokenizer> {
    let (pad_token, pad_id) = PAD_TOKEN_CANDIDATES
        .iter()
        .find_map(|t| tokenizer.token_to_id(t).map(|id| (t.to_string(), id)))
        .unwrap_or_else(|| {
            tracing::warn!("Tokenizer has no pad token, padding with id 0");
            ("[PAD]".to_string(), 0)
        });

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| anyhow!("Invalid truncation settings: {e}"))?;

    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::Fixed(max_length),
        pad_id,
        pad_token,
        ..Default::default()
    }));

    Ok(tokenizer)
}

/// Build a word-level tokenizer in HuggingFace JSON format.
/// Ids 0 and 1 are reserved for [PAD] and [UNK].
#[cfg(test)]
pub(crate) fn word_level_tokenizer(words: &[&str]) -> Tokenizer {
    use std::str::FromStr;

    let mut vocab = serde_json::json!({ "[PAD]": 0, "[UNK]": 1 });
    for (i, word) in words.iter().enumerate() {
        vocab[*word] = serde_json::json!(i + 2);
    }

    let tokenizer_json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 0, "content": "[PAD]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 1, "content": "[UNK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "[UNK]"
        }
    });

    Tokenizer::from_str(&tokenizer_json.to_string()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodings_have_fixed_length() {
        let tok = configure_fixed_length(word_level_tokenizer(&["hello", "world"]), 8).unwrap();

        let short = tok.encode("hello world", true).unwrap();
        assert_eq!(short.get_ids(), &[2, 3, 0, 0, 0, 0, 0, 0]);
        assert_eq!(short.get_attention_mask(), &[1, 1, 0, 0, 0, 0, 0, 0]);

        let long = tok.encode("hello ".repeat(20).as_str(), true).unwrap();
        assert_eq!(long.get_ids().len(), 8);
        assert!(long.get_attention_mask().iter().all(|&m| m == 1));
    }

    #[test]
    fn test_load_round_trips_through_file() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        word_level_tokenizer(&["news"]).save(&path, false).unwrap();

        let tok = TokenizerStore::new(&path).load(4).unwrap();
        assert_eq!(tok.encode("news", true).unwrap().get_ids(), &[2, 0, 0, 0]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(TokenizerStore::new("/no/such/tokenizer.json").load(16).is_err());
    }
}
