// ============================================================
// Layer 6 — Tokenization Cache
// ============================================================
// Tokenising thousands of long articles is slow, so the result
// for each split is written to disk once and reused.
//
// Cache file layout (JSON):
//
//   {
//     "max_length":     1024,
//     "fingerprint":    "<sha256 hex>",
//     "input_ids":      [[0, 31414, ...], ...],
//     "attention_mask": [[1, 1, ..., 0], ...]
//   }
//
// The fingerprint covers the tokenizer definition, max_length
// and every input text. A cache whose fingerprint no longer
// matches is rebuilt instead of silently serving encodings of
// different texts.
//
// The file is written to "<name>.partial" and renamed into
// place, so an interrupted run leaves no cache behind.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    fs,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tokenizers::Tokenizer;

/// Progress is reported every this many articles.
pub const PROGRESS_EVERY: usize = 500;

/// Parallel arrays of fixed-length token ids and attention masks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Encodings {
    pub input_ids:      Vec<Vec<u32>>,
    pub attention_mask: Vec<Vec<u32>>,
}

impl Encodings {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct CacheFile {
    max_length:  usize,
    fingerprint: String,
    #[serde(flatten)]
    encodings:   Encodings,
}

/// Write-side view of CacheFile; serialises without copying the encodings.
#[derive(Serialize)]
struct CacheFileRef<'a> {
    max_length:  usize,
    fingerprint: &'a str,
    #[serde(flatten)]
    encodings:   &'a Encodings,
}

/// Tokenises texts to fixed-length encodings, backed by a file cache.
pub struct TokenCache<'a> {
    tokenizer:  &'a Tokenizer,
    max_length: usize,
}

impl<'a> TokenCache<'a> {
    /// `tokenizer` must already pad and truncate to `max_length`
    /// (see `tokenizer_store::configure_fixed_length`).
    pub fn new(tokenizer: &'a Tokenizer, max_length: usize) -> Self {
        Self { tokenizer, max_length }
    }

    /// Return encodings for `texts`, reading `cache_path` when it holds
    /// a matching cache and writing it otherwise.
    pub fn tokenize_with_cache(&self, texts: &[String], cache_path: &Path) -> Result<Encodings> {
        let fingerprint = self.fingerprint(texts)?;

        if let Some(cached) = self.read_cache(cache_path, &fingerprint)? {
            tracing::info!(
                "Reusing {} cached encodings from '{}'",
                cached.len(),
                cache_path.display()
            );
            return Ok(cached);
        }

        let encodings = self.tokenize_all(texts)?;
        self.write_cache(cache_path, fingerprint, &encodings)?;
        Ok(encodings)
    }

    fn tokenize_all(&self, texts: &[String]) -> Result<Encodings> {
        let mut input_ids      = Vec::with_capacity(texts.len());
        let mut attention_mask = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            let encoding = self
                .tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| anyhow!("Tokenisation error on article {i}: {e}"))?;

            let ids  = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            if ids.len() != self.max_length || mask.len() != self.max_length {
                return Err(anyhow!(
                    "Article {i} encoded to {} tokens, expected {}; \
                     is the tokenizer configured for fixed-length padding?",
                    ids.len(),
                    self.max_length
                ));
            }
            input_ids.push(ids.to_vec());
            attention_mask.push(mask.to_vec());

            if i % PROGRESS_EVERY == 0 {
                tracing::info!("[{}/{}] Tokenized...", i, texts.len());
            }
        }

        Ok(Encodings { input_ids, attention_mask })
    }

    fn read_cache(&self, path: &Path, fingerprint: &str) -> Result<Option<Encodings>> {
        let non_empty = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        if !non_empty {
            return Ok(None);
        }

        let file = fs::File::open(path)
            .with_context(|| format!("Cannot open token cache '{}'", path.display()))?;
        let cache: CacheFile = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Corrupt token cache '{}'", path.display()))?;

        if cache.max_length != self.max_length || cache.fingerprint != fingerprint {
            tracing::warn!(
                "Token cache '{}' was built for different texts or settings, rebuilding",
                path.display()
            );
            return Ok(None);
        }
        Ok(Some(cache.encodings))
    }

    fn write_cache(&self, path: &Path, fingerprint: String, encodings: &Encodings) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }

        let partial = partial_path(path);
        let cache = CacheFileRef {
            max_length: self.max_length,
            fingerprint: &fingerprint,
            encodings,
        };

        {
            let file = fs::File::create(&partial)
                .with_context(|| format!("Cannot create '{}'", partial.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &cache)
                .with_context(|| format!("Cannot serialise token cache to '{}'", partial.display()))?;
            writer.flush()?;
        }

        fs::rename(&partial, path)
            .with_context(|| format!("Cannot move token cache into '{}'", path.display()))?;

        tracing::info!(
            "Saved {} encodings to '{}'",
            encodings.len(),
            path.display()
        );
        Ok(())
    }

    fn fingerprint(&self, texts: &[String]) -> Result<String> {
        let definition = self
            .tokenizer
            .to_string(false)
            .map_err(|e| anyhow!("Cannot serialise tokenizer: {e}"))?;

        let mut hasher = Sha256::new();
        hasher.update(definition.as_bytes());
        hasher.update((self.max_length as u64).to_le_bytes());
        for text in texts {
            hasher.update((text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::NewsDataset;
    use crate::domain::article::BiasLabel;
    use crate::infra::tokenizer_store::{configure_fixed_length, word_level_tokenizer};
    use burn::data::dataset::Dataset;

    fn tokenizer(max_length: usize) -> Tokenizer {
        let words = ["economic", "policy", "article", "conservative", "opinion", "piece"];
        configure_fixed_length(word_level_tokenizer(&words), max_length).unwrap()
    }

    fn texts() -> Vec<String> {
        vec![
            format!("{} economic policy article", "a".repeat(2000)),
            format!("{} conservative opinion piece", "b".repeat(2000)),
        ]
    }

    #[test]
    fn test_long_articles_become_fixed_length_items() {
        let dir   = tempfile::tempdir().unwrap();
        let tok   = tokenizer(1024);
        let cache = TokenCache::new(&tok, 1024);

        let enc = cache
            .tokenize_with_cache(&texts(), &dir.path().join("train.json"))
            .unwrap();

        assert_eq!(enc.len(), 2);
        for i in 0..2 {
            assert_eq!(enc.input_ids[i].len(),      1024);
            assert_eq!(enc.attention_mask[i].len(), 1024);
        }

        let ds = NewsDataset::new(enc, vec![BiasLabel::Center, BiasLabel::Right]).unwrap();
        assert_eq!(ds.get(0).unwrap().label, 1);
        assert_eq!(ds.get(1).unwrap().label, 2);
    }

    #[test]
    fn test_second_call_reuses_cache_byte_for_byte() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("val.json");
        let tok  = tokenizer(16);
        let cache = TokenCache::new(&tok, 16);

        let first  = cache.tokenize_with_cache(&texts(), &path).unwrap();
        let bytes1 = fs::read(&path).unwrap();
        let mtime1 = fs::metadata(&path).unwrap().modified().unwrap();

        let second = cache.tokenize_with_cache(&texts(), &path).unwrap();
        let bytes2 = fs::read(&path).unwrap();
        let mtime2 = fs::metadata(&path).unwrap().modified().unwrap();

        assert_eq!(first, second);
        assert_eq!(bytes1, bytes2);
        assert_eq!(mtime1, mtime2);
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn test_empty_cache_file_is_rebuilt() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        fs::write(&path, b"").unwrap();

        let tok = tokenizer(8);
        let enc = TokenCache::new(&tok, 8).tokenize_with_cache(&texts(), &path).unwrap();
        assert_eq!(enc.len(), 2);
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_changed_texts_invalidate_cache() {
        let dir   = tempfile::tempdir().unwrap();
        let path  = dir.path().join("train.json");
        let tok   = tokenizer(8);
        let cache = TokenCache::new(&tok, 8);

        cache.tokenize_with_cache(&texts(), &path).unwrap();
        let other = vec!["opinion piece".to_string()];
        let enc   = cache.tokenize_with_cache(&other, &path).unwrap();

        assert_eq!(enc.len(), 1);
        assert_eq!(&enc.input_ids[0][..2], &[6, 7]);
    }

    #[test]
    fn test_corrupt_cache_is_an_error() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        fs::write(&path, b"{\"input_ids\": [[1, 2").unwrap();

        let tok = tokenizer(8);
        assert!(TokenCache::new(&tok, 8).tokenize_with_cache(&texts(), &path).is_err());
    }
}
