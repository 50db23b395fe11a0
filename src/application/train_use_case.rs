// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load labelled articles from CSV      (Layer 4 - data)
//   Step 2: Stratified train/validation split    (Layer 4 - data)
//   Step 3: Load tokenizer (fixed length)        (Layer 6 - infra)
//   Step 4: Tokenize through the on-disk cache   (Layer 6 - infra)
//   Step 5: Build datasets (label + 1)           (Layer 4 - data)
//   Step 6: Class weights from the train split   (Layer 5 - ml)
//   Step 7: Save config                          (Layer 6 - infra)
//   Step 8: Run the weighted training loop       (Layer 5 - ml)
//
// Every relative path in TrainConfig resolves against data_root.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

use crate::data::{dataset::NewsDataset, loader::CsvArticleLoader, splitter::stratified_split};
use crate::domain::{
    article::{Article, NUM_CLASSES},
    traits::ArticleSource,
};
use crate::infra::{
    checkpoint::{CheckpointManager, TrainerState},
    metrics::MetricsLogger,
    token_cache::TokenCache,
    tokenizer_store::TokenizerStore,
};
use crate::ml::{
    loss::compute_class_weights,
    model::BiasClassifierConfig,
    trainer::{run_training, TrainingArgs},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything a run needs. Saved as training_args.json in the output
// directory so `evaluate` can rebuild the same split and model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_root:         PathBuf,
    pub csv_path:          PathBuf,
    pub train_cache:       PathBuf,
    pub val_cache:         PathBuf,
    pub tokenizer_path:    PathBuf,
    pub base_weights:      Option<PathBuf>,
    pub resume_checkpoint: Option<PathBuf>,
    pub output_dir:        PathBuf,
    pub logging_dir:       PathBuf,
    pub max_length:        usize,
    pub val_fraction:      f64,
    pub split_seed:        u64,
    pub training:          TrainingArgs,
    pub model:             BiasClassifierConfig,
}

/// Longformer-base sized encoder with a 3-way head.
pub fn default_model_config(max_length: usize) -> BiasClassifierConfig {
    BiasClassifierConfig::new(50265, max_length, 768, 12, 12, 3072, 0.1, NUM_CLASSES)
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_root:         PathBuf::from(".."),
            csv_path:          PathBuf::from("allsides_news_marked.csv"),
            train_cache:       PathBuf::from("train_longformer.json"),
            val_cache:         PathBuf::from("val_longformer.json"),
            tokenizer_path:    PathBuf::from("longformer-base-4096/tokenizer.json"),
            base_weights:      Some(PathBuf::from("longformer-base-4096/model.mpk")),
            resume_checkpoint: Some(PathBuf::from("results_phase2/checkpoint-9580")),
            output_dir:        PathBuf::from("results_LF_weighted"),
            logging_dir:       PathBuf::from("logs_longformer_weighted"),
            max_length:        1024,
            val_fraction:      0.2,
            split_seed:        42,
            training:          TrainingArgs::default(),
            model:             default_model_config(1024),
        }
    }
}

impl TrainConfig {
    /// Resolve a configured path against the data root.
    /// Absolute paths are returned unchanged.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.data_root.join(path)
    }

    /// Load the CSV and split it into (train, validation) articles.
    pub fn load_split(&self) -> Result<(Vec<Article>, Vec<Article>)> {
        let csv_path = self.resolve(&self.csv_path);
        tracing::info!("Loading articles from '{}'", csv_path.display());
        let articles = CsvArticleLoader::new(csv_path).load_all()?;
        ensure!(!articles.is_empty(), "no articles found in '{}'", self.csv_path.display());

        let (train, val) = stratified_split(articles, |a| a.label, self.val_fraction, self.split_seed);
        tracing::info!("Split: {} train, {} validation", train.len(), val.len());
        Ok((train, val))
    }

    pub fn load_tokenizer(&self) -> Result<Tokenizer> {
        let tokenizer = TokenizerStore::new(self.resolve(&self.tokenizer_path)).load(self.max_length)?;
        let vocab = tokenizer.get_vocab_size(true);
        ensure!(
            vocab <= self.model.vocab_size,
            "tokenizer vocabulary ({vocab}) exceeds the model's embedding table ({})",
            self.model.vocab_size
        );
        Ok(tokenizer)
    }
}

/// Tokenize `articles` through the cache at `cache_path` and wrap them
/// as a dataset.
pub fn encode_split(
    cfg:        &TrainConfig,
    tokenizer:  &Tokenizer,
    articles:   Vec<Article>,
    cache_path: &Path,
) -> Result<NewsDataset> {
    let (texts, labels): (Vec<String>, Vec<_>) = articles
        .into_iter()
        .map(|a| (a.text, a.label))
        .unzip();

    let encodings = TokenCache::new(tokenizer, cfg.max_length)
        .tokenize_with_cache(&texts, &cfg.resolve(cache_path))?;
    NewsDataset::new(encodings, labels)
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainerState> {
        let cfg = &self.config;
        ensure!(
            cfg.model.max_seq_len >= cfg.max_length,
            "model supports {} positions but max_length is {}",
            cfg.model.max_seq_len,
            cfg.max_length
        );

        // ── Steps 1-2: Load + stratified split ────────────────────────────────
        let (train_articles, val_articles) = cfg.load_split()?;

        // ── Step 3: Tokenizer (truncate + pad to max_length) ──────────────────
        let tokenizer = cfg.load_tokenizer()?;

        // ── Steps 4-5: Cached tokenization → datasets ─────────────────────────
        let train_dataset = encode_split(cfg, &tokenizer, train_articles, &cfg.train_cache)?;
        let val_dataset   = encode_split(cfg, &tokenizer, val_articles,   &cfg.val_cache)?;

        // ── Step 6: Class weights, training split only ────────────────────────
        let class_weights = compute_class_weights(train_dataset.labels())?;

        // ── Step 7: Save config for evaluation ────────────────────────────────
        let checkpoints = CheckpointManager::new(cfg.resolve(&cfg.output_dir))?;
        checkpoints.save_config(cfg)?;
        let logger = MetricsLogger::new(cfg.resolve(&cfg.logging_dir))?;

        // ── Step 8: Train ─────────────────────────────────────────────────────
        run_training(cfg, train_dataset, val_dataset, class_weights, checkpoints, logger)
    }
}
