// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the raw CSV to device-ready tensor batches.
//
//   allsides_news_marked.csv
//       │
//       ▼
//   CsvArticleLoader  → reads rows, parses labels
//       │
//       ▼
//   stratified_split  → train / validation, per-class quotas
//       │
//       ▼
//   TokenCache        → fixed-length ids + masks (Layer 6, cached)
//       │
//       ▼
//   NewsDataset       → implements Burn's Dataset trait
//       │
//       ▼
//   NewsBatcher       → stacks items into tensor batches
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads labelled articles from CSV
pub mod loader;

/// Implements Burn's Dataset trait for tokenised articles
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Stratified train/validation split
pub mod splitter;
