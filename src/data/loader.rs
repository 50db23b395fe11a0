// ============================================================
// Layer 4 — Article Loader
// ============================================================
// Loads labelled news articles from a CSV file using the csv
// crate.
//
// Expected layout (extra columns are ignored):
//
//   text,label,...
//   "Lawmakers met on Tuesday to ...",-1,...
//   "The administration announced ...",0,...
//
// Labels may be written as integers or as integral floats
// ("1.0"), which is what spreadsheet exports often produce.
//
// Reference: csv crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::domain::article::{Article, BiasLabel};
use crate::domain::traits::ArticleSource;

/// One raw CSV row — only the columns we need.
#[derive(Debug, Deserialize)]
struct ArticleRow {
    #[serde(default)]
    text:  Option<String>,
    label: String,
}

/// Loads articles from a `text,label` CSV file.
/// Implements the ArticleSource trait from Layer 3.
pub struct CsvArticleLoader {
    path: PathBuf,
}

impl CsvArticleLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ArticleSource for CsvArticleLoader {
    fn load_all(&self) -> Result<Vec<Article>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Cannot open dataset '{}'", self.path.display()))?;

        check_required_columns(&mut reader, &self.path)?;

        let mut articles = Vec::new();
        for (i, row) in reader.deserialize::<ArticleRow>().enumerate() {
            // Row numbers are 1-based and skip the header line
            let line = i + 2;
            let row = row.with_context(|| {
                format!("Malformed row {line} in '{}'", self.path.display())
            })?;
            let label = parse_label(&row.label).with_context(|| {
                format!("Invalid label on row {line} in '{}'", self.path.display())
            })?;
            articles.push(Article::new(row.text.unwrap_or_default(), label));
        }

        tracing::info!(
            "Loaded {} articles from '{}'",
            articles.len(),
            self.path.display()
        );
        Ok(articles)
    }
}

fn check_required_columns<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
    path:   &Path,
) -> Result<()> {
    let headers = reader
        .headers()
        .with_context(|| format!("Cannot read header row of '{}'", path.display()))?;

    for column in ["text", "label"] {
        if !headers.iter().any(|h| h.trim() == column) {
            bail!("Dataset '{}' has no '{}' column", path.display(), column);
        }
    }
    Ok(())
}

/// Parse "1", "-1", "0" as well as integral floats like "1.0".
fn parse_label(raw: &str) -> Result<BiasLabel> {
    let raw = raw.trim();
    let value = match raw.parse::<i64>() {
        Ok(v) => v,
        Err(_) => {
            let f: f64 = raw
                .parse()
                .map_err(|_| anyhow!("'{raw}' is not a number"))?;
            if f.fract() != 0.0 {
                bail!("'{raw}' is not an integer label");
            }
            f as i64
        }
    };
    BiasLabel::from_raw(value)
}
