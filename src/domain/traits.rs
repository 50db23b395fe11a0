// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer programs against these traits so the
// concrete readers can be swapped without touching the
// training workflow.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use crate::domain::article::Article;

// ─── ArticleSource ────────────────────────────────────────────────────────────
/// Any component that can load labelled articles.
///
/// Implementations:
///   - CsvArticleLoader → reads a `text,label` CSV file
pub trait ArticleSource {
    /// Load every labelled article from this source.
    fn load_all(&self) -> Result<Vec<Article>>;
}
