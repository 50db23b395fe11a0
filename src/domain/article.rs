// ============================================================
// Layer 3 — Article Domain Type
// ============================================================
// A single news article with its political-bias label.
//
// Labels in the source data are -1 (left), 0 (center) and
// 1 (right). Loss and metric code work with zero-based class
// indices, so every label has a class index = label + 1:
//
//   label  -1  →  class 0
//   label   0  →  class 1
//   label   1  →  class 2
//
// Reference: Rust Book §5 (Structs), §6 (Enums)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Number of bias classes the classifier predicts.
pub const NUM_CLASSES: usize = 3;

/// The political-bias label of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum BiasLabel {
    Left,
    Center,
    Right,
}

impl BiasLabel {
    /// All labels, in class-index order.
    pub const ALL: [BiasLabel; NUM_CLASSES] = [BiasLabel::Left, BiasLabel::Center, BiasLabel::Right];

    /// Parse a raw label value as found in the dataset.
    pub fn from_raw(raw: i64) -> Result<Self> {
        match raw {
            -1 => Ok(BiasLabel::Left),
            0 => Ok(BiasLabel::Center),
            1 => Ok(BiasLabel::Right),
            other => bail!("label {other} is not one of -1, 0, 1"),
        }
    }

    /// The raw dataset value (-1, 0 or 1).
    pub fn raw(self) -> i64 {
        match self {
            BiasLabel::Left => -1,
            BiasLabel::Center => 0,
            BiasLabel::Right => 1,
        }
    }

    /// Zero-based class index (raw + 1).
    pub fn class_index(self) -> usize {
        (self.raw() + 1) as usize
    }

    /// Inverse of [`BiasLabel::class_index`].
    pub fn from_class_index(index: usize) -> Result<Self> {
        Self::from_raw(index as i64 - 1)
    }
}

impl TryFrom<i64> for BiasLabel {
    type Error = anyhow::Error;

    fn try_from(raw: i64) -> Result<Self> {
        Self::from_raw(raw)
    }
}

impl From<BiasLabel> for i64 {
    fn from(label: BiasLabel) -> Self {
        label.raw()
    }
}

/// A labelled news article. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Full article body
    pub text: String,

    /// Political-bias label
    pub label: BiasLabel,
}

impl Article {
    pub fn new(text: impl Into<String>, label: BiasLabel) -> Self {
        Self {
            text: text.into(),
            label,
        }
    }
}
