use anyhow::{ensure, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::article::BiasLabel;
use crate::infra::token_cache::Encodings;

/// One tokenised article, ready for batching.
/// `label` is the zero-based class index (raw label + 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub label:          i64,
}

/// Read-only view over cached encodings and their labels.
pub struct NewsDataset {
    encodings: Encodings,
    labels:    Vec<BiasLabel>,
}

impl NewsDataset {
    pub fn new(encodings: Encodings, labels: Vec<BiasLabel>) -> Result<Self> {
        ensure!(
            encodings.len() == labels.len(),
            "encodings ({}) and labels ({}) differ in length",
            encodings.len(),
            labels.len()
        );
        Ok(Self { encodings, labels })
    }

    pub fn labels(&self) -> &[BiasLabel] { &self.labels }
}

impl Dataset<NewsItem> for NewsDataset {
    fn get(&self, index: usize) -> Option<NewsItem> {
        let label = self.labels.get(index)?;
        Some(NewsItem {
            input_ids:      self.encodings.input_ids.get(index)?.clone(),
            attention_mask: self.encodings.attention_mask.get(index)?.clone(),
            label:          label.class_index() as i64,
        })
    }

    fn len(&self) -> usize {
        self.labels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encodings(n: usize) -> Encodings {
        Encodings {
            input_ids:      (0..n).map(|i| vec![i as u32; 4]).collect(),
            attention_mask: (0..n).map(|_| vec![1, 1, 0, 0]).collect(),
        }
    }

    #[test]
    fn test_labels_are_shifted_into_class_space() {
        let ds = NewsDataset::new(
            encodings(3),
            vec![BiasLabel::Left, BiasLabel::Center, BiasLabel::Right],
        ).unwrap();

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.get(0).unwrap().label, 0);
        assert_eq!(ds.get(1).unwrap().label, 1);
        assert_eq!(ds.get(2).unwrap().label, 2);
        assert_eq!(ds.get(1).unwrap().input_ids, vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_out_of_bounds_is_none() {
        let ds = NewsDataset::new(encodings(1), vec![BiasLabel::Center]).unwrap();
        assert!(ds.get(1).is_none());
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        assert!(NewsDataset::new(encodings(2), vec![BiasLabel::Center]).is_err());
    }
}
