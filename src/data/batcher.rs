// ============================================================
// Layer 4 — News Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<NewsItem>
// into device tensors.
//
//   Input:  Vec of N NewsItems, each with sequences of length S
//   Output: NewsBatch with tensors [N, S], [N, S] and [N]
//
// All sequences are already padded to max_length by the
// tokenization cache, so stacking is a flatten + reshape.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::NewsItem;

/// A batch of tokenised articles for the model forward pass.
#[derive(Debug, Clone)]
pub struct NewsBatch<B: Backend> {
    /// Token ID sequences — shape: [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// Attention masks — shape: [batch_size, seq_len]
    /// 1 = real token, 0 = padding
    pub attention_mask: Tensor<B, 2, Int>,

    /// Class indices in 0..3 — shape: [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct NewsBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> NewsBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<NewsItem, NewsBatch<B>> for NewsBatcher<B> {
    fn batch(&self, items: Vec<NewsItem>) -> NewsBatch<B> {
        let batch_size = items.len();
        let seq_len    = items.first().map_or(0, |s| s.input_ids.len());

        let input_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.input_ids.iter().map(|&x| x as i32))
            .collect();

        let mask_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.attention_mask.iter().map(|&x| x as i32))
            .collect();

        let labels: Vec<i32> = items.iter().map(|s| s.label as i32).collect();

        let input_ids = Tensor::<B, 1, Int>::from_ints(
            input_flat.as_slice(), &self.device
        ).reshape([batch_size, seq_len]);

        let attention_mask = Tensor::<B, 1, Int>::from_ints(
            mask_flat.as_slice(), &self.device
        ).reshape([batch_size, seq_len]);

        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        NewsBatch { input_ids, attention_mask, labels }
    }
}
