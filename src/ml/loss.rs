// ============================================================
// Layer 5 — Class Weights and Loss Functions
// ============================================================
// The training data is imbalanced across the three bias
// classes. Each class gets a "balanced" weight
//
//   weight(c) = n_samples / (n_classes * count(c))
//
// so rare classes contribute as much to the loss as common
// ones. Weights are computed from the TRAINING split only and
// fed to a weighted cross-entropy:
//
//   loss = Σ_i w[y_i] * -log softmax(logits_i)[y_i] / Σ_i w[y_i]
//
// The trainer takes the loss as a strategy (LossFunction) so a
// different objective can be plugged in without touching the
// training loop.

use anyhow::{bail, Result};
use burn::{nn::loss::CrossEntropyLossConfig, prelude::*};

use crate::domain::article::{BiasLabel, NUM_CLASSES};

/// Inverse-frequency weights for classes in the order -1, 0, 1.
pub fn compute_class_weights(labels: &[BiasLabel]) -> Result<[f32; NUM_CLASSES]> {
    if labels.is_empty() {
        bail!("cannot compute class weights from an empty training split");
    }

    let mut counts = [0usize; NUM_CLASSES];
    for label in labels {
        counts[label.class_index()] += 1;
    }

    let total = labels.len() as f64;
    let mut weights = [0f32; NUM_CLASSES];
    for (label, (&count, weight)) in BiasLabel::ALL.iter().zip(counts.iter().zip(weights.iter_mut())) {
        if count == 0 {
            bail!("label {} has no training examples", label.raw());
        }
        *weight = (total / (NUM_CLASSES as f64 * count as f64)) as f32;
    }

    tracing::info!(
        "Class counts {:?} → weights [{:.4}, {:.4}, {:.4}]",
        counts, weights[0], weights[1], weights[2]
    );
    Ok(weights)
}

/// A loss over class logits and zero-based integer targets.
pub trait LossFunction: Send + Sync {
    /// logits: [batch, num_classes], targets: [batch] → scalar loss [1]
    fn loss<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1>;
}

/// Cross-entropy with one weight per class.
#[derive(Debug, Clone)]
pub struct WeightedCrossEntropy {
    weights: Vec<f32>,
}

impl WeightedCrossEntropy {
    pub fn new(weights: impl Into<Vec<f32>>) -> Self {
        Self { weights: weights.into() }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

impl LossFunction for WeightedCrossEntropy {
    fn loss<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        // Built on the logits' device so the weights follow the model
        let ce = CrossEntropyLossConfig::new()
            .with_weights(Some(self.weights.clone()))
            .init(&logits.device());
        ce.forward(logits, targets)
    }
}
