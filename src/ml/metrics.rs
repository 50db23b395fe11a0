// ============================================================
// Layer 5 — Evaluation Metrics
// ============================================================
// Turns raw logits into accuracy and macro-averaged F1.
//
// Inputs live in class-index space (0..3). Both labels and
// arg-max predictions are shifted back by -1 into the raw
// label space {-1, 0, 1} before scoring.
//
// Macro-F1 averages the per-label F1 over every label that
// occurs in either the ground truth or the predictions; a label
// with no true positives and a zero denominator scores 0.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::article::NUM_CLASSES;

/// Raw model output for an evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct EvalPrediction {
    /// One row of logits per article — shape (N, 3)
    pub predictions: Vec<[f32; NUM_CLASSES]>,

    /// Ground-truth class indices (label + 1) — length N
    pub label_ids: Vec<i64>,
}

impl EvalPrediction {
    pub fn extend(&mut self, logits: &[f32], label_ids: impl IntoIterator<Item = i64>) {
        for row in logits.chunks_exact(NUM_CLASSES) {
            let mut r = [0f32; NUM_CLASSES];
            r.copy_from_slice(row);
            self.predictions.push(r);
        }
        self.label_ids.extend(label_ids);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub f1:       f64,
}

impl ClassificationMetrics {
    /// Metrics keyed by name: exactly "accuracy" and "f1".
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("accuracy".to_string(), self.accuracy),
            ("f1".to_string(),       self.f1),
        ])
    }
}

/// Index of the largest logit; the first one wins on ties.
pub fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

pub fn compute_metrics(pred: &EvalPrediction) -> ClassificationMetrics {
    let labels: Vec<i64> = pred.label_ids.iter().map(|&l| l - 1).collect();
    let preds:  Vec<i64> = pred
        .predictions
        .iter()
        .map(|row| argmax(row) as i64 - 1)
        .collect();

    ClassificationMetrics {
        accuracy: accuracy_score(&labels, &preds),
        f1:       macro_f1_score(&labels, &preds),
    }
}

fn accuracy_score(labels: &[i64], preds: &[i64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = labels.iter().zip(preds).filter(|(l, p)| l == p).count();
    correct as f64 / labels.len() as f64
}

fn macro_f1_score(labels: &[i64], preds: &[i64]) -> f64 {
    let classes: BTreeSet<i64> = labels.iter().chain(preds).copied().collect();
    if classes.is_empty() {
        return 0.0;
    }

    let total: f64 = classes
        .iter()
        .map(|&c| {
            let mut tp = 0usize;
            let mut fp = 0usize;
            let mut fn_ = 0usize;
            for (&l, &p) in labels.iter().zip(preds) {
                match (l == c, p == c) {
                    (true, true)  => tp  += 1,
                    (false, true) => fp  += 1,
                    (true, false) => fn_ += 1,
                    (false, false) => {}
                }
            }
            let denom = 2 * tp + fp + fn_;
            if denom == 0 { 0.0 } else { 2.0 * tp as f64 / denom as f64 }
        })
        .sum();

    total / classes.len() as f64
}
