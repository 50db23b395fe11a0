// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Re-scores a saved checkpoint on the validation split:
//
//   1. Load training_args.json from the output directory
//   2. Rebuild the same stratified split and validation cache
//   3. Pick the checkpoint: explicit, or the best one recorded
//      in the latest trainer state
//   4. Weighted loss + accuracy + macro-F1 on the inner backend

use anyhow::{anyhow, Result};
use burn::backend::{wgpu::WgpuDevice, Wgpu};
use std::path::PathBuf;

use crate::application::train_use_case::encode_split;
use crate::infra::checkpoint::{load_trainer_state, load_weights, CheckpointManager};
use crate::ml::{
    loss::{compute_class_weights, WeightedCrossEntropy},
    trainer::{evaluate, EvalOutput},
};

pub struct EvaluateUseCase {
    output_dir: PathBuf,
    checkpoint: Option<PathBuf>,
}

/// Result of `evaluate`, with the checkpoint it was computed from.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub checkpoint: PathBuf,
    pub articles:   usize,
    pub output:     EvalOutput,
}

impl EvaluateUseCase {
    pub fn new(output_dir: impl Into<PathBuf>, checkpoint: Option<PathBuf>) -> Self {
        Self { output_dir: output_dir.into(), checkpoint }
    }

    pub fn execute(&self) -> Result<EvaluationReport> {
        let manager = CheckpointManager::new(&self.output_dir)?;
        let cfg     = manager.load_config()?;

        let checkpoint = match &self.checkpoint {
            Some(dir) => dir.clone(),
            None      => self.best_checkpoint(&manager)?,
        };

        let (train_articles, val_articles) = cfg.load_split()?;
        let train_labels: Vec<_> = train_articles.iter().map(|a| a.label).collect();
        let loss_fn = WeightedCrossEntropy::new(compute_class_weights(&train_labels)?);

        let tokenizer   = cfg.load_tokenizer()?;
        let val_dataset = encode_split(&cfg, &tokenizer, val_articles, &cfg.val_cache)?;
        let articles    = val_dataset.labels().len();

        let device = WgpuDevice::default();
        let model  = load_weights(cfg.model.init::<Wgpu>(&device), &checkpoint, &device)?;
        tracing::info!("Evaluating '{}' on {} articles", checkpoint.display(), articles);

        let output = evaluate(&model, &loss_fn, val_dataset, cfg.training.eval_batch_size, &device);
        Ok(EvaluationReport { checkpoint, articles, output })
    }

    fn best_checkpoint(&self, manager: &CheckpointManager) -> Result<PathBuf> {
        let latest = manager.latest_checkpoint()?.ok_or_else(|| {
            anyhow!("No checkpoints found in '{}'", self.output_dir.display())
        })?;
        let state = load_trainer_state(&latest)?;
        Ok(state.best_model_checkpoint.unwrap_or(latest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::checkpoint::{RngState, TrainerState};
    use crate::ml::model::{tests::{backend_rng_guard, tiny_config}, BiasClassifier};
    use burn::backend::NdArray;

    fn save_run(manager: &CheckpointManager, best_step: Option<usize>) {
        let device = Default::default();
        let model: BiasClassifier<NdArray> = tiny_config(3).init(&device);
        for (epoch, step) in [(1, 2), (2, 4)] {
            let state = TrainerState {
                epoch,
                global_step: step,
                best_model_checkpoint: best_step.map(|s| manager.checkpoint_dir(s)),
                ..Default::default()
            };
            manager
                .save_checkpoint(&model, &state, &RngState { seed: 42, epoch })
                .unwrap();
        }
    }

    #[test]
    fn test_default_checkpoint_is_the_recorded_best() {
        let _guard  = backend_rng_guard();
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        save_run(&manager, Some(2));

        let use_case = EvaluateUseCase::new(dir.path(), None);
        assert_eq!(use_case.best_checkpoint(&manager).unwrap(), manager.checkpoint_dir(2));
    }

    #[test]
    fn test_falls_back_to_latest_without_a_recorded_best() {
        let _guard  = backend_rng_guard();
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        save_run(&manager, None);

        let use_case = EvaluateUseCase::new(dir.path(), None);
        assert_eq!(use_case.best_checkpoint(&manager).unwrap(), manager.checkpoint_dir(4));
    }

    #[test]
    fn test_empty_output_dir_is_an_error() {
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();

        let use_case = EvaluateUseCase::new(dir.path(), None);
        let err = use_case.best_checkpoint(&manager).unwrap_err();
        assert!(err.to_string().contains("No checkpoints found"));
    }

    #[test]
    fn test_execute_without_training_args_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = EvaluateUseCase::new(dir.path(), None).execute().unwrap_err();
        assert!(err.to_string().contains("training_args.json"));
    }
}
