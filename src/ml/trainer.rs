// ============================================================
// Layer 5 — Weighted Training Loop
// ============================================================
// Train + validation loop using Burn's DataLoader and AdamW,
// with the loss injected as a LossFunction strategy.
//
// Per optimizer step:
//   loss  = loss_fn(model(batch), labels) / accumulation_steps
//   grads = accumulate(loss.backward())
//   lr    = linear warmup, then linear decay to 0
//   grads = grads * min(1, max_grad_norm / ||grads||)   (global L2 norm)
//   model = AdamW(weight_decay).step(lr, grads)
//
// Per epoch:
//   evaluate on the validation set (weighted loss, accuracy,
//   macro-F1) → save checkpoint-<step> → track best model →
//   early stopping after `patience` epochs without improvement.
//
// At the end the weights of the best checkpoint are restored.
//
// Key Burn insight:
//   - Training uses Autodiff<Wgpu> (with balanced gradient
//     checkpointing) for gradients
//   - model.valid() returns the model on the inner backend,
//     so the validation batcher also uses the inner backend
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::{ensure, Result};
use burn::{
    backend::{
        autodiff::checkpoint::strategy::BalancedCheckpointing,
        wgpu::WgpuDevice,
        Autodiff, Wgpu,
    },
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{NewsBatch, NewsBatcher},
    dataset::NewsDataset,
};
use crate::domain::article::NUM_CLASSES;
use crate::infra::{
    checkpoint::{load_weights, CheckpointManager, ModelSource, RngState, TrainerState},
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    loss::{LossFunction, WeightedCrossEntropy},
    metrics::{compute_metrics, ClassificationMetrics, EvalPrediction},
    grad_clip::clip_grad_norm,
    model::{BiasClassifier, BiasClassifierConfig},
    schedule::LinearWarmupDecay,
};

/// Training backend: wgpu accelerator with gradient checkpointing.
pub type TrainBackend = Autodiff<Wgpu, BalancedCheckpointing>;

/// Validation metric used to pick the best checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BestMetric {
    Accuracy,
    F1,
}

impl BestMetric {
    pub fn pick(self, m: &ClassificationMetrics) -> f64 {
        match self {
            BestMetric::Accuracy => m.accuracy,
            BestMetric::F1       => m.f1,
        }
    }
}

impl FromStr for BestMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accuracy" => Ok(BestMetric::Accuracy),
            "f1"       => Ok(BestMetric::F1),
            other      => Err(format!("unknown metric '{other}', expected 'accuracy' or 'f1'")),
        }
    }
}

impl fmt::Display for BestMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BestMetric::Accuracy => write!(f, "accuracy"),
            BestMetric::F1       => write!(f, "f1"),
        }
    }
}

/// Hyperparameters of the training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingArgs {
    pub epochs:                      usize,
    pub train_batch_size:            usize,
    pub eval_batch_size:             usize,
    pub learning_rate:               f64,
    pub warmup_steps:                usize,
    pub weight_decay:                f64,
    pub max_grad_norm:               f64,
    pub gradient_accumulation_steps: usize,
    pub logging_steps:               usize,
    pub early_stopping_patience:     usize,
    pub metric_for_best_model:       BestMetric,
    pub seed:                        u64,
    pub num_workers:                 usize,
}

impl Default for TrainingArgs {
    fn default() -> Self {
        Self {
            epochs:                      5,
            train_batch_size:            4,
            eval_batch_size:             4,
            learning_rate:               2e-6,
            warmup_steps:                50,
            weight_decay:                0.01,
            max_grad_norm:               5.0,
            gradient_accumulation_steps: 1,
            logging_steps:               100,
            early_stopping_patience:     2,
            metric_for_best_model:       BestMetric::Accuracy,
            seed:                        42,
            num_workers:                 1,
        }
    }
}

/// Stops training after `patience` evaluations without improvement.
/// Higher metric values are better; ties do not count as improvement.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience:     usize,
    best:         Option<f64>,
    stale_epochs: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self { patience, best: None, stale_epochs: 0 }
    }

    /// Record an evaluation; returns true when it is a new best.
    pub fn update(&mut self, metric: f64) -> bool {
        let improved = self.best.map_or(true, |best| metric > best);
        if improved {
            self.best = Some(metric);
            self.stale_epochs = 0;
        } else {
            self.stale_epochs += 1;
        }
        improved
    }

    pub fn should_stop(&self) -> bool {
        self.patience > 0 && self.stale_epochs >= self.patience
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }
}

/// Result of one validation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalOutput {
    pub loss:    f64,
    pub metrics: ClassificationMetrics,
}

/// Result of a full training run.
pub struct TrainOutcome<B: Backend> {
    /// Model carrying the best checkpoint's weights
    pub model: BiasClassifier<B>,
    pub state: TrainerState,
}

/// Forward pass + loss. Returns the logits too when `return_outputs`.
pub fn compute_loss<B: Backend, L: LossFunction>(
    loss_fn:        &L,
    model:          &BiasClassifier<B>,
    batch:          NewsBatch<B>,
    return_outputs: bool,
) -> (Tensor<B, 1>, Option<Tensor<B, 2>>) {
    let labels = batch.labels;
    let logits = model.forward(batch.input_ids, batch.attention_mask);
    let loss   = loss_fn.loss(logits.clone(), labels);
    if return_outputs { (loss, Some(logits)) } else { (loss, None) }
}

/// Score `model` on every batch of `loader`.
pub fn evaluate_loader<B: Backend, L: LossFunction>(
    model:   &BiasClassifier<B>,
    loss_fn: &L,
    loader:  &Arc<dyn DataLoader<NewsBatch<B>>>,
) -> EvalOutput {
    let mut prediction = EvalPrediction::default();
    let mut loss_sum   = 0.0f64;
    let mut batches    = 0usize;

    for batch in loader.iter() {
        let labels = batch.labels.clone();
        let (loss, logits) = compute_loss(loss_fn, model, batch, true);
        loss_sum += loss.into_scalar().elem::<f64>();
        batches  += 1;

        if let Some(logits) = logits {
            let flat: Vec<f32> = logits.into_data().iter::<f32>().collect();
            prediction.extend(&flat, labels.into_data().iter::<i64>());
        }
    }

    EvalOutput {
        loss:    if batches > 0 { loss_sum / batches as f64 } else { f64::NAN },
        metrics: compute_metrics(&prediction),
    }
}

/// Score `model` on a whole dataset.
pub fn evaluate<B: Backend, L: LossFunction>(
    model:      &BiasClassifier<B>,
    loss_fn:    &L,
    dataset:    NewsDataset,
    batch_size: usize,
    device:     &B::Device,
) -> EvalOutput {
    let loader = DataLoaderBuilder::new(NewsBatcher::<B>::new(device.clone()))
        .batch_size(batch_size)
        .num_workers(1)
        .build(dataset);
    evaluate_loader(model, loss_fn, &loader)
}

/// The training loop, parameterised by backend and loss strategy.
pub struct WeightedTrainer<B: AutodiffBackend, L: LossFunction> {
    args:        TrainingArgs,
    loss_fn:     L,
    device:      B::Device,
    checkpoints: CheckpointManager,
    logger:      MetricsLogger,
}

impl<B: AutodiffBackend, L: LossFunction> WeightedTrainer<B, L> {
    pub fn new(
        args:        TrainingArgs,
        loss_fn:     L,
        device:      B::Device,
        checkpoints: CheckpointManager,
        logger:      MetricsLogger,
    ) -> Self {
        Self { args, loss_fn, device, checkpoints, logger }
    }

    pub fn compute_loss(
        &self,
        model:          &BiasClassifier<B>,
        batch:          NewsBatch<B>,
        return_outputs: bool,
    ) -> (Tensor<B, 1>, Option<Tensor<B, 2>>) {
        compute_loss(&self.loss_fn, model, batch, return_outputs)
    }

    /// Run to completion: all epochs, or until early stopping fires.
    pub fn train(
        &self,
        mut model:     BiasClassifier<B>,
        train_dataset: NewsDataset,
        eval_dataset:  NewsDataset,
    ) -> Result<TrainOutcome<B>> {
        let args = &self.args;
        ensure!(args.train_batch_size > 0 && args.eval_batch_size > 0, "batch sizes must be positive");
        ensure!(!train_dataset.is_empty(), "training split is empty");

        B::seed(args.seed);

        let accumulation      = args.gradient_accumulation_steps.max(1);
        let batches_per_epoch = train_dataset.len().div_ceil(args.train_batch_size);
        let steps_per_epoch   = batches_per_epoch.div_ceil(accumulation);
        let total_steps       = steps_per_epoch * args.epochs;
        let schedule = LinearWarmupDecay::new(args.learning_rate, args.warmup_steps, total_steps);

        tracing::info!(
            "Training on {} articles, validating on {} ({} epochs, {} optimizer steps)",
            train_dataset.len(),
            eval_dataset.len(),
            args.epochs,
            total_steps,
        );

        // ── AdamW; gradients are clipped by global norm in optimizer_step ─────
        let mut optim = AdamWConfig::new()
            .with_weight_decay(args.weight_decay as f32)
            .init::<B, BiasClassifier<B>>();

        let train_loader = DataLoaderBuilder::new(NewsBatcher::<B>::new(self.device.clone()))
            .batch_size(args.train_batch_size)
            .shuffle(args.seed)
            .num_workers(args.num_workers)
            .build(train_dataset);

        // Validation uses the inner backend — no autodiff overhead
        let eval_loader = DataLoaderBuilder::new(NewsBatcher::<B::InnerBackend>::new(self.device.clone()))
            .batch_size(args.eval_batch_size)
            .num_workers(args.num_workers)
            .build(eval_dataset);

        let mut state       = TrainerState::default();
        let mut stopper     = EarlyStopping::new(args.early_stopping_patience);
        let mut accumulator = GradientsAccumulator::<BiasClassifier<B>>::new();

        for epoch in 1..=args.epochs {
            let mut epoch_loss_sum  = 0.0f64;
            let mut epoch_batches   = 0usize;
            let mut window_loss_sum = 0.0f64;
            let mut window_batches  = 0usize;
            let mut pending         = 0usize;

            for batch in train_loader.iter() {
                let (loss, _) = self.compute_loss(&model, batch, false);

                let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
                epoch_loss_sum  += loss_val;
                epoch_batches   += 1;
                window_loss_sum += loss_val;
                window_batches  += 1;

                let grads = (loss / accumulation as f64).backward();
                let grads = GradientsParams::from_grads(grads, &model);
                accumulator.accumulate(&model, grads);
                pending += 1;

                if pending == accumulation {
                    model = self.optimizer_step(&mut optim, model, &mut accumulator, &schedule, &mut state);
                    pending = 0;

                    if args.logging_steps > 0 && state.global_step % args.logging_steps == 0 {
                        let avg = window_loss_sum / window_batches.max(1) as f64;
                        let lr  = schedule.lr_at(state.global_step - 1);
                        tracing::info!("step {} | loss={:.4} | lr={:e}", state.global_step, avg, lr);
                        self.logger.log_step(state.global_step, epoch, avg, lr)?;
                        window_loss_sum = 0.0;
                        window_batches  = 0;
                    }
                }
            }

            // Flush a partial accumulation window at the end of the epoch
            if pending > 0 {
                model = self.optimizer_step(&mut optim, model, &mut accumulator, &schedule, &mut state);
            }

            let train_loss = if epoch_batches > 0 {
                epoch_loss_sum / epoch_batches as f64
            } else { f64::NAN };

            // ── Validation phase ──────────────────────────────────────────────
            // model.valid() → BiasClassifier<B::InnerBackend>, dropout disabled
            let eval = evaluate_loader(&model.valid(), &self.loss_fn, &eval_loader);

            println!(
                "Epoch {:>3}/{} | train_loss={:.4} | eval_loss={:.4} | accuracy={:.1}% | f1={:.4}",
                epoch, args.epochs, train_loss, eval.loss,
                eval.metrics.accuracy * 100.0, eval.metrics.f1,
            );

            let row = EpochMetrics {
                epoch,
                step:       state.global_step,
                train_loss,
                eval_loss:  eval.loss,
                accuracy:   eval.metrics.accuracy,
                f1:         eval.metrics.f1,
            };
            self.logger.log_epoch(&row)?;
            state.epoch = epoch;
            state.log_history.push(row);

            // ── Best model + checkpoint ───────────────────────────────────────
            let score = args.metric_for_best_model.pick(&eval.metrics);
            if stopper.update(score) {
                state.best_metric = Some(score);
                state.best_model_checkpoint = Some(self.checkpoints.checkpoint_dir(state.global_step));
                tracing::info!("New best {} = {:.4}", args.metric_for_best_model, score);
            }
            self.checkpoints.save_checkpoint(&model, &state, &RngState { seed: args.seed, epoch })?;

            if stopper.should_stop() {
                tracing::info!(
                    "Early stopping: no {} improvement for {} epochs",
                    args.metric_for_best_model,
                    args.early_stopping_patience,
                );
                break;
            }
        }

        if let Some(best) = &state.best_model_checkpoint {
            tracing::info!("Loading best model from '{}'", best.display());
            model = load_weights(model, best, &self.device)?;
        }

        tracing::info!("Training complete!");
        Ok(TrainOutcome { model, state })
    }

    fn optimizer_step<O: Optimizer<BiasClassifier<B>, B>>(
        &self,
        optim:       &mut O,
        model:       BiasClassifier<B>,
        accumulator: &mut GradientsAccumulator<BiasClassifier<B>>,
        schedule:    &LinearWarmupDecay,
        state:       &mut TrainerState,
    ) -> BiasClassifier<B> {
        let (grads, norm) = clip_grad_norm::<B, _>(&model, accumulator.grads(), self.args.max_grad_norm);
        let lr = schedule.lr_at(state.global_step);
        state.global_step += 1;
        tracing::debug!("step {} | grad_norm={:.4}", state.global_step, norm);
        optim.step(lr, model, grads)
    }
}

/// Seed the backend, then build the model from `source`, so random
/// initialisation follows `seed`.
pub fn seeded_model<B: Backend>(
    source: &ModelSource,
    config: &BiasClassifierConfig,
    seed:   u64,
    device: &B::Device,
) -> Result<BiasClassifier<B>> {
    B::seed(seed);
    source.load::<B>(config, device)
}

// ─── Entry point ─────────────────────────────────────────────────────────────
/// Build the model on the accelerator and train it with class-weighted
/// cross-entropy. Returns the final trainer state.
pub fn run_training(
    cfg:           &TrainConfig,
    train_dataset: NewsDataset,
    val_dataset:   NewsDataset,
    class_weights: [f32; NUM_CLASSES],
    checkpoints:   CheckpointManager,
    logger:        MetricsLogger,
) -> Result<TrainerState> {
    let device = WgpuDevice::default();
    TrainBackend::sync(&device);

    let resume = cfg.resume_checkpoint.as_ref().map(|p| cfg.resolve(p));
    let base   = cfg.base_weights.as_ref().map(|p| cfg.resolve(p));
    let source = ModelSource::resolve(resume.as_deref(), base.as_deref());

    let model = seeded_model::<TrainBackend>(&source, &cfg.model, cfg.training.seed, &device)?;
    tracing::info!("Model ready: {} parameters", model.num_params());

    let trainer = WeightedTrainer::<TrainBackend, _>::new(
        cfg.training.clone(),
        WeightedCrossEntropy::new(class_weights),
        device,
        checkpoints,
        logger,
    );
    let outcome = trainer.train(model, train_dataset, val_dataset)?;

    if let Some(best) = &outcome.state.best_model_checkpoint {
        tracing::info!(
            "Best {} = {:.4} at '{}'",
            cfg.training.metric_for_best_model,
            outcome.state.best_metric.unwrap_or_default(),
            best.display()
        );
    }
    Ok(outcome.state)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::article::BiasLabel;
    use crate::infra::token_cache::Encodings;
    use crate::ml::{
        loss::WeightedCrossEntropy,
        model::tests::{backend_rng_guard, tiny_config},
    };
    use burn::{backend::NdArray, data::dataloader::batcher::Batcher};

    type B = Autodiff<NdArray>;

    fn dataset(labels: &[BiasLabel]) -> NewsDataset {
        let encodings = Encodings {
            input_ids:      labels.iter().map(|l| vec![2 + l.class_index() as u32, 5, 6, 0]).collect(),
            attention_mask: labels.iter().map(|_| vec![1, 1, 1, 0]).collect(),
        };
        NewsDataset::new(encodings, labels.to_vec()).unwrap()
    }

    #[test]
    fn test_early_stopping_waits_for_patience() {
        let mut es = EarlyStopping::new(2);
        assert!(es.update(0.5));
        assert!(!es.update(0.5));
        assert!(!es.should_stop());
        assert!(!es.update(0.4));
        assert!(es.should_stop());
        assert_eq!(es.best(), Some(0.5));
    }

    #[test]
    fn test_improvement_resets_patience() {
        let mut es = EarlyStopping::new(2);
        es.update(0.5);
        es.update(0.4);
        assert!(es.update(0.6));
        es.update(0.6);
        assert!(!es.should_stop());
    }

    #[test]
    fn test_best_metric_parses_from_cli_strings() {
        assert_eq!("accuracy".parse::<BestMetric>().unwrap(), BestMetric::Accuracy);
        assert_eq!("f1".parse::<BestMetric>().unwrap(), BestMetric::F1);
        assert!("loss".parse::<BestMetric>().is_err());
    }

    #[test]
    fn test_compute_loss_returns_outputs_on_request() {
        let _guard  = backend_rng_guard();
        let device  = Default::default();
        let model   = tiny_config(3).init::<B>(&device);
        let batcher = NewsBatcher::<B>::new(device);
        let items   = (0..3).filter_map(|i| dataset(&BiasLabel::ALL).get(i)).collect::<Vec<_>>();
        let loss_fn = WeightedCrossEntropy::new([1.0, 2.0, 3.0]);

        let (loss, outputs) = compute_loss(&loss_fn, &model, batcher.batch(items.clone()), true);
        assert_eq!(loss.dims(), [1]);
        assert_eq!(outputs.unwrap().dims(), [3, 3]);

        let (_, outputs) = compute_loss(&loss_fn, &model, batcher.batch(items), false);
        assert!(outputs.is_none());
    }

    #[test]
    fn test_seed_makes_fresh_initialisation_reproducible() {
        let _guard = backend_rng_guard();
        let device = Default::default();
        let source = ModelSource::Fresh { base_weights: None };

        let out_proj = |seed: u64| -> Vec<f32> {
            let model = seeded_model::<B>(&source, &tiny_config(3), seed, &device).unwrap();
            model.head.out_proj.weight.val().into_data().to_vec::<f32>().unwrap()
        };

        assert_eq!(out_proj(7), out_proj(7));
        assert_ne!(out_proj(7), out_proj(8));
    }

    #[test]
    fn test_short_training_run_checkpoints_every_epoch() {
        let _guard = backend_rng_guard();
        let out    = tempfile::tempdir().unwrap();
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;

        let labels = [
            BiasLabel::Left, BiasLabel::Center, BiasLabel::Right,
            BiasLabel::Left, BiasLabel::Center, BiasLabel::Right,
        ];
        let args = TrainingArgs {
            epochs:                  2,
            train_batch_size:        4,
            eval_batch_size:         2,
            learning_rate:           1e-3,
            warmup_steps:            1,
            logging_steps:           1,
            early_stopping_patience: 0,
            ..Default::default()
        };
        let model   = tiny_config(3).init::<B>(&device);
        let trainer = WeightedTrainer::<B, _>::new(
            args,
            WeightedCrossEntropy::new([1.0, 1.0, 1.0]),
            device,
            CheckpointManager::new(out.path().join("results")).unwrap(),
            MetricsLogger::new(out.path().join("logs")).unwrap(),
        );

        let outcome = trainer
            .train(model, dataset(&labels), dataset(&labels[..3]))
            .unwrap();

        // 6 articles / batch 4 → 2 optimizer steps per epoch
        assert_eq!(outcome.state.global_step, 4);
        assert_eq!(outcome.state.epoch, 2);
        assert_eq!(outcome.state.log_history.len(), 2);
        assert!(out.path().join("results/checkpoint-2/model.mpk").exists());
        assert!(out.path().join("results/checkpoint-4/rng_state.json").exists());

        let best = outcome.state.best_model_checkpoint.unwrap();
        assert!(best.ends_with("checkpoint-2") || best.ends_with("checkpoint-4"));
        for row in &outcome.state.log_history {
            assert!((0.0..=1.0).contains(&row.accuracy));
            assert!(row.train_loss.is_finite());
        }

        let steps = std::fs::read_to_string(out.path().join("logs/train_steps.csv")).unwrap();
        assert_eq!(steps.lines().count(), 1 + 4);
    }
}
