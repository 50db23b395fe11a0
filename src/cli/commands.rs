// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `evaluate`, and all
// their configurable flags. Every default matches the values
// the production run used.
//
// Relative paths are resolved against --data-root.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::{default_model_config, TrainConfig};
use crate::ml::trainer::{BestMetric, TrainingArgs};

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune the bias classifier with class-weighted loss
    Train(TrainArgs),

    /// Score a saved checkpoint on the validation split
    Evaluate(EvaluateArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory every other relative path is resolved against
    #[arg(long, default_value = "..")]
    pub data_root: PathBuf,

    /// Labelled articles (needs `text` and `label` columns)
    #[arg(long, default_value = "allsides_news_marked.csv")]
    pub csv: PathBuf,

    #[arg(long, default_value = "train_longformer.json")]
    pub train_cache: PathBuf,

    #[arg(long, default_value = "val_longformer.json")]
    pub val_cache: PathBuf,

    /// HuggingFace tokenizer.json
    #[arg(long, default_value = "longformer-base-4096/tokenizer.json")]
    pub tokenizer: PathBuf,

    /// Pretrained base weights, used when no checkpoint is resumed
    #[arg(long, default_value = "longformer-base-4096/model.mpk")]
    pub base_weights: PathBuf,

    /// Start from random weights instead of the pretrained base
    /// when no checkpoint is resumed
    #[arg(long)]
    pub random_init: bool,

    /// Checkpoint to resume from (ignored if it does not exist)
    #[arg(long, default_value = "results_phase2/checkpoint-9580")]
    pub resume_checkpoint: PathBuf,

    #[arg(long, default_value = "results_LF_weighted")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "logs_longformer_weighted")]
    pub logging_dir: PathBuf,

    /// Tokens per article after truncation/padding
    #[arg(long, default_value_t = 1024)]
    pub max_length: usize,

    /// Fraction of articles held out for validation
    #[arg(long, default_value_t = 0.2)]
    pub val_fraction: f64,

    /// Seed for the stratified split
    #[arg(long, default_value_t = 42)]
    pub split_seed: u64,

    #[arg(long, default_value_t = 5)]
    pub epochs: usize,

    #[arg(long, default_value_t = 4)]
    pub train_batch_size: usize,

    #[arg(long, default_value_t = 4)]
    pub eval_batch_size: usize,

    #[arg(long, default_value_t = 2e-6)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 50)]
    pub warmup_steps: usize,

    #[arg(long, default_value_t = 0.01)]
    pub weight_decay: f64,

    /// Global gradient-norm clipping threshold
    #[arg(long, default_value_t = 5.0)]
    pub max_grad_norm: f64,

    #[arg(long, default_value_t = 1)]
    pub gradient_accumulation_steps: usize,

    /// Log mean training loss every N optimizer steps
    #[arg(long, default_value_t = 100)]
    pub logging_steps: usize,

    /// Epochs without improvement before stopping (0 disables)
    #[arg(long, default_value_t = 2)]
    pub early_stopping_patience: usize,

    /// `accuracy` or `f1`
    #[arg(long, default_value = "accuracy")]
    pub metric_for_best_model: BestMetric,

    /// Seed for weight init and data shuffling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_root:         a.data_root,
            csv_path:          a.csv,
            train_cache:       a.train_cache,
            val_cache:         a.val_cache,
            tokenizer_path:    a.tokenizer,
            base_weights:      (!a.random_init).then_some(a.base_weights),
            resume_checkpoint: Some(a.resume_checkpoint),
            output_dir:        a.output_dir,
            logging_dir:       a.logging_dir,
            max_length:        a.max_length,
            val_fraction:      a.val_fraction,
            split_seed:        a.split_seed,
            training: TrainingArgs {
                epochs:                      a.epochs,
                train_batch_size:            a.train_batch_size,
                eval_batch_size:             a.eval_batch_size,
                learning_rate:               a.learning_rate,
                warmup_steps:                a.warmup_steps,
                weight_decay:                a.weight_decay,
                max_grad_norm:               a.max_grad_norm,
                gradient_accumulation_steps: a.gradient_accumulation_steps,
                logging_steps:               a.logging_steps,
                early_stopping_patience:     a.early_stopping_patience,
                metric_for_best_model:       a.metric_for_best_model,
                seed:                        a.seed,
                num_workers:                 a.num_workers,
            },
            model: default_model_config(a.max_length),
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Output directory of a training run (holds training_args.json)
    #[arg(long, default_value = "../results_LF_weighted")]
    pub output_dir: PathBuf,

    /// Checkpoint to score; defaults to the run's best checkpoint
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
}
