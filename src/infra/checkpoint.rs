// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's named
// MessagePack recorder (full precision, so a resumed run
// starts from exactly the saved weights).
//
// Directory layout:
//   results_LF_weighted/
//     training_args.json        ← TrainConfig of the run
//     checkpoint-1916/
//       model.mpk               ← weights after epoch 1
//       trainer_state.json      ← epoch, step, best metric, history
//       rng_state.json          ← shuffle seed and epoch (kept to mirror
//                                  the HuggingFace checkpoint layout)
//     checkpoint-3832/
//       ...
//
// Resuming (two states):
//   CHECKPOINT_PRESENT  the checkpoint directory exists → build
//                       the model, load its weights, delete the
//                       saved rng_state.json so the data order is
//                       reseeded instead of replaying a stale stream
//   FRESH               otherwise → build a 3-class model and load
//                       the pretrained base weights; a configured
//                       but missing base record is an error. Random
//                       initialisation only when no base is set
//                       (the --random-init opt-in)
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{ensure, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::infra::metrics::EpochMetrics;
use crate::ml::model::{BiasClassifier, BiasClassifierConfig};

pub type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Record file stem inside a checkpoint; the recorder appends ".mpk".
pub const MODEL_FILE: &str = "model";
pub const TRAINER_STATE_FILE: &str = "trainer_state.json";
pub const RNG_STATE_FILE: &str = "rng_state.json";
pub const CONFIG_FILE: &str = "training_args.json";
const CHECKPOINT_PREFIX: &str = "checkpoint-";

/// Progress of a training run, saved with every checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    pub epoch:                 usize,
    pub global_step:           usize,
    pub best_metric:           Option<f64>,
    pub best_model_checkpoint: Option<PathBuf>,
    pub log_history:           Vec<EpochMetrics>,
}

/// Random state needed to replay the data order of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RngState {
    pub seed:  u64,
    pub epoch: usize,
}

/// Manages checkpoint directories below the run's output directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create the output directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn checkpoint_dir(&self, global_step: usize) -> PathBuf {
        self.dir.join(format!("{CHECKPOINT_PREFIX}{global_step}"))
    }

    /// Write weights, trainer state and RNG state to `checkpoint-<step>`.
    pub fn save_checkpoint<B: Backend>(
        &self,
        model: &BiasClassifier<B>,
        state: &TrainerState,
        rng:   &RngState,
    ) -> Result<PathBuf> {
        let dir = self.checkpoint_dir(state.global_step);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint '{}'", dir.display()))?;

        let path = dir.join(MODEL_FILE);
        CheckpointRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| {
                format!("Failed to save checkpoint to '{}'", path.display())
            })?;

        write_json(&dir.join(TRAINER_STATE_FILE), state)?;
        write_json(&dir.join(RNG_STATE_FILE), rng)?;

        tracing::info!("Saved checkpoint '{}'", dir.display());
        Ok(dir)
    }

    /// Save the run configuration so `evaluate` can rebuild the model.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        write_json(&path, cfg)?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read config from '{}'. \
                     Make sure you have run 'train' before 'evaluate'.",
                    path.display()
                )
            })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))
    }

    /// The checkpoint directory with the highest step, if any.
    pub fn latest_checkpoint(&self) -> Result<Option<PathBuf>> {
        let mut latest: Option<(usize, PathBuf)> = None;
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let step = name
                .to_str()
                .and_then(|n| n.strip_prefix(CHECKPOINT_PREFIX))
                .and_then(|s| s.parse::<usize>().ok());
            if let Some(step) = step {
                if latest.as_ref().map_or(true, |(best, _)| step > *best) {
                    latest = Some((step, entry.path()));
                }
            }
        }
        Ok(latest.map(|(_, path)| path))
    }
}

pub fn load_trainer_state(checkpoint_dir: &Path) -> Result<TrainerState> {
    let path = checkpoint_dir.join(TRAINER_STATE_FILE);
    let json = fs::read_to_string(&path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Malformed trainer state '{}'", path.display()))
}

/// Restore weights from a checkpoint directory into `model`.
///
/// The model must have the architecture the checkpoint was saved
/// with, or loading fails.
pub fn load_weights<B: Backend>(
    model:          BiasClassifier<B>,
    checkpoint_dir: &Path,
    device:         &B::Device,
) -> Result<BiasClassifier<B>> {
    load_record_file(model, &checkpoint_dir.join(MODEL_FILE), device)
}

fn load_record_file<B: Backend>(
    model:  BiasClassifier<B>,
    path:   &Path,
    device: &B::Device,
) -> Result<BiasClassifier<B>> {
    let record = CheckpointRecorder::new()
        .load(path.to_path_buf(), device)
        .with_context(|| {
            format!("Cannot load model weights from '{}'", path.display())
        })?;

    let expected = model.num_params();
    let model    = model.load_record(record);
    ensure!(
        model.num_params() == expected,
        "Weights in '{}' do not match the configured architecture ({} vs {} parameters)",
        path.display(),
        model.num_params(),
        expected
    );
    Ok(model)
}

/// Where the initial model weights come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// Resume from a saved checkpoint directory
    Checkpoint(PathBuf),
    /// Start from pretrained base weights, or random init when `None`
    Fresh { base_weights: Option<PathBuf> },
}

impl ModelSource {
    /// CHECKPOINT_PRESENT when `checkpoint` names an existing directory,
    /// FRESH otherwise.
    pub fn resolve(checkpoint: Option<&Path>, base_weights: Option<&Path>) -> Self {
        match checkpoint {
            Some(dir) if dir.is_dir() => ModelSource::Checkpoint(dir.to_path_buf()),
            _ => ModelSource::Fresh { base_weights: base_weights.map(Path::to_path_buf) },
        }
    }

    /// Build the model on `device` and load its initial weights.
    pub fn load<B: Backend>(
        &self,
        config: &BiasClassifierConfig,
        device: &B::Device,
    ) -> Result<BiasClassifier<B>> {
        let model = config.init::<B>(device);

        match self {
            ModelSource::Checkpoint(dir) => {
                tracing::info!("Resuming model weights from '{}'", dir.display());
                let model = load_weights(model, dir, device)?;

                let rng_file = dir.join(RNG_STATE_FILE);
                if rng_file.exists() {
                    fs::remove_file(&rng_file).with_context(|| {
                        format!("Cannot remove stale RNG state '{}'", rng_file.display())
                    })?;
                    tracing::info!("Removed stale RNG state '{}'", rng_file.display());
                }
                Ok(model)
            }
            ModelSource::Fresh { base_weights: Some(path) } => {
                ensure!(
                    path.exists(),
                    "Pretrained base weights '{}' not found. Import the base model into a \
                     burn record there, or pass --random-init to train from scratch.",
                    path.display()
                );
                tracing::info!("Loading pretrained base weights from '{}'", path.display());
                // The recorder appends the extension itself
                load_record_file(model, &path.with_extension(""), device)
            }
            ModelSource::Fresh { base_weights: None } => {
                tracing::warn!("No pretrained weights configured, starting from random initialisation");
                Ok(model)
            }
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)
        .with_context(|| format!("Cannot write '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::tests::{backend_rng_guard, tiny_config};
    use burn::backend::NdArray;

    type B = NdArray;

    fn weights_of(model: &BiasClassifier<B>) -> Vec<f32> {
        model.head.out_proj.weight.val().into_data().to_vec::<f32>().unwrap()
    }

    fn state(step: usize) -> TrainerState {
        TrainerState { epoch: 1, global_step: step, ..Default::default() }
    }

    #[test]
    fn test_resume_loads_weights_and_prunes_rng_state() {
        let _guard  = backend_rng_guard();
        let dir     = tempfile::tempdir().unwrap();
        let device  = Default::default();
        let manager = CheckpointManager::new(dir.path()).unwrap();

        let saved: BiasClassifier<B> = tiny_config(3).init(&device);
        let ckpt = manager
            .save_checkpoint(&saved, &state(7), &RngState { seed: 42, epoch: 1 })
            .unwrap();
        assert!(ckpt.join(RNG_STATE_FILE).exists());

        let source = ModelSource::resolve(Some(&ckpt), None);
        assert_eq!(source, ModelSource::Checkpoint(ckpt.clone()));

        let loaded: BiasClassifier<B> = source.load(&tiny_config(3), &device).unwrap();
        assert!(!ckpt.join(RNG_STATE_FILE).exists());
        assert!(ckpt.join(TRAINER_STATE_FILE).exists());
        assert_eq!(weights_of(&loaded), weights_of(&saved));
    }

    #[test]
    fn test_missing_checkpoint_starts_fresh() {
        let _guard  = backend_rng_guard();
        let source = ModelSource::resolve(Some(Path::new("/no/such/checkpoint-9580")), None);
        assert_eq!(source, ModelSource::Fresh { base_weights: None });

        let device = Default::default();
        let model: BiasClassifier<B> = source.load(&tiny_config(3), &device).unwrap();
        assert_eq!(model.head.out_proj.weight.val().dims(), [8, 3]);
    }

    #[test]
    fn test_fresh_loads_base_weights_when_present() {
        let _guard  = backend_rng_guard();
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();

        let base: BiasClassifier<B> = tiny_config(3).init(&device);
        CheckpointRecorder::new()
            .record(base.clone().into_record(), dir.path().join("base"))
            .unwrap();

        let source = ModelSource::resolve(None, Some(&dir.path().join("base.mpk")));
        let model: BiasClassifier<B> = source.load(&tiny_config(3), &device).unwrap();
        assert_eq!(weights_of(&model), weights_of(&base));
    }

    #[test]
    fn test_missing_base_weights_are_an_error() {
        let _guard  = backend_rng_guard();
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();

        let missing = dir.path().join("longformer-base-4096/model.mpk");
        let source  = ModelSource::resolve(None, Some(&missing));
        let err = source.load::<B>(&tiny_config(3), &device).unwrap_err();
        assert!(err.to_string().contains("--random-init"));
    }

    #[test]
    fn test_incompatible_checkpoint_fails() {
        let _guard  = backend_rng_guard();
        let dir     = tempfile::tempdir().unwrap();
        let device  = Default::default();
        let manager = CheckpointManager::new(dir.path()).unwrap();

        let two_class: BiasClassifier<B> = tiny_config(2).init(&device);
        let ckpt = manager
            .save_checkpoint(&two_class, &state(1), &RngState { seed: 42, epoch: 1 })
            .unwrap();

        let source = ModelSource::Checkpoint(ckpt);
        assert!(source.load::<B>(&tiny_config(3), &device).is_err());
    }

    #[test]
    fn test_latest_checkpoint_picks_highest_step() {
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        assert_eq!(manager.latest_checkpoint().unwrap(), None);

        for step in [10, 200, 30] {
            fs::create_dir_all(manager.checkpoint_dir(step)).unwrap();
        }
        fs::create_dir_all(dir.path().join("checkpoint-final")).unwrap();

        assert_eq!(
            manager.latest_checkpoint().unwrap(),
            Some(manager.checkpoint_dir(200))
        );
    }

    #[test]
    fn test_trainer_state_round_trips_through_checkpoint() {
        let _guard  = backend_rng_guard();
        let dir     = tempfile::tempdir().unwrap();
        let device  = Default::default();
        let manager = CheckpointManager::new(dir.path()).unwrap();

        let mut st = state(12);
        st.best_metric = Some(0.75);
        st.best_model_checkpoint = Some(manager.checkpoint_dir(12));

        let model: BiasClassifier<B> = tiny_config(3).init(&device);
        let ckpt = manager.save_checkpoint(&model, &st, &RngState { seed: 1, epoch: 1 }).unwrap();
        assert_eq!(load_trainer_state(&ckpt).unwrap(), st);
    }
}
