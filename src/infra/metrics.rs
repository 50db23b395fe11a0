// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training progress to two CSV files in the logs
// directory:
//
//   train_steps.csv — one row every `logging_steps` optimizer
//                     steps: mean training loss over the window
//                     and the learning rate used
//   eval_epochs.csv — one row per epoch: training loss, weighted
//                     validation loss, accuracy and macro-F1
//
// Example:
//   epoch,step,train_loss,eval_loss,accuracy,f1
//   1,1916,1.042311,0.981220,0.512000,0.486100
//   2,3832,0.913874,0.902114,0.577000,0.560300
//
// Files are appended to, so a resumed run continues the same
// log.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

const STEP_HEADER:  &str = "step,epoch,train_loss,learning_rate";
const EPOCH_HEADER: &str = "epoch,step,train_loss,eval_loss,accuracy,f1";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Optimizer steps completed at the end of this epoch
    pub step: usize,

    /// Average weighted cross-entropy over the epoch's training batches
    pub train_loss: f64,

    /// Average weighted cross-entropy on the validation set
    pub eval_loss: f64,

    /// Validation accuracy in [0, 1]
    pub accuracy: f64,

    /// Validation macro-F1 in [0, 1]
    pub f1: f64,
}

/// Appends step and epoch metrics to CSV files.
pub struct MetricsLogger {
    steps_csv:  PathBuf,
    epochs_csv: PathBuf,
}

impl MetricsLogger {
    /// Create the logs directory and write CSV headers for new files.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create logs directory '{}'", dir.display()))?;

        let steps_csv  = dir.join("train_steps.csv");
        let epochs_csv = dir.join("eval_epochs.csv");
        write_header_if_new(&steps_csv,  STEP_HEADER)?;
        write_header_if_new(&epochs_csv, EPOCH_HEADER)?;

        Ok(Self { steps_csv, epochs_csv })
    }

    pub fn log_step(&self, step: usize, epoch: usize, train_loss: f64, learning_rate: f64) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.steps_csv)?;
        writeln!(f, "{},{},{:.6},{:e}", step, epoch, train_loss, learning_rate)?;
        Ok(())
    }

    pub fn log_epoch(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.epochs_csv)?;
        writeln!(
            f,
            "{},{},{:.6},{:.6},{:.6},{:.6}",
            m.epoch, m.step, m.train_loss, m.eval_loss, m.accuracy, m.f1,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: eval_loss={:.4}, accuracy={:.4}",
            m.epoch,
            m.eval_loss,
            m.accuracy,
        );
        Ok(())
    }

    pub fn steps_csv(&self) -> &Path {
        &self.steps_csv
    }

    pub fn epochs_csv(&self) -> &Path {
        &self.epochs_csv
    }
}

fn write_header_if_new(path: &Path, header: &str) -> Result<()> {
    if !path.exists() {
        let mut f = fs::File::create(path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;
        writeln!(f, "{header}")?;
    }
    Ok(())
}
