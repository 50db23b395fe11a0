// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`    — fine-tunes the classifier on the CSV corpus
//   2. `evaluate` — scores a saved checkpoint on the validation split

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "news-bias-trainer",
    version,
    about = "Fine-tune a long-document classifier to predict political bias (-1, 0, 1) of news articles."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on '{}'", args.data_root.join(&args.csv).display());

    let state = TrainUseCase::new(args.into()).execute()?;

    match (&state.best_model_checkpoint, state.best_metric) {
        (Some(best), Some(metric)) => println!(
            "Training complete after {} steps. Best checkpoint: {} ({:.4})",
            state.global_step,
            best.display(),
            metric
        ),
        _ => println!("Training complete after {} steps.", state.global_step),
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let report = EvaluateUseCase::new(args.output_dir, args.checkpoint).execute()?;

    println!("\nCheckpoint: {}", report.checkpoint.display());
    println!("Articles:   {}", report.articles);
    println!("eval_loss:  {:.4}", report.output.loss);
    for (name, value) in report.output.metrics.to_map() {
        println!("{:<11} {:.4}", format!("{name}:"), value);
    }
    Ok(())
}
