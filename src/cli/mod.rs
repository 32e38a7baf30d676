// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// `clap` and hands each subcommand to its Layer 2 use case.
//
//   1. `seq2seq` — train a sequence encoder and decoder
//   2. `mix`     — train a tensor-product encoder with a decoder
//   3. `tpdn`    — fit a tensor-product encoder to encodings
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::Commands;

use crate::application::{
    decompose_use_case::TpdnUseCase,
    train_use_case::{MixUseCase, Seq2SeqUseCase, TrainReport},
};
use crate::ml::driver::StopReason;

#[derive(Parser, Debug)]
#[command(
    name = "tpdn-train",
    version = "0.1.0",
    about = "Train digit-sequence models and decompose their encodings into tensor-product representations."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case. Nothing is computed here.
    pub fn run(self) -> Result<()> {
        let report = match self.command {
            Commands::Seq2seq(args) => {
                tracing::info!("Training seq2seq on '{}'", args.train_file);
                Seq2SeqUseCase::new(args.into()).execute()?
            }
            Commands::Mix(args) => {
                tracing::info!("Training mix model on '{}'", args.train_file);
                MixUseCase::new(args.into()).execute()?
            }
            Commands::Tpdn(args) => {
                tracing::info!("Training role encoder on '{}'", args.train_file);
                TpdnUseCase::new(args.into()).execute()?
            }
        };
        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &TrainReport) {
    let outcome = &report.outcome;
    let why = match outcome.stop {
        StopReason::MaxEpochs         => "reached max epochs",
        StopReason::PatienceExhausted => "patience exhausted",
    };
    println!("Training complete after {} epoch(s) ({why}).", outcome.epochs_run);
    println!("Checkpoints saved: {}", outcome.saved_losses.len());
    match report.reloaded_dev_loss {
        Some(loss) => println!("Best dev loss: {:.6} (reloaded: {loss:.6})", outcome.best_loss),
        None       => println!("No checkpoint was saved."),
    }
}
