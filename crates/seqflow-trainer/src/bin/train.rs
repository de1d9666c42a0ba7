//! Seqflow training CLI
//!
//! Trains the bag-of-words baseline from a JSON run configuration, then
//! optionally evaluates it and saves the weights, word counters and global
//! step. A later run over the same `model_dir` picks up from them.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use seqflow_trainer::{RunConfig, Trainer};
use tracing::{info, warn};

/// CLI arguments
#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train a seqflow model from a run configuration")]
#[command(version)]
struct Cli {
    /// Run configuration (JSON)
    #[arg(short, long, env = "SEQFLOW_CONFIG")]
    config: PathBuf,

    /// Number of training steps, overrides `train.train_steps`
    #[arg(short, long, env = "SEQFLOW_TRAIN_STEPS")]
    steps: Option<u64>,

    /// Evaluate on the eval files after training
    #[arg(short, long)]
    eval: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = RunConfig::from_file(&cli.config)?;
    let steps = cli.steps.unwrap_or(config.train.train_steps);
    let trainer = Trainer::new(config).context("initializing trainer")?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing the current step");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let eval = cli.eval;
    let weights = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
        let report = trainer.train(steps, &stop)?;
        info!(steps = report.steps, stopped = report.stopped, "training finished");
        if eval {
            match trainer.evaluate()? {
                Some(loss) => info!(loss, "evaluation finished"),
                None => warn!("--eval given but no evaluation files are configured"),
            }
        }
        trainer.save()
    })
    .await
    .context("training task panicked")??;

    info!(weights = %weights.display(), "done");
    Ok(())
}
