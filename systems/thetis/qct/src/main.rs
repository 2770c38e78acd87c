//! Profiler QCT binary
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use martech::components::prelude::*;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the profiler QCT.
    #[arg(short, long)]
    filepath: String,
    /// Name recorded as the operator in the QCT log.
    #[arg(short, long)]
    operator: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut qct = ProfilerQct::from_config_file(&args.filepath)
        .with_context(|| format!("unable to start the QCT from {}", args.filepath))?;
    let operator = args.operator;
    let report = tokio::task::spawn_blocking(move || ProfilerQctController::run(&mut qct, &operator))
        .await??;
    for setting in &report.settings {
        info!("{setting}");
    }
    info!("QCT {} written to {}", report.flag(), report.log.display());
    Ok(())
}
