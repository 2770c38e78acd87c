//! Inspection QCT binary
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use martech::components::prelude::*;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the inspection.
    #[arg(short, long)]
    filepath: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut inspection = Inspection::from_config_file(&args.filepath)
        .with_context(|| format!("unable to start the inspection from {}", args.filepath))?;
    let report = tokio::task::spawn_blocking(move || {
        let mut operator = ConsoleOperator::new();
        InspectionController::run(&mut inspection, &mut operator)
    })
    .await??;
    info!("inspection {} logged to {}", report.flag, report.log.display());
    Ok(())
}
