//! Instrument passthrough binary
use anyhow::{Context, Result};
use clap::Parser;
use martech::components::prelude::*;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the passthrough session.
    #[arg(short, long)]
    filepath: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let session = PassthruSession::from_config_file(&args.filepath)
        .with_context(|| format!("unable to start the session from {}", args.filepath))?;
    let (_, reports) = tokio::task::spawn_blocking(move || PassthruController::run(session)).await??;
    for report in reports {
        println!("{report}");
    }
    Ok(())
}
