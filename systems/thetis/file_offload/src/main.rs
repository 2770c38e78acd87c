//! Profiler file offload binary
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use martech::{
    components::prelude::*,
    utils::signal::{stop_on_ctrl_c, stop_signal},
};

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the offload.
    #[arg(short, long)]
    filepath: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut offload = ProfilerOffload::from_config_file(&args.filepath)
        .with_context(|| format!("unable to start the offload from {}", args.filepath))?;
    let stop = stop_signal();
    stop_on_ctrl_c(stop.clone());
    let files = tokio::task::spawn_blocking(move || {
        ProfilerOffloadController::start(&mut offload, &stop)
    })
    .await??;
    info!("offloaded {} files", files.len());
    Ok(())
}
