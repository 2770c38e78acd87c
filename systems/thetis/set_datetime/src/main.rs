//! Profiler clock binary
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use martech::devices::prelude::*;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the Thetis profiler.
    #[arg(short, long)]
    filepath: String,
    /// Time zone offset written with the time.
    #[arg(short, long, default_value_t = 0)]
    tzo: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut thetis = Thetis::from_config_file(&args.filepath)
        .with_context(|| format!("unable to open the profiler from {}", args.filepath))?;
    tokio::task::spawn_blocking(move || -> Result<()> {
        let version = thetis.get_version()?;
        info!("connected to {}", version.profiler_name());
        if thetis.set_datetime(args.tzo)? {
            info!("time has been updated on the control can");
        } else {
            warn!("the control can refused the time");
        }
        Ok(())
    })
    .await?
}
