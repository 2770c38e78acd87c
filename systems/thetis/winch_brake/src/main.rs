//! Winch brake cycle binary
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use martech::devices::prelude::*;
use std::time::Duration;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the Thetis profiler.
    #[arg(short, long)]
    filepath: String,
}

fn cycle(thetis: &mut Thetis) -> Result<()> {
    let version = thetis.get_version()?;
    info!("connected to {}", version.profiler_name());
    thetis.send_break()?;
    if !thetis.power_winch(PowerState::On)? {
        anyhow::bail!("winch did not power on");
    }
    thetis.sercom_mut().pause(Duration::from_secs(3));
    thetis.winch_brake(PowerState::Off)?;
    thetis.sercom_mut().pause(Duration::from_secs(5));
    thetis.winch_brake(PowerState::On)?;
    thetis.sercom_mut().pause(Duration::from_secs(3));
    thetis.power_winch(PowerState::Off)?;
    info!("brake cycled");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut thetis = Thetis::from_config_file(&args.filepath)
        .with_context(|| format!("unable to open the profiler from {}", args.filepath))?;
    tokio::task::spawn_blocking(move || cycle(&mut thetis)).await?
}
