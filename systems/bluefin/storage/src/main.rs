//! Battery storage binary
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use martech::{
    components::prelude::*,
    utils::signal::{stop_on_ctrl_c, stop_signal},
};

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the storage discharge.
    #[arg(short, long)]
    filepath: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut storage = BatteryStorage::from_config_file(&args.filepath)
        .with_context(|| format!("unable to start the discharge from {}", args.filepath))?;
    let stop = stop_signal();
    stop_on_ctrl_c(stop.clone());
    let report = tokio::task::spawn_blocking(move || StorageController::start(&mut storage, &stop)).await??;
    match report.outcome {
        StorageOutcome::NeedsCharging => {
            warn!("battery {} needs to be charged first", report.battery_sn)
        }
        outcome => info!("battery {} {outcome}: {:?}", report.battery_sn, report.voltages),
    }
    Ok(())
}
