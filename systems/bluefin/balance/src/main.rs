//! Battery balance binary
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
    /// Path to the config file for the balance.
    #[arg(short, long)]
    filepath: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut balance = BatteryBalance::from_config_file(&args.filepath)
        .with_context(|| format!("unable to start the balance from {}", args.filepath))?;
    let stop = stop_signal();
    stop_on_ctrl_c(stop.clone());
    let report = tokio::task::spawn_blocking(move || BalanceController::start(&mut balance, &stop)).await??;
    info!(
        "battery {} {} after {} cycles",
        report.battery_sn, report.outcome, report.cycles
    );
    if let Some(log) = report.log {
        info!("balance log {}", log.display());
    }
    Ok(())
}
