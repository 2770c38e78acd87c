//! Battery address binary
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use martech::devices::prelude::*;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the battery at its current address.
    #[arg(short, long)]
    filepath: String,
    /// Address to give the battery, 0 to 99.
    #[arg(short, long)]
    address: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut battery = Bluefin::from_config_file(&args.filepath)
        .with_context(|| format!("unable to open the battery from {}", args.filepath))?;
    tokio::task::spawn_blocking(move || -> Result<()> {
        let sn = battery.get_battery_sn()?;
        info!("connected to SBM {sn} at address {}", battery.address());
        battery.set_address(args.address)?;
        let address = battery.get_address()?;
        info!("battery address changed to {address}");
        Ok(())
    })
    .await?
}
