//! Battery query binary
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use martech::{components::prelude::*, devices::prelude::*};

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the battery.
    #[arg(short, long)]
    filepath: String,
    /// Name recorded in the report.
    #[arg(short, long)]
    operator: String,
    /// Largest cell spread (V) reported as balanced.
    #[arg(short, long, default_value_t = 0.030)]
    delta: f64,
    /// Directory the report is written to.
    #[arg(long, default_value = ".")]
    output: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut battery = Bluefin::from_config_file(&args.filepath)
        .with_context(|| format!("unable to open the battery from {}", args.filepath))?;
    let (report, path) = tokio::task::spawn_blocking(move || {
        BatteryQueryController::run(&mut battery, &args.operator, args.delta, &args.output)
    })
    .await??;
    print!("{report}");
    info!("report written to {}", path.display());
    Ok(())
}
