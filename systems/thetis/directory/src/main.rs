//! Profiler directory binary. Creates a dated data directory on the
//! controller, logs a short sensor run into it and optionally cleans up.
use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use martech::{
    components::prelude::*,
    devices::prelude::*,
    messages::thetis::sentence::Listener,
    utils::time::{now, FILE_DATE},
};
use std::time::Duration;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the Thetis profiler.
    #[arg(short, long)]
    filepath: String,
    /// Seconds the sensors run while logging.
    #[arg(short, long, default_value_t = 30)]
    seconds: u64,
}

fn run(thetis: &mut Thetis, seconds: u64) -> Result<()> {
    let version = thetis.get_version()?;
    info!("connected to {}", version.profiler_name());
    if !thetis.change_to_root_directory(Listener::PC)? {
        bail!("unable to reach the root directory");
    }
    thetis.make_directory("DATA", Listener::PC)?;
    thetis.change_directory("DATA", Listener::PC)?;
    let today = now().format(FILE_DATE).to_string();
    thetis.make_directory(&today, Listener::PC)?;
    thetis.change_directory(&today, Listener::PC)?;
    info!("working directory {}", thetis.get_working_directory(Listener::PC)?);

    thetis.data_logging(PowerState::On)?;
    thetis.power_sensors(PowerState::On)?;
    thetis.sercom_mut().pause(Duration::from_secs(1));
    thetis.power_pump(PowerState::Off)?;
    thetis.sercom_mut().pause(Duration::from_secs(seconds));
    thetis.power_sensors(PowerState::Off)?;
    thetis.sercom_mut().pause(Duration::from_secs(10));
    thetis.data_logging(PowerState::Off)?;

    let names: Vec<String> = thetis
        .list_files(Listener::PC)?
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    info!("created {names:?}");

    let mut operator = ConsoleOperator::new();
    if operator.confirm("Do you want to delete the files you just created?")? {
        thetis.delete_files(&names, Listener::PC)?;
    }
    if operator.confirm("Do you want to delete the directory you just created?")? {
        if !thetis.list_files(Listener::PC)?.is_empty() {
            bail!("{today} still holds files");
        }
        thetis.change_directory("..", Listener::PC)?;
        if thetis.remove_directory(&today)? {
            info!("directory {today} removed");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut thetis = Thetis::from_config_file(&args.filepath)
        .with_context(|| format!("unable to open the profiler from {}", args.filepath))?;
    tokio::task::spawn_blocking(move || run(&mut thetis, args.seconds)).await?
}
