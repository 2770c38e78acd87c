use crate::{
    devices::hardware::{
        sercom::SerialLink,
        thetis::{Thetis, ThetisConfig},
    },
    error::Result,
    messages::thetis::{
        listing::{names_containing, FileEntry},
        sentence::Listener,
    },
    utils::{
        signal::{stopped, StopSignal},
        yaml,
    },
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};
use uuid::Uuid;

/// File classes in the order they are offloaded. Decimated files (`SND`,
/// `PPD`, `ACD`) must come off the controller before the full files they
/// were derived from.
pub const OFFLOAD_ORDER: [&str; 7] = ["SND", "SNA", "PPD", "PPB", "ACD", "ACS", "DBG"];

fn default_order() -> Vec<String> {
    OFFLOAD_ORDER.iter().map(|class| class.to_string()).collect()
}

/// Names from a listing, grouped by class in `order`. Files of any other
/// class follow in listing order.
///
/// * `entries`: directory listing.
/// * `order`: file class markers, e.g. `PPD`.
pub fn order_files<S: AsRef<str>>(entries: &[FileEntry], order: &[S]) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::with_capacity(entries.len());
    for name in order
        .iter()
        .flat_map(|class| names_containing(entries, class.as_ref()))
    {
        if !ordered.iter().any(|n| n == name) {
            ordered.push(name.to_string());
        }
    }
    for entry in entries {
        if !ordered.contains(&entry.name) {
            debug!("{} is not in the offload order, offloading last", entry.name);
            ordered.push(entry.name.clone());
        }
    }
    ordered
}

#[derive(Deserialize, Serialize, Clone, PartialEq, Eq, Debug)]
pub struct OffloadConfig {
    /// Config of the profiler to offload.
    pub thetis_config_file: PathBuf,
    /// Local directory the files are written into.
    pub destination: PathBuf,
    /// File classes to offload, in order.
    #[serde(default = "default_order")]
    pub order: Vec<String>,
    /// Also pull the winch controller files through the profiler.
    #[serde(default)]
    pub include_winch: bool,
}

impl OffloadConfig {
    /// Offload every known class into `destination`.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(thetis_config_file: P, destination: Q) -> Self {
        Self {
            thetis_config_file: thetis_config_file.into(),
            destination: destination.into(),
            order: default_order(),
            include_winch: false,
        }
    }

    /// Include the winch files.
    pub fn with_winch(mut self) -> Self {
        self.include_winch = true;
        self
    }

    /// Create an `OffloadConfig` by reading data from a file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        yaml::from_yaml_file(filepath)
    }
}

/// A profiler and where its files go.
pub struct ProfilerOffload<L: SerialLink = Box<dyn SerialPort>> {
    uuid: Uuid,
    thetis: Thetis<L>,
    config: OffloadConfig,
}

impl ProfilerOffload {
    /// Open the profiler named in the config.
    ///
    /// * `config`: `OffloadConfig`
    pub fn new(config: OffloadConfig) -> Result<Self> {
        let thetis = Thetis::open(ThetisConfig::from_file(&config.thetis_config_file)?)?;
        Ok(Self::with_thetis(thetis, config))
    }

    /// Generate the component from the config stored in a file.
    ///
    /// * `filepath`: filepath to a config.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        Self::new(OffloadConfig::from_file(filepath)?)
    }
}

impl<L: SerialLink> ProfilerOffload<L> {
    pub fn with_thetis(thetis: Thetis<L>, config: OffloadConfig) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            thetis,
            config,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn destination(&self) -> &Path {
        &self.config.destination
    }

    pub fn thetis(&self) -> &Thetis<L> {
        &self.thetis
    }

    pub fn into_thetis(self) -> Thetis<L> {
        self.thetis
    }
}

/// Unit struct for running an offload.
pub struct ProfilerOffloadController;

impl ProfilerOffloadController {
    /// Offload the working directory of the profiler. The stop signal is
    /// checked between files, a file in progress is always finished.
    /// Returns the local paths written.
    ///
    /// * `offload`: the profiler and destination.
    /// * `stop`: raised to end the offload early.
    pub fn start<L: SerialLink>(offload: &mut ProfilerOffload<L>, stop: &StopSignal) -> Result<Vec<PathBuf>> {
        let destination = offload.config.destination.clone();
        fs::create_dir_all(&destination)?;
        let thetis = &mut offload.thetis;

        let version = thetis.get_version()?;
        info!("connected to {} ({})", version.profiler_name(), offload.uuid);

        let entries = thetis.list_files(Listener::PC)?;
        let names = order_files(&entries, &offload.config.order);
        info!("{} of {} files to offload", names.len(), entries.len());

        let mut written = Vec::new();
        for name in &names {
            if stopped(stop) {
                warn!("offload stopped with {} of {} files written", written.len(), names.len());
                return Ok(written);
            }
            written.extend(thetis.offload_files(&[name], &destination)?);
        }

        if offload.config.include_winch {
            for name in thetis.transfer_winch_files()? {
                if stopped(stop) {
                    warn!("offload stopped before winch file {name}");
                    break;
                }
                written.push(thetis.get_winch_file(&name, &destination)?);
            }
        }
        Ok(written)
    }
}
