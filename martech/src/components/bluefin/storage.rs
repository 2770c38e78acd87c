use crate::{
    devices::hardware::{bluefin::Bluefin, sercom::SerialLink},
    error::Result,
    messages::bluefin::summary::BatteryError,
    utils::{
        signal::{stopped, StopSignal},
        yaml,
    },
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use serialport::SerialPort;
use std::{
    ffi::OsStr,
    path::PathBuf,
    time::{Duration, Instant},
};
use strum_macros::{Display, IntoStaticStr};
use uuid::Uuid;

/// Cell voltage a battery is discharged to before storage.
pub const STORAGE_VOLTAGE: f64 = 3.81;

/// Cell voltage at or below which a battery must be charged, not
/// discharged, before storage.
pub const NEEDS_CHARGE_VOLTAGE: f64 = 3.7;

fn default_voltage_limit() -> f64 {
    STORAGE_VOLTAGE
}

fn default_charge_threshold() -> f64 {
    NEEDS_CHARGE_VOLTAGE
}

fn default_period() -> Duration {
    Duration::from_secs(60)
}

#[serde_as]
#[derive(Deserialize, Serialize, Clone, PartialEq, Debug)]
pub struct StorageConfig {
    pub battery_config_file: PathBuf,
    /// Every cell is discharged to this voltage.
    #[serde(default = "default_voltage_limit")]
    pub voltage_limit: f64,
    /// Every cell at or below this voltage means the battery needs charging.
    #[serde(default = "default_charge_threshold")]
    pub charge_threshold: f64,
    /// Time from the start of one discharge cycle to the start of the next.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_period")]
    pub period: Duration,
}

impl StorageConfig {
    pub fn new<P: Into<PathBuf>>(battery_config_file: P) -> Self {
        Self {
            battery_config_file: battery_config_file.into(),
            voltage_limit: default_voltage_limit(),
            charge_threshold: default_charge_threshold(),
            period: default_period(),
        }
    }

    pub fn with_voltage_limit(mut self, voltage_limit: f64) -> Self {
        self.voltage_limit = voltage_limit;
        self
    }

    /// Create a `StorageConfig` by reading data from a file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        yaml::from_yaml_file(filepath)
    }
}

#[derive(IntoStaticStr, Display, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageOutcome {
    /// Cells are too low, charge the battery first.
    NeedsCharging,
    /// Every cell is at or below the storage voltage.
    Ready,
    Stopped,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StorageReport {
    pub battery_sn: u64,
    pub outcome: StorageOutcome,
    /// Cell voltages when the procedure ended.
    pub voltages: Vec<f64>,
}

/// A battery being brought to storage voltage.
pub struct BatteryStorage<L: SerialLink = Box<dyn SerialPort>> {
    uuid: Uuid,
    battery: Bluefin<L>,
    config: StorageConfig,
}

impl BatteryStorage {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let battery = Bluefin::from_config_file(&config.battery_config_file)?;
        Ok(Self::with_battery(battery, config))
    }

    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        Self::new(StorageConfig::from_file(filepath)?)
    }
}

impl<L: SerialLink> BatteryStorage<L> {
    pub fn with_battery(battery: Bluefin<L>, config: StorageConfig) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            battery,
            config,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn battery(&self) -> &Bluefin<L> {
        &self.battery
    }
}

/// Unit struct that runs a [`BatteryStorage`] discharge.
pub struct StorageController;

impl StorageController {
    /// Discharge every cell above the storage voltage once per period. The
    /// battery is switched off however the discharge ends.
    ///
    /// * `storage`: battery and limits.
    /// * `stop`: raised to end the discharge after the current cycle.
    pub fn start<L: SerialLink>(storage: &mut BatteryStorage<L>, stop: &StopSignal) -> Result<StorageReport> {
        let battery_sn = storage.battery.get_battery_sn()?;
        info!("connected to SBM {battery_sn} ({})", storage.uuid);
        let result = Self::discharge(storage, battery_sn, stop);
        if let Err(e) = storage.battery.off() {
            warn!("unable to switch SBM {battery_sn} off: {e}");
        }
        result
    }

    fn discharge<L: SerialLink>(
        storage: &mut BatteryStorage<L>,
        battery_sn: u64,
        stop: &StopSignal,
    ) -> Result<StorageReport> {
        let config = storage.config.clone();
        let battery = &mut storage.battery;
        let report = |outcome, voltages| StorageReport {
            battery_sn,
            outcome,
            voltages,
        };

        info!("checking whether all cells are near {}V", config.voltage_limit);
        let voltages = battery.get_cell_voltages()?;
        if voltages.iter().all(|v| *v <= config.charge_threshold) {
            warn!("battery needs charging, charge every cell to 3.8V before storage");
            return Ok(report(StorageOutcome::NeedsCharging, voltages));
        }

        loop {
            let cycle_start = Instant::now();
            let voltages = battery.get_cell_voltages()?;
            if voltages.iter().all(|v| *v <= config.voltage_limit) {
                info!("all cells are below {}V, store the battery in a cool room (10 - 20 degC)", config.voltage_limit);
                return Ok(report(StorageOutcome::Ready, voltages));
            }
            if stopped(stop) {
                return Ok(report(StorageOutcome::Stopped, voltages));
            }

            for (cell, _) in voltages.iter().enumerate().filter(|(_, v)| **v >= config.voltage_limit) {
                if !battery.balance_cell(cell)? && battery.get_summary()?.error == BatteryError::Watchdog {
                    warn!("watchdog timeout, resetting battery");
                    battery.off()?;
                    battery.balance_cell(cell)?;
                }
                info!("cell #{cell} discharging");
                battery.sercom_mut().pause(Duration::from_secs(1));
            }
            info!("voltages after discharge: {:?}", battery.get_cell_voltages()?);

            let wait = config.period.saturating_sub(cycle_start.elapsed());
            if !wait.is_zero() {
                info!("waiting {} seconds before discharging cells again", wait.as_secs());
                battery.sercom_mut().pause(wait);
            }
        }
    }
}
