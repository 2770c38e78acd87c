use crate::{
    devices::hardware::sercom::{last_capture, Eol, Sercom, SerialConfig, SerialLink, CHECK_INTERVAL},
    error::{MartechError, Result},
    messages::bluefin::summary::{BatteryError, BatterySummary, VersionSummary},
    utils::yaml,
};
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::{ffi::OsStr, sync::OnceLock, time::Duration};
use uuid::Uuid;

/// Line speed of the RS-485 bus. Through a profiler passthrough the
/// controller speed applies instead.
pub const BLUEFIN_BAUD_RATE: u32 = 9600;

/// Highest address a battery accepts. 0 is the broadcast address.
pub const MAX_ADDRESS: u8 = 250;

/// Largest cell spread, in volts, of a balanced battery.
pub const BALANCE_DELTA: f64 = 0.030;

/// Time the battery needs after being switched off.
const OFF_SETTLE: Duration = Duration::from_secs(1);

/// Time the battery needs after an address change.
const ADDRESS_SETTLE: Duration = Duration::from_millis(200);

/// Time between discharge commands.
const DISCHARGE_SETTLE: Duration = Duration::from_secs(1);

fn cell_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"[0-9]\.[0-9]{1,3}").expect("valid cell pattern"))
}

/// Format a bus address the way the battery expects it, two lowercase hex
/// digits.
///
/// * `address`: 0 for broadcast, or 1 to [`MAX_ADDRESS`].
pub fn format_address(address: u8) -> Result<String> {
    if address > MAX_ADDRESS {
        return Err(MartechError::InvalidArgument(format!(
            "battery address must be between 0 and {MAX_ADDRESS}, got {address}"
        )));
    }
    Ok(format!("{address:02x}"))
}

/// True when every cell is within `delta` of the lowest cell.
pub fn all_cells_within(voltages: &[f64], delta: f64) -> bool {
    let Some(min) = min_voltage(voltages) else {
        return true;
    };
    voltages.iter().all(|v| *v >= min - delta && *v <= min + delta)
}

/// Indices of the cells that sit `delta` or more above the lowest cell.
pub fn cells_to_discharge(voltages: &[f64], delta: f64) -> Vec<usize> {
    let Some(min) = min_voltage(voltages) else {
        return Vec::new();
    };
    voltages
        .iter()
        .enumerate()
        .filter(|(_, v)| **v != min && !(**v - delta < min && min < **v + delta))
        .map(|(i, _)| i)
        .collect()
}

fn min_voltage(voltages: &[f64]) -> Option<f64> {
    voltages.iter().copied().reduce(f64::min)
}

#[derive(Deserialize, Serialize, Clone, PartialEq, Debug)]
pub struct BluefinConfig {
    pub serial: SerialConfig,
    /// Bus address of the battery, 0 when it is alone on the bus.
    #[serde(default)]
    pub address: u8,
}

impl BluefinConfig {
    /// A battery on its own RS-485 port.
    ///
    /// * `port`: system specific port name.
    /// * `address`: bus address.
    pub fn new<S: Into<String>>(port: S, address: u8) -> Self {
        Self {
            serial: SerialConfig::new(port, BLUEFIN_BAUD_RATE),
            address,
        }
    }

    /// Create a `BluefinConfig` by reading data from a file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        yaml::from_yaml_file(filepath)
    }
}

/// Driver for the Bluefin 1.5 kWh SmallBattMod.
pub struct Bluefin<L: SerialLink = Box<dyn SerialPort>> {
    uuid: Uuid,
    sercom: Sercom<L>,
    /// Formatted bus address.
    address: String,
}

impl Bluefin {
    /// Open the bus and address the configured battery.
    ///
    /// * `config`: Set of config parameters.
    pub fn open(config: &BluefinConfig) -> Result<Self> {
        let address = format_address(config.address)?;
        let mut sercom = Sercom::open(&config.serial)?;
        sercom.clear_buffers()?;
        Ok(Self {
            uuid: Uuid::new_v4(),
            sercom,
            address,
        })
    }

    /// Open a battery from a config file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        Self::open(&BluefinConfig::from_file(filepath)?)
    }
}

impl<L: SerialLink> Bluefin<L> {
    /// Address a battery over an existing connection.
    ///
    /// * `sercom`: open connection, e.g. a profiler passthrough.
    /// * `address`: bus address.
    pub fn with_sercom(sercom: Sercom<L>, address: u8) -> Result<Self> {
        Ok(Self {
            uuid: Uuid::new_v4(),
            sercom,
            address: format_address(address)?,
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Formatted bus address in use.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn sercom(&self) -> &Sercom<L> {
        &self.sercom
    }

    pub fn sercom_mut(&mut self) -> &mut Sercom<L> {
        &mut self.sercom
    }

    pub fn close(self) -> L {
        self.sercom.close()
    }

    fn command(&mut self, body: &str) -> Result<()> {
        let command = format!("#{}{body}", self.address);
        self.sercom.write_command(&command, Eol::CrLf)
    }

    /// Give the battery a new address. The battery must be alone on the bus.
    /// Later commands go to the new address.
    ///
    /// * `address`: 1 to [`MAX_ADDRESS`].
    pub fn set_address(&mut self, address: u8) -> Result<()> {
        let new_address = format_address(address)?;
        self.sercom
            .write_command(&format!("#00?8 {new_address}"), Eol::CrLf)?;
        self.sercom.clear_buffers()?;
        self.sercom.pause(ADDRESS_SETTLE);
        info!("battery address set to {new_address}");
        self.address = new_address;
        Ok(())
    }

    /// Address of the only battery on the bus.
    pub fn get_address(&mut self) -> Result<u8> {
        self.sercom.clear_buffers()?;
        self.sercom.write_command("#00?0", Eol::CrLf)?;
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        let hex = last_capture(r"\$.*? (.*?) \r\n", &response, "#00?0")?;
        u8::from_str_radix(hex.trim(), 16).map_err(|_| MartechError::parse("address", &hex))
    }

    /// One line summary of the battery.
    pub fn get_summary(&mut self) -> Result<BatterySummary> {
        self.command("q0")?;
        let response = self.sercom.read_until(b"\r\n")?;
        BatterySummary::parse(&response)
    }

    /// Identity and ratings of the battery.
    pub fn get_version_summary(&mut self) -> Result<VersionSummary> {
        self.command("z0")?;
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        VersionSummary::parse(&response)
    }

    pub fn get_battery_sn(&mut self) -> Result<u64> {
        Ok(self.get_version_summary()?.battery_sn)
    }

    /// Put the battery to sleep.
    ///
    /// * `seconds`: delay before sleeping.
    pub fn sleep(&mut self, seconds: u32) -> Result<()> {
        self.command(&format!("bs {seconds}"))
    }

    /// Switch the battery off. This also clears latched errors.
    pub fn off(&mut self) -> Result<()> {
        self.command("bf")?;
        self.sercom.pause(OFF_SETTLE);
        Ok(())
    }

    /// Start discharging one cell. True when the battery accepts.
    ///
    /// * `cell`: cell index, 0 to 7 from left to right.
    pub fn balance_cell(&mut self, cell: usize) -> Result<bool> {
        self.command(&format!("b{cell}"))?;
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        Ok(response.contains('1'))
    }

    /// Voltage of every cell, left to right.
    pub fn get_cell_voltages(&mut self) -> Result<Vec<f64>> {
        self.command("q1")?;
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        cell_pattern()
            .find_iter(&response)
            .map(|m| {
                m.as_str()
                    .parse()
                    .map_err(|_| MartechError::parse("cell voltage", m.as_str()))
            })
            .collect()
    }

    /// True when the spread between the highest and lowest cell is within
    /// `delta`.
    pub fn is_balanced(&mut self, delta: f64) -> Result<bool> {
        Ok(self.get_summary()?.cell_spread() <= delta)
    }

    /// Discharge every cell that sits `delta` or more above the lowest cell.
    /// A cell the battery refuses is retried once after switching the
    /// battery off. Returns the cells that were started, empty when every
    /// cell is already within `delta`.
    pub fn balance_non_min_cells(&mut self, delta: f64) -> Result<Vec<usize>> {
        let voltages = self.get_cell_voltages()?;
        info!("cell voltages {voltages:?}");
        if all_cells_within(&voltages, delta) {
            info!("all cells are within {:.0} mV of each other", delta * 1000.0);
            return Ok(Vec::new());
        }
        let mut started = Vec::new();
        for cell in cells_to_discharge(&voltages, delta) {
            if !self.balance_cell(cell)? {
                warn!("unable to discharge cell #{cell}");
                if self.get_summary()?.error == BatteryError::Watchdog {
                    warn!("watchdog timeout, resetting");
                }
                self.off()?;
                self.sercom.pause(DISCHARGE_SETTLE);
                if !self.balance_cell(cell)? {
                    warn!("cell #{cell} refused a second time");
                    self.sercom.pause(DISCHARGE_SETTLE);
                    continue;
                }
            }
            info!("cell #{cell} discharging");
            started.push(cell);
            self.sercom.pause(DISCHARGE_SETTLE);
        }
        Ok(started)
    }
}
