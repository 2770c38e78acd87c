use crate::{
    components::qct::log::QctLog,
    devices::hardware::{
        bluefin::{Bluefin, BALANCE_DELTA},
        sercom::SerialLink,
    },
    error::Result,
    utils::{
        signal::{stopped, StopSignal},
        yaml,
    },
};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use serialport::SerialPort;
use std::{
    ffi::OsStr,
    fs,
    path::PathBuf,
    time::{Duration, Instant},
};
use strum_macros::{Display, IntoStaticStr};
use uuid::Uuid;

/// Timestamp at the start of every balance log row.
const ROW_TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%SZ";

fn default_delta() -> f64 {
    BALANCE_DELTA
}

fn default_max_temperature() -> f64 {
    42.0
}

fn default_timeout() -> Duration {
    Duration::from_secs(60 * 60 * 24 * 14)
}

fn default_period() -> Duration {
    Duration::from_secs(60)
}

#[serde_as]
#[derive(Deserialize, Serialize, Clone, PartialEq, Debug)]
pub struct BalanceConfig {
    /// Config of the battery to balance.
    pub battery_config_file: PathBuf,
    /// Directory the balance log is appended in.
    pub log_directory: PathBuf,
    /// Largest cell spread (V) of a balanced battery.
    #[serde(default = "default_delta")]
    pub delta: f64,
    /// Oil temperature (degC) above which balancing is abandoned.
    #[serde(default = "default_max_temperature")]
    pub max_temperature: f64,
    /// Longest time balancing may take.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    /// Time from the start of one cycle to the start of the next.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_period")]
    pub period: Duration,
}

impl BalanceConfig {
    /// Default limits.
    ///
    /// * `battery_config_file`: battery config.
    /// * `log_directory`: where the balance log goes.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(battery_config_file: P, log_directory: Q) -> Self {
        Self {
            battery_config_file: battery_config_file.into(),
            log_directory: log_directory.into(),
            delta: default_delta(),
            max_temperature: default_max_temperature(),
            timeout: default_timeout(),
            period: default_period(),
        }
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    /// Create a `BalanceConfig` by reading data from a file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        yaml::from_yaml_file(filepath)
    }
}

/// Why balancing ended.
#[derive(IntoStaticStr, Display, Clone, Copy, Debug, PartialEq)]
pub enum BalanceOutcome {
    /// The cells agreed before anything was discharged.
    AlreadyBalanced,
    Balanced,
    /// Oil temperature (degC) went over the limit.
    OverTemperature(f64),
    TimedOut,
    Stopped,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BalanceReport {
    pub battery_sn: u64,
    pub outcome: BalanceOutcome,
    /// Balance log, none when the battery was already balanced.
    pub log: Option<PathBuf>,
    /// Discharge cycles run.
    pub cycles: u32,
}

/// A battery being balanced.
pub struct BatteryBalance<L: SerialLink = Box<dyn SerialPort>> {
    uuid: Uuid,
    battery: Bluefin<L>,
    config: BalanceConfig,
}

impl BatteryBalance {
    pub fn new(config: BalanceConfig) -> Result<Self> {
        let battery = Bluefin::from_config_file(&config.battery_config_file)?;
        Ok(Self::with_battery(battery, config))
    }

    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        Self::new(BalanceConfig::from_file(filepath)?)
    }
}

impl<L: SerialLink> BatteryBalance<L> {
    pub fn with_battery(battery: Bluefin<L>, config: BalanceConfig) -> Self {
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

/// Unit struct that balances a [`BatteryBalance`].
pub struct BalanceController;

impl BalanceController {
    /// Discharge the high cells once per period until the battery is
    /// balanced. The battery is switched off however balancing ends.
    ///
    /// * `balance`: battery and limits.
    /// * `stop`: raised to end balancing after the current cycle.
    pub fn start<L: SerialLink>(balance: &mut BatteryBalance<L>, stop: &StopSignal) -> Result<BalanceReport> {
        let battery_sn = balance.battery.get_battery_sn()?;
        info!("connected to SBM {battery_sn} ({})", balance.uuid);

        if balance.battery.is_balanced(balance.config.delta)? {
            info!("battery already appears to be well balanced");
            for _ in 0..3 {
                balance.battery.off()?;
                balance.battery.sercom_mut().pause(Duration::from_millis(500));
            }
            return Ok(BalanceReport {
                battery_sn,
                outcome: BalanceOutcome::AlreadyBalanced,
                log: None,
                cycles: 0,
            });
        }

        let result = Self::balance(balance, battery_sn, stop);
        if let Err(e) = balance.battery.off() {
            warn!("unable to switch SBM {battery_sn} off: {e}");
        }
        result
    }

    fn balance<L: SerialLink>(
        balance: &mut BatteryBalance<L>,
        battery_sn: u64,
        stop: &StopSignal,
    ) -> Result<BalanceReport> {
        let config = balance.config.clone();
        let battery = &mut balance.battery;

        fs::create_dir_all(&config.log_directory)?;
        let path = config
            .log_directory
            .join(format!("SBM{battery_sn}_{}.txt", Utc::now().format("%Y-%m-%d")));
        let mut log = QctLog::append(&path)?;
        log.header(&format!("Bluefin 1.5kWh {battery_sn} Balance Log"))?;
        for _ in 0..3 {
            log.header("")?;
        }
        log.header("datetime,voltage_array,temperature")?;

        let start = Instant::now();
        let mut cycles = 0;
        let outcome = loop {
            let cycle_start = Instant::now();
            if stopped(stop) {
                break BalanceOutcome::Stopped;
            }
            let temperature = battery.get_summary()?.temperature;
            info!("battery temperature {temperature} degC");
            if temperature > config.max_temperature {
                warn!(
                    "battery temperature exceeded {} degC, let it cool down and apply a fan for the next attempt",
                    config.max_temperature
                );
                break BalanceOutcome::OverTemperature(temperature);
            }
            if start.elapsed() > config.timeout {
                warn!("balancing timed out, it should not take this long to balance a battery");
                break BalanceOutcome::TimedOut;
            }

            let now = Utc::now().format(ROW_TIMESTAMP).to_string();
            battery.balance_non_min_cells(config.delta)?;
            cycles += 1;
            battery.sercom_mut().pause(Duration::from_secs(1));
            if battery.is_balanced(config.delta)? {
                info!("battery is balanced");
                break BalanceOutcome::Balanced;
            }
            let voltages = battery.get_cell_voltages()?;
            log.header(&format!("{now},{voltages:?},{temperature:?}"))?;
            log.flush()?;

            let wait = config.period.saturating_sub(cycle_start.elapsed());
            if !wait.is_zero() {
                info!("waiting {} seconds before checking again", wait.as_secs());
                battery.sercom_mut().pause(wait);
            }
        };

        Ok(BalanceReport {
            battery_sn,
            outcome,
            log: Some(path),
            cycles,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serial_test::serial;
    use crate::{
        devices::hardware::sercom::Sercom,
        utils::{
            signal::stop_signal,
            tests::{scratch_dir, MockLink},
        },
    };
    use std::sync::atomic::Ordering;

    pub const VERSION: &str = "$00z0 1 m 4021 1187 30 20 SBM15 v2.14 \r\n";

    /// Summary line with the given cell extremes and temperature.
    pub fn summary(min_cell: f64, max_cell: f64, temperature: f64) -> String {
        format!("$00q0 d- 29.104 -1.250 {temperature} {min_cell} {max_cell} 0 36.4 01:02:03 m 0 0 600\r\n")
    }

    fn balance(link: MockLink, dir: &std::path::Path) -> BatteryBalance<MockLink> {
        let battery = Bluefin::with_sercom(Sercom::new(link, "bluefin"), 0).unwrap();
        BatteryBalance::with_battery(battery, BalanceConfig::new("bluefin.yaml", dir))
    }

    fn offs(balance: &BatteryBalance<MockLink>) -> usize {
        balance.battery().sercom().link().written_text().matches("#00bf").count()
    }

    #[test]
    fn test_already_balanced_switches_off_three_times() {
        let dir = scratch_dir("balanced");
        let link = MockLink::new()
            .on("#00z0", VERSION)
            .on("#00q0", summary(3.632, 3.651, 21.5));
        let mut balance = balance(link, &dir);
        let report = BalanceController::start(&mut balance, &stop_signal()).unwrap();
        assert_eq!(report.outcome, BalanceOutcome::AlreadyBalanced);
        assert_eq!(report.log, None);
        assert_eq!(offs(&balance), 3);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_balance_until_balanced() {
        let dir = scratch_dir("balance");
        let link = MockLink::new()
            .on("#00z0", VERSION)
            .on("#00q0", summary(3.632, 3.701, 21.5))
            .on("#00q0", summary(3.632, 3.701, 22.0))
            .on("#00q1", "$00q1 3.632 3.701 3.640\r\n")
            .on("#00b1", "1\r\n")
            .on("#00q0", summary(3.632, 3.680, 22.0))
            .on("#00q1", "$00q1 3.632 3.680 3.640\r\n")
            .on("#00q0", summary(3.632, 3.650, 22.5))
            .on("#00q1", "$00q1 3.632 3.650 3.640\r\n")
            .on("#00q0", summary(3.632, 3.650, 22.5));
        let mut balance = balance(link, &dir);

        let report = BalanceController::start(&mut balance, &stop_signal()).unwrap();
        assert_eq!(report.outcome, BalanceOutcome::Balanced);
        assert_eq!(report.cycles, 2);
        assert_eq!(offs(&balance), 1);
        assert_eq!(balance.battery().sercom().link().unused_replies(), 0);

        let log = report.log.unwrap();
        assert_eq!(log.file_name().unwrap().to_string_lossy(), format!("SBM1187_{}.txt", Utc::now().format("%Y-%m-%d")));
        let text = fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Bluefin 1.5kWh 1187 Balance Log");
        assert_eq!(lines[4], "datetime,voltage_array,temperature");
        assert!(lines[5].ends_with("Z,[3.632, 3.68, 3.64],22.0"), "{}", lines[5]);
        assert_eq!(lines.len(), 6);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_balance_stops_when_hot() {
        let dir = scratch_dir("balance-hot");
        let link = MockLink::new()
            .on("#00z0", VERSION)
            .on("#00q0", summary(3.632, 3.701, 40.0))
            .on("#00q0", summary(3.632, 3.701, 42.5));
        let mut balance = balance(link, &dir);
        let report = BalanceController::start(&mut balance, &stop_signal()).unwrap();
        assert_eq!(report.outcome, BalanceOutcome::OverTemperature(42.5));
        assert_eq!(report.cycles, 0);
        assert_eq!(offs(&balance), 1);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_balance_honours_stop_signal() {
        let dir = scratch_dir("balance-stop");
        let link = MockLink::new()
            .on("#00z0", VERSION)
            .on("#00q0", summary(3.632, 3.701, 21.5));
        let mut balance = balance(link, &dir);
        let stop = stop_signal();
        stop.store(true, Ordering::Relaxed);
        let report = BalanceController::start(&mut balance, &stop).unwrap();
        assert_eq!(report.outcome, BalanceOutcome::Stopped);
        assert_eq!(offs(&balance), 1);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_read_write_balance_config_file() {
        let write_config = BalanceConfig::new("config/devices/bluefin.yaml", "/tmp/bluefin").with_delta(0.02);
        let path = format!("{}/config/components/balance.yaml", env!("CARGO_MANIFEST_DIR"));
        yaml::to_yaml_file(&write_config, &path).unwrap();
        let read_config = BalanceConfig::from_file(&path).unwrap();
        assert_eq!(write_config, read_config, "Failed to be created equally");
    }
}
