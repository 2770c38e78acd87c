use crate::{
    components::{
        qct::{conformance::QctFlag, log::QctLog},
        thetis::offload::{order_files, OFFLOAD_ORDER},
    },
    devices::hardware::{
        sercom::SerialLink,
        thetis::{PowerState, Scooch, Thetis, ThetisConfig},
    },
    error::{MartechError, Result},
    messages::thetis::sentence::Listener,
    utils::yaml,
};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use serialport::SerialPort;
use std::{ffi::OsStr, fmt, fs, path::PathBuf, time::Duration};
use uuid::Uuid;

/// Directory under the controller root that holds every QCT run.
pub const TESTING_DIRECTORY: &str = "TESTING";

/// Deployment settings written to the profiler before it logs test data.
#[derive(Deserialize, Serialize, Clone, PartialEq, Debug)]
#[serde(default)]
pub struct ProfilerSettings {
    /// Timezone offset, 0 - 23.
    pub tzo: u8,
    /// Parking depth (m).
    pub parking_depth: f64,
    /// Radio depth (m).
    pub radio_depth: f64,
    pub gps_power: PowerState,
    pub gps_after_profile: PowerState,
    /// Winch depth offset (m).
    pub depth_offset: f64,
    /// Primary battery threshold (V).
    pub primary_battery_threshold: f64,
    /// Secondary battery threshold (V).
    pub secondary_battery_threshold: f64,
    /// Spool length scale factor.
    pub slsf: f64,
    pub scooch: Scooch,
    /// Winch stop amps.
    pub stop_amps: f64,
    pub profile_number: u32,
    pub hold_mode: u8,
    /// Breakaway depth (m).
    pub breakaway_depth: f64,
}

impl Default for ProfilerSettings {
    fn default() -> Self {
        Self {
            tzo: 0,
            parking_depth: 65.0,
            radio_depth: 1.0,
            gps_power: PowerState::Off,
            gps_after_profile: PowerState::Off,
            depth_offset: 0.6,
            primary_battery_threshold: 28.5,
            secondary_battery_threshold: 28.5,
            slsf: 1.45,
            scooch: Scooch::default(),
            stop_amps: 0.7,
            profile_number: 0,
            hold_mode: 1,
            breakaway_depth: 0.70,
        }
    }
}

/// Outcome of writing one setting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingResult {
    pub name: &'static str,
    pub value: String,
    pub accepted: bool,
}

impl SettingResult {
    fn new<T: fmt::Display>(name: &'static str, value: T, accepted: bool) -> Self {
        Self {
            name,
            value: value.to_string(),
            accepted,
        }
    }
}

/// Real-valued setting as the log shows it, always with a decimal point.
fn real(value: f64) -> String {
    format!("{value:?}")
}

impl fmt::Display for SettingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.name, self.value, QctFlag::from(self.accepted))
    }
}

/// Write every setting, in the order the controller manual lists them, and
/// collect whether each was echoed back.
///
/// * `thetis`: profiler to configure.
/// * `settings`: values to write.
pub fn apply_settings<L: SerialLink>(thetis: &mut Thetis<L>, settings: &ProfilerSettings) -> Result<Vec<SettingResult>> {
    let s = settings;
    let (primary, secondary) = (s.primary_battery_threshold, s.secondary_battery_threshold);
    let scooch = s.scooch;
    Ok(vec![
        SettingResult::new("Date Time", format!("UTC+{}", s.tzo), thetis.set_datetime(s.tzo)?),
        SettingResult::new("Parking Depth", real(s.parking_depth), thetis.set_parking_depth(s.parking_depth)?),
        SettingResult::new("Radio Depth", real(s.radio_depth), thetis.set_radio_depth(s.radio_depth)?),
        SettingResult::new("GPS Power", s.gps_power, thetis.set_gps_power(s.gps_power)?),
        SettingResult::new(
            "GPS After Profile",
            s.gps_after_profile,
            thetis.set_gps_after_profile(s.gps_after_profile)?,
        ),
        SettingResult::new("Depth Offset", real(s.depth_offset), thetis.set_depth_offset(s.depth_offset)?),
        SettingResult::new(
            "Battery Thresholds",
            format!("{primary:?},{secondary:?}"),
            thetis.set_battery_thresholds(primary, secondary)?,
        ),
        SettingResult::new("SLSF", real(s.slsf), thetis.set_slsf(s.slsf)?),
        SettingResult::new(
            "Scooch",
            format!(
                "{},{},{},{}",
                scooch.interval, scooch.max_delta, scooch.travel, scooch.min_delta
            ),
            thetis.set_scooch(scooch)?,
        ),
        SettingResult::new("Stop Amps", real(s.stop_amps), thetis.set_sta(s.stop_amps)?),
        SettingResult::new("Profile Number", s.profile_number, thetis.set_profile_number(s.profile_number)?),
        SettingResult::new("Hold Mode", s.hold_mode, thetis.set_hld(s.hold_mode)?),
        SettingResult::new("Wave Height Estimator", PowerState::Off, thetis.turn_off_wave_height_estimator()?),
        SettingResult::new("Breakaway Depth", real(s.breakaway_depth), thetis.set_breakaway_depth(s.breakaway_depth)?),
    ])
}

fn default_logging_time() -> Duration {
    Duration::from_secs(60)
}

fn default_sensor_settle() -> Duration {
    Duration::from_secs(30)
}

/// Configuration of the profiler settings QCT.
#[serde_as]
#[derive(Deserialize, Serialize, Clone, PartialEq, Debug)]
pub struct ProfilerQctConfig {
    /// Config of the profiler under test.
    pub thetis_config_file: PathBuf,
    /// Where the QCT log and offloaded files are written.
    pub output_directory: PathBuf,
    #[serde(default)]
    pub settings: ProfilerSettings,
    /// Time the profiler logs with the sensors on.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_logging_time")]
    pub logging_time: Duration,
    /// Time allowed after the sensors are switched off.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_sensor_settle")]
    pub sensor_settle: Duration,
}

impl ProfilerQctConfig {
    /// Default settings and timings.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(thetis_config_file: P, output_directory: Q) -> Self {
        Self {
            thetis_config_file: thetis_config_file.into(),
            output_directory: output_directory.into(),
            settings: ProfilerSettings::default(),
            logging_time: default_logging_time(),
            sensor_settle: default_sensor_settle(),
        }
    }

    /// Replace the deployment settings.
    pub fn with_settings(mut self, settings: ProfilerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Create a `ProfilerQctConfig` by reading data from a file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        yaml::from_yaml_file(filepath)
    }
}

/// What a profiler QCT produced.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfilerQctReport {
    pub log: PathBuf,
    pub settings: Vec<SettingResult>,
    pub files: Vec<PathBuf>,
}

impl ProfilerQctReport {
    /// Pass when every setting was accepted and data files were written.
    pub fn flag(&self) -> QctFlag {
        QctFlag::from(self.settings.iter().all(|s| s.accepted) && !self.files.is_empty())
    }
}

/// Settings and logging check of a profiler.
pub struct ProfilerQct<L: SerialLink = Box<dyn SerialPort>> {
    uuid: Uuid,
    thetis: Thetis<L>,
    config: ProfilerQctConfig,
}

impl ProfilerQct {
    pub fn new(config: ProfilerQctConfig) -> Result<Self> {
        let thetis = Thetis::open(ThetisConfig::from_file(&config.thetis_config_file)?)?;
        Ok(Self::with_thetis(thetis, config))
    }

    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        Self::new(ProfilerQctConfig::from_file(filepath)?)
    }
}

impl<L: SerialLink> ProfilerQct<L> {
    pub fn with_thetis(thetis: Thetis<L>, config: ProfilerQctConfig) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            thetis,
            config,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn thetis(&self) -> &Thetis<L> {
        &self.thetis
    }
}

/// Unit struct that runs a [`ProfilerQct`].
pub struct ProfilerQctController;

impl ProfilerQctController {
    /// Run the QCT: settings, a short logging run and an offload of what
    /// was logged into the output directory.
    ///
    /// * `qct`: profiler and configuration.
    /// * `operator`: name of the person running the test.
    pub fn run<L: SerialLink>(qct: &mut ProfilerQct<L>, operator: &str) -> Result<ProfilerQctReport> {
        let config = qct.config.clone();
        let thetis = &mut qct.thetis;
        fs::create_dir_all(&config.output_directory)?;

        let today = Utc::now();
        let profiler = thetis.get_version()?.profiler_name();
        let path = config
            .output_directory
            .join(format!("QCT_{profiler}_{}.txt", today.format("%Y-%m-%d")));
        let mut log = QctLog::create(&path)?;
        log.header(&format!("Profiler: {profiler}"))?;
        log.header(&format!("Operator: {operator}"))?;
        log.header(&format!("QCT Date: {}", today.format("%Y-%m-%d")))?;

        let test_directory = format!("QT{}", today.format("%y%m%d"));
        thetis.change_to_root_directory(Listener::PC)?;
        thetis.make_directory(TESTING_DIRECTORY, Listener::PC)?;
        thetis.change_directory(TESTING_DIRECTORY, Listener::PC)?;
        thetis.make_directory(&test_directory, Listener::PC)?;
        if !thetis.change_directory(&test_directory, Listener::PC)? {
            log.header(&format!("Unable to use {TESTING_DIRECTORY}\\{test_directory}"))?;
            return Err(MartechError::Rejected(format!(
                "{profiler} could not change into {test_directory}"
            )));
        }
        log.header(&format!("QCT Directory: {test_directory}"))?;

        log.header("---SETTINGS---")?;
        let settings = apply_settings(thetis, &config.settings)?;
        for setting in &settings {
            if !setting.accepted {
                warn!("{setting}");
            }
            log.header(&setting.to_string())?;
        }

        info!("{profiler} logging for {}s", config.logging_time.as_secs());
        thetis.data_logging(PowerState::On)?;
        thetis.power_sensors(PowerState::On)?;
        thetis.power_pump(PowerState::Off)?;
        thetis.sercom_mut().pause(config.logging_time);
        thetis.power_sensors(PowerState::Off)?;
        thetis.sercom_mut().pause(config.sensor_settle);
        thetis.data_logging(PowerState::Off)?;
        thetis.sercom_mut().pause(Duration::from_secs(1));

        let entries = thetis.list_files(Listener::PC)?;
        let names = order_files(&entries, &OFFLOAD_ORDER);
        let files = thetis.offload_files(&names, &config.output_directory)?;
        let listed: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        log.header(&format!("QCT Files: {}", listed.join(", ")))?;
        log.flush()?;

        Ok(ProfilerQctReport {
            log: path,
            settings,
            files,
        })
    }
}
