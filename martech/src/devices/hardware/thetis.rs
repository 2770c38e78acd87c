use crate::{
    devices::hardware::sercom::{Eol, Sercom, SerialConfig, SerialLink, CHECK_INTERVAL},
    error::{MartechError, Result},
    messages::{
        bluefin::summary::BatterySummary,
        thetis::{
            bulk::{classify, BulkBlock},
            listing::{parse_directory, FileEntry},
            sentence::{Command, Listener, Sentence},
        },
    },
    utils::yaml,
};
use chrono::{NaiveDateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use serialport::SerialPort;
use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use strum_macros::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

/// Line speed of the controller console, and of every passthrough.
pub const THETIS_BAUD_RATE: u32 = 115200;

/// Longest directory name the controller accepts.
pub const MAX_DIRECTORY_LEN: usize = 8;

/// Delay after a file has been written before the next request.
pub const POST_TRANSFER_DELAY: Duration = Duration::from_secs(3);

/// Time format the controller uses in `DATE` replies.
const DATE_FORMAT: &str = "%m/%d/%YT%H:%M:%S";

/// Requested or reported power state of a peripheral.
#[derive(
    EnumString, IntoStaticStr, Display, Deserialize, Serialize, Copy, Clone, Debug, PartialEq, Eq,
)]
#[strum(ascii_case_insensitive)]
pub enum PowerState {
    #[strum(serialize = "ON")]
    #[serde(rename = "ON")]
    On,
    #[strum(serialize = "OFF")]
    #[serde(rename = "OFF")]
    Off,
}

impl PowerState {
    /// Argument used on the wire, `1` for on and `0` for off.
    pub fn flag(&self) -> u8 {
        match self {
            PowerState::On => 1,
            PowerState::Off => 0,
        }
    }

    /// State from a wire flag.
    pub fn from_flag(flag: u8) -> Self {
        if flag == 0 {
            PowerState::Off
        } else {
            PowerState::On
        }
    }
}

/// Reading of the surface pressure switch.
#[derive(EnumString, IntoStaticStr, Display, Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[strum(serialize_all = "UPPERCASE")]
pub enum SurfaceState {
    Submerged,
    Surface,
    Unknown,
}

/// The kinds of file the controller holds. Each is requested and
/// handshaken a little differently.
#[derive(EnumString, IntoStaticStr, Display, Deserialize, Serialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileClass {
    /// Full resolution profile data.
    Data,
    /// Controller debug log.
    Debug,
    /// Decimated profile data, requested with `GDF`.
    Decimated,
    /// File transferred from the winch controller.
    Winch,
}

impl FileClass {
    /// Classify a controller file by its name. `PPD`, `ACD` and `SND` files
    /// are decimated, `DBG` files are debug logs, everything else is data.
    pub fn from_name(name: &str) -> Self {
        if ["PPD", "ACD", "SND"].iter().any(|m| name.contains(m)) {
            FileClass::Decimated
        } else if name.contains("DBG") {
            FileClass::Debug
        } else {
            FileClass::Data
        }
    }

    /// Request mnemonic.
    pub fn request(&self) -> &'static str {
        match self {
            FileClass::Decimated => "GDF",
            _ => "GET",
        }
    }

    /// Wait between sending the request and the first read.
    pub fn initial_delay(&self) -> Duration {
        match self {
            FileClass::Debug => Duration::from_millis(100),
            _ => Duration::from_millis(500),
        }
    }

    /// Wait between acknowledging a block and reading the next one. A
    /// 512 byte handshake takes the controller about 60 ms.
    pub fn handshake_delay(&self) -> Duration {
        match self {
            FileClass::Data => Duration::from_millis(75),
            _ => Duration::from_millis(100),
        }
    }

    /// Name the offloaded file is written under.
    pub fn local_name(&self, name: &str) -> String {
        match self {
            FileClass::Decimated => {
                let mut chars = name.chars();
                chars.next_back();
                format!("{}D", chars.as_str())
            }
            _ => name.to_string(),
        }
    }
}

/// Memory on the control can, in bytes.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct Memory {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Scooch settings, the periodic small moves the profiler makes while
/// parked.
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct Scooch {
    /// Minutes between scooches.
    pub interval: u32,
    /// Largest move in encoder counts.
    pub max_delta: u32,
    /// Cumulative encoder counts before returning to the home depth.
    pub travel: u32,
    /// Smallest move in encoder counts.
    pub min_delta: u32,
}

impl Default for Scooch {
    fn default() -> Self {
        Self {
            interval: 250,
            max_delta: 5000,
            travel: 150000,
            min_delta: 2500,
        }
    }
}

/// Version reply. The first field is the profiler number.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct VersionInfo {
    pub fields: Vec<String>,
}

impl VersionInfo {
    /// Profiler number as reported.
    pub fn profiler_id(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or("")
    }

    /// Profiler name, e.g. `WLP-007`.
    pub fn profiler_name(&self) -> String {
        format!("WLP-{:0>3}", self.profiler_id())
    }
}

/// Connection and timing parameters for a profiler.
#[serde_as]
#[derive(Deserialize, Serialize, Clone, PartialEq, Debug)]
pub struct ThetisConfig {
    /// Serial line to the controller console.
    pub serial: SerialConfig,
    /// Time the controller needs to list its own files.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_dir_wait")]
    pub dir_wait: Duration,
    /// Time the winch controller needs to list its files.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_winch_dir_wait")]
    pub winch_dir_wait: Duration,
    /// Attempts at switching the sensors off before giving up.
    #[serde(default = "default_power_retries")]
    pub power_retries: u32,
}

fn default_dir_wait() -> Duration {
    Duration::from_secs(30)
}

fn default_winch_dir_wait() -> Duration {
    Duration::from_secs(3)
}

fn default_power_retries() -> u32 {
    10
}

impl ThetisConfig {
    /// Default timings on the given port.
    ///
    /// * `port`: system specific port name.
    pub fn new<S: Into<String>>(port: S) -> Self {
        Self {
            serial: SerialConfig::new(port, THETIS_BAUD_RATE),
            dir_wait: default_dir_wait(),
            winch_dir_wait: default_winch_dir_wait(),
            power_retries: default_power_retries(),
        }
    }

    /// Create a `ThetisConfig` by reading data from a file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        yaml::from_yaml_file(filepath)
    }
}

/// Driver for the Thetis profiler controller and, through it, the winch
/// controller.
pub struct Thetis<L: SerialLink = Box<dyn SerialPort>> {
    /// Unique identifier for the profiler in the system.
    uuid: Uuid,
    sercom: Sercom<L>,
    config: ThetisConfig,
}

impl Thetis {
    /// Open the console port described by the config.
    ///
    /// * `config`: Set of config parameters.
    pub fn open(config: ThetisConfig) -> Result<Self> {
        let sercom = Sercom::open(&config.serial)?;
        Ok(Self::with_sercom(sercom, config))
    }

    /// Open a profiler from a config file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        Self::open(ThetisConfig::from_file(filepath)?)
    }
}

impl<L: SerialLink> Thetis<L> {
    /// Drive a profiler over an existing connection.
    pub fn with_sercom(sercom: Sercom<L>, config: ThetisConfig) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            sercom,
            config,
        }
    }

    /// Unique identifier of this driver instance.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Borrow the serial connection.
    pub fn sercom(&self) -> &Sercom<L> {
        &self.sercom
    }

    /// Mutably borrow the serial connection.
    pub fn sercom_mut(&mut self) -> &mut Sercom<L> {
        &mut self.sercom
    }

    /// Hand the connection over, e.g. to a sensor driver after a
    /// passthrough has been opened.
    pub fn into_sercom(self) -> Sercom<L> {
        self.sercom
    }

    /// Split the driver so the connection can be lent to a sensor driver
    /// during a passthrough. Rebuild with [`Thetis::with_sercom`].
    pub fn into_parts(self) -> (Sercom<L>, ThetisConfig) {
        (self.sercom, self.config)
    }

    /// Close the connection.
    pub fn close(self) -> L {
        self.sercom.close()
    }

    /// Clear the input and output buffers.
    pub fn clear_buffers(&mut self) -> Result<()> {
        self.sercom.clear_buffers()
    }

    fn send(&mut self, command: &Command) -> Result<()> {
        self.sercom.write_command(&command.encode(), Eol::Lf)
    }

    /// Send a command and read one reply line.
    fn exchange(&mut self, command: &Command) -> Result<String> {
        self.send(command)?;
        self.sercom.read_line()
    }

    /// Send a command and parse its reply.
    fn query(&mut self, command: &Command) -> Result<Sentence> {
        let reply = self.exchange(command)?;
        Sentence::parse(&reply).map_err(|_| {
            MartechError::no_match(&command.encode(), "$PWETA", &reply)
        })
    }

    /// Send a numeric setting and check that the echoed value is at most
    /// `tolerance` below the requested one and never above it.
    fn set_number(&mut self, command: Command, expected: f64, tolerance: f64) -> Result<bool> {
        let reply = self.query(&command)?;
        if reply.is_nak() {
            warn!("{} was refused", command.mnemonic());
            return Ok(false);
        }
        let actual: f64 = reply.parse_first(static_field(command.mnemonic()))?;
        let accepted = (expected - tolerance - f64::EPSILON..=expected + f64::EPSILON).contains(&actual);
        if accepted {
            info!("{} set to {}", command.mnemonic(), reply.first());
        } else {
            warn!("{} reported {} after requesting {}", command.mnemonic(), actual, expected);
        }
        Ok(accepted)
    }

    // ----------------------------------------------------------------
    // Directories
    // ----------------------------------------------------------------

    /// Change directory. Pass `..` to move up one level.
    ///
    /// * `directory`: known directory or subdirectory name.
    /// * `listener`: controller whose directory to change.
    pub fn change_directory(&mut self, directory: &str, listener: Listener) -> Result<bool> {
        let reply = self.query(&Command::new(listener, "CD").arg(directory_path(directory, listener)))?;
        let reported = reply.value();
        Ok(reported.contains(directory) || (reported.is_empty() && directory == ".."))
    }

    /// Move to the root directory.
    pub fn change_to_root_directory(&mut self, listener: Listener) -> Result<bool> {
        let reply = self.query(&Command::new(listener, "CD").arg("\\"))?;
        if reply.is_nak() {
            return Ok(false);
        }
        let reported = reply.value();
        let reported = reported.trim_end_matches('\\');
        Ok(reported.is_empty() || reported.ends_with(':'))
    }

    /// Create a directory in the working directory. Names longer than
    /// eight characters are refused without contacting the controller.
    ///
    /// * `directory`: directory name.
    /// * `listener`: controller to create it on.
    pub fn make_directory(&mut self, directory: &str, listener: Listener) -> Result<bool> {
        if directory.len() > MAX_DIRECTORY_LEN {
            warn!("subdirectories must be {MAX_DIRECTORY_LEN} alphanumeric characters or less");
            return Ok(false);
        }
        let reply = self.query(&Command::new(listener, "MKD").arg(directory_path(directory, listener)))?;
        Ok(reply.command == "MKD")
    }

    /// Remove a subdirectory of the working directory.
    pub fn remove_directory(&mut self, directory: &str) -> Result<bool> {
        let reply = self.query(&Command::new(Listener::PC, "RMD").arg(directory_path(directory, Listener::PC)))?;
        if reply.is_nak() {
            info!("directory {directory} does not exist, could not remove");
        }
        Ok(reply.command == "RMD")
    }

    /// Current working directory, `root` at the top level.
    pub fn get_working_directory(&mut self, listener: Listener) -> Result<String> {
        let reply = self.query(&Command::new(listener, "PWD"))?;
        let structure = reply.value();
        if structure.is_empty() {
            Ok("root".to_string())
        } else {
            Ok(structure)
        }
    }

    /// List the files in the working directory. The controller needs a
    /// while to walk its card, the winch much less.
    pub fn list_files(&mut self, listener: Listener) -> Result<Vec<FileEntry>> {
        self.send(&Command::new(listener, "DIR").arg("#.#"))?;
        let wait = match listener {
            Listener::PC => self.config.dir_wait,
            Listener::WC => self.config.winch_dir_wait,
        };
        self.sercom.pause(wait);
        let listing = self.sercom.read_response(CHECK_INTERVAL)?;
        let entries = parse_directory(&listing);
        debug!("{listener} lists {} files", entries.len());
        Ok(entries)
    }

    /// Delete files from the working directory.
    pub fn delete_files<S: AsRef<str>>(&mut self, names: &[S], listener: Listener) -> Result<()> {
        for name in names {
            self.send(&Command::new(listener, "DEL").arg(name.as_ref()))?;
            self.sercom.pause(Duration::from_millis(100));
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // Status
    // ----------------------------------------------------------------

    /// Switch data file logging on the controller. Returns the state the
    /// controller reports.
    pub fn data_logging(&mut self, state: PowerState) -> Result<PowerState> {
        let reply = self.query(&Command::new(Listener::PC, "LOG").arg(state.flag()))?;
        let reported = PowerState::from_flag(reply.parse_first("logging state")?);
        info!("data file logging is now {reported}");
        Ok(reported)
    }

    /// Total, used and free memory on the control can.
    pub fn get_memory(&mut self) -> Result<Memory> {
        let free: u64 = self.query(&Command::new(Listener::PC, "FREE"))?.parse_first("free memory")?;
        self.sercom.pause(Duration::from_millis(500));
        let total: u64 = self.query(&Command::new(Listener::PC, "TOTAL"))?.parse_first("total memory")?;
        Ok(Memory {
            total,
            used: total.saturating_sub(free),
            free,
        })
    }

    /// State of the surface pressure switch.
    pub fn get_surface_switch_status(&mut self) -> Result<SurfaceState> {
        self.send(&Command::new(Listener::PC, "PSW"))?;
        self.sercom.pause(Duration::from_millis(200));
        let reply = self.sercom.read_line()?;
        Ok(if reply.contains("SUBMERGED") {
            SurfaceState::Submerged
        } else if reply.contains("SURFACE") {
            SurfaceState::Surface
        } else {
            SurfaceState::Unknown
        })
    }

    /// Summary of the battery at a position, `None` when no battery
    /// answers there.
    ///
    /// * `position`: battery position, 1 or 2.
    pub fn get_battery_status(&mut self, position: u8) -> Result<Option<BatterySummary>> {
        self.send(&Command::new(Listener::PC, "BFS").arg(position))?;
        self.sercom.pause(Duration::from_secs(3));
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        let last = response
            .lines()
            .filter(|l| !l.trim().is_empty())
            .last()
            .unwrap_or("");
        if last.contains("LOCKED") {
            info!("no battery at position {position}");
            return Ok(None);
        }
        let reply = Sentence::parse(last)?;
        let fields = reply
            .args
            .last()
            .ok_or_else(|| MartechError::no_match("BFS", "battery summary", last))?;
        let summary = BatterySummary::parse(fields)?;
        info!(
            "battery {position}: {}V, min/max cell {}/{}, enabled for {}",
            summary.voltage, summary.min_cell, summary.max_cell, summary.runtime
        );
        Ok(Some(summary))
    }

    /// Controller version information.
    pub fn get_version(&mut self) -> Result<VersionInfo> {
        let reply = self.query(&Command::new(Listener::PC, "VER"))?;
        Ok(VersionInfo { fields: reply.args })
    }

    // ----------------------------------------------------------------
    // Power
    // ----------------------------------------------------------------

    fn power(&mut self, command: Command, state: PowerState, label: &str) -> Result<bool> {
        let reply = self.exchange(&command)?;
        let confirmed = reply.contains(<&str>::from(state));
        if confirmed {
            info!("{label} is now {state}");
        } else {
            warn!("{label} did not report {state}: {reply:?}");
        }
        Ok(confirmed)
    }

    /// Cycle the acoustic modem (OOI profilers only).
    pub fn power_acoustic_modem(&mut self, state: PowerState) -> Result<bool> {
        let command = Command::new(Listener::PC, "ATMP").arg(state.flag());
        let reply = self.exchange(&command)?;
        let confirmed = reply.contains(&format!("now {state}"));
        if confirmed {
            info!("acoustic modem is now {state}");
        }
        Ok(confirmed)
    }

    /// Switch the ACS pump.
    pub fn power_pump(&mut self, state: PowerState) -> Result<bool> {
        self.power(Command::new(Listener::PC, "PWR").arg("PMP").arg(state.flag()), state, "ACS pump")
    }

    /// Switch the winch.
    pub fn power_winch(&mut self, state: PowerState) -> Result<bool> {
        self.power(Command::new(Listener::PC, "WP").arg(state.flag()), state, "winch")
    }

    /// Switch the CTD and the instrument power together. Switching off is
    /// repeated until both report off, up to the configured retry count.
    pub fn power_sensors(&mut self, state: PowerState) -> Result<bool> {
        let settle = Duration::from_millis(500);
        let attempts = match state {
            PowerState::On => 1,
            PowerState::Off => self.config.power_retries.max(1),
        };
        for attempt in 1..=attempts {
            let ctd = self.exchange(&Command::new(Listener::PC, "CTDP").arg(state.flag()))?;
            if state == PowerState::Off {
                self.sercom.clear_buffers()?;
            }
            self.sercom.pause(settle);
            let instruments = self.exchange(&Command::new(Listener::PC, "INSP").arg(state.flag()))?;
            if state == PowerState::Off {
                self.sercom.clear_buffers()?;
                self.sercom.pause(settle);
            }
            let label: &str = state.into();
            if ctd.contains(label) && instruments.contains(label) {
                info!("sensors are now {state}");
                return Ok(true);
            }
            if attempt < attempts {
                debug!("sensors not yet {state}, retrying");
                self.sercom.pause(Duration::from_secs(1));
            }
        }
        warn!("sensors did not report {state} after {attempts} attempts");
        Ok(false)
    }

    /// Engage (`On`) or release (`Off`) the winch brake. Returns true when
    /// the winch controller echoes the requested state.
    pub fn winch_brake(&mut self, state: PowerState) -> Result<bool> {
        self.send(&Command::new(Listener::WC, "B").arg(state.flag()))?;
        self.sercom.pause(Duration::from_millis(50));
        let reply = self.sercom.read_line()?;
        let engaged = if reply.contains("B,1,1") {
            Some(PowerState::On)
        } else if reply.contains("B,1,0") {
            Some(PowerState::Off)
        } else {
            None
        };
        if let Some(engaged) = engaged {
            info!("brake is {engaged}");
        }
        Ok(engaged == Some(state))
    }

    /// Stop a file offload. The buffers are cleared afterwards so no
    /// partial block is carried over.
    pub fn send_break(&mut self) -> Result<()> {
        self.send(&Command::new(Listener::PC, "BREAK"))?;
        self.sercom.pause(Duration::from_millis(100));
        self.sercom.clear_buffers()
    }

    /// Drop to PicoDOS, keeping peripherals powered.
    pub fn exit_to_picodos(&mut self) -> Result<()> {
        self.send(&Command::new(Listener::PC, "EXIT"))?;
        self.sercom.pause(Duration::from_secs(3));
        Ok(())
    }

    /// Drop to PicoDOS, switching instruments off first.
    pub fn quit_to_picodos(&mut self) -> Result<()> {
        self.send(&Command::new(Listener::PC, "Q"))?;
        self.sercom.pause(Duration::from_secs(3));
        Ok(())
    }

    // ----------------------------------------------------------------
    // Settings
    // ----------------------------------------------------------------

    /// Depth (m) at which the profiler breaks away from the surface. Should
    /// be shallower than the radio depth.
    pub fn set_breakaway_depth(&mut self, depth: f64) -> Result<bool> {
        self.set_number(Command::new(Listener::PC, "BD").arg(decimal(depth)), depth, 0.0)
    }

    /// Parking depth (m).
    pub fn set_parking_depth(&mut self, depth: f64) -> Result<bool> {
        self.set_number(Command::new(Listener::PC, "PKD").arg(decimal(depth)), depth, 0.0)
    }

    /// Depth (m) at which the radio is used.
    pub fn set_radio_depth(&mut self, depth: f64) -> Result<bool> {
        self.set_number(Command::new(Listener::PC, "RD").arg(decimal(depth)), depth, 0.0)
    }

    /// Winch depth offset (m).
    pub fn set_depth_offset(&mut self, offset: f64) -> Result<bool> {
        self.set_number(Command::new(Listener::WC, "DO").arg(decimal(offset)), offset, 0.0)
    }

    /// Winch spool length scale factor.
    pub fn set_slsf(&mut self, factor: f64) -> Result<bool> {
        self.set_number(Command::new(Listener::WC, "SLSF").arg(decimal(factor)), factor, 0.0)
    }

    /// Stop amps for the winch in surface hold mode. Positive values spool
    /// rope on; negative values are not recommended. The controller rounds
    /// the current down, so an echo up to 0.01 A short is accepted.
    pub fn set_sta(&mut self, amps: f64) -> Result<bool> {
        self.set_number(Command::new(Listener::WC, "STA").arg(decimal(amps)), amps, 0.01)
    }

    /// Bytes sent per handshake during offloads. Values above 512 may lead
    /// to incomplete transfers, and the value affects telemetry so it should
    /// be reset before deployment.
    pub fn set_buf(&mut self, bytes: u32) -> Result<bool> {
        let command = Command::new(Listener::PC, "BUF").arg(bytes);
        self.send(&command)?;
        self.sercom.pause(Duration::from_millis(150));
        let reply = self.sercom.read_line()?;
        let actual: u32 = Sentence::parse(&reply)?.parse_first("BUF")?;
        Ok(actual == bytes)
    }

    /// Winch hold mode, 1 to operate at the surface against the stop amps.
    pub fn set_hld(&mut self, mode: u8) -> Result<bool> {
        self.set_number(Command::new(Listener::PC, "HLD").arg(mode), f64::from(mode), 0.0)
    }

    /// Profile counter, 0 for a new deployment.
    pub fn set_profile_number(&mut self, number: u32) -> Result<bool> {
        self.set_number(Command::new(Listener::PC, "num").arg(number), f64::from(number), 0.0)
    }

    /// Scooch settings. All four values must be echoed back.
    pub fn set_scooch(&mut self, scooch: Scooch) -> Result<bool> {
        let requested = [scooch.interval, scooch.max_delta, scooch.travel, scooch.min_delta];
        let mut command = Command::new(Listener::PC, "SCS");
        for value in requested {
            command = command.arg(value);
        }
        let reply = self.query(&command)?;
        let reported: Vec<f64> = reply.args.iter().filter_map(|a| a.trim().parse().ok()).collect();
        let expected: Vec<f64> = requested.iter().map(|v| f64::from(*v)).collect();
        Ok(reported == expected)
    }

    /// Primary and secondary battery voltage thresholds.
    pub fn set_battery_thresholds(&mut self, primary: f64, secondary: f64) -> Result<bool> {
        let command = Command::new(Listener::PC, "BLV").arg(decimal(primary)).arg(decimal(secondary));
        let reply = self.query(&command)?;
        let reported: Vec<f64> = reply.args.iter().filter_map(|a| a.trim().parse().ok()).collect();
        Ok(reported == [primary, secondary])
    }

    /// GPS power.
    pub fn set_gps_power(&mut self, state: PowerState) -> Result<bool> {
        self.set_number(Command::new(Listener::PC, "GPS").arg(state.flag()), f64::from(state.flag()), 0.0)
    }

    /// GPS fix acquisition after each profile.
    pub fn set_gps_after_profile(&mut self, state: PowerState) -> Result<bool> {
        self.set_number(Command::new(Listener::PC, "GGF").arg(state.flag()), f64::from(state.flag()), 0.0)
    }

    /// Switch off the wave height estimator.
    pub fn turn_off_wave_height_estimator(&mut self) -> Result<bool> {
        let reply = self.query(&Command::new(Listener::PC, "WHS").arg(0))?;
        Ok(reply.parse_first::<i32>("WHS")? == 0)
    }

    /// Set the controller clock to the current UTC time.
    ///
    /// * `tzo`: timezone offset, 0 - 23.
    pub fn set_datetime(&mut self, tzo: u8) -> Result<bool> {
        let now = Utc::now().naive_utc();
        self.set_datetime_to(now, tzo)
    }

    /// Set the controller clock and check the time it reports back.
    ///
    /// * `time`: UTC time to set, sub-second precision is dropped.
    /// * `tzo`: timezone offset, 0 - 23.
    pub fn set_datetime_to(&mut self, time: NaiveDateTime, tzo: u8) -> Result<bool> {
        if tzo > 23 {
            return Err(MartechError::InvalidArgument(format!(
                "timezone offset {tzo} is outside 0 - 23"
            )));
        }
        let command = Command::new(Listener::PC, "DATE")
            .arg(time.format("%m/%d/%Y"))
            .arg(time.format("%H:%M:%S"))
            .arg(tzo);
        let reply = self.query(&command)?;
        let (date, clock) = match reply.args.as_slice() {
            [date, clock, ..] => (date, clock),
            _ => return Err(MartechError::no_match("DATE", "date,time", &reply.value())),
        };
        let reported = NaiveDateTime::parse_from_str(&format!("{date}T{clock}"), DATE_FORMAT)
            .map_err(|_| MartechError::parse("controller time", &reply.value()))?;
        let requested = time.format(DATE_FORMAT).to_string();
        Ok(reported.format(DATE_FORMAT).to_string() == requested)
    }

    // ----------------------------------------------------------------
    // File transfer
    // ----------------------------------------------------------------

    /// Acknowledge a bulk block.
    pub fn send_ack(&mut self) -> Result<()> {
        self.send(&Command::ack())
    }

    /// Refuse a bulk block.
    pub fn send_nak(&mut self) -> Result<()> {
        self.send(&Command::nak())
    }

    /// Offload one file into `directory`. Every data block is acknowledged
    /// until the controller reports the end of the file. A link that stays
    /// quiet for longer than the stall guard aborts the transfer.
    ///
    /// * `name`: file name on the controller.
    /// * `class`: how to request and name the file.
    /// * `directory`: local directory to write into.
    pub fn get_file<P: AsRef<Path>>(
        &mut self,
        name: &str,
        class: FileClass,
        directory: P,
    ) -> Result<PathBuf> {
        self.send(&Command::new(Listener::PC, class.request()).arg(name))?;
        self.sercom.pause(class.initial_delay());

        let handshake = class.handshake_delay();
        let mut data = Vec::new();
        let mut idle = Duration::ZERO;
        loop {
            let block = self.sercom.read_bytes(handshake)?;
            match classify(&block) {
                BulkBlock::Data(payload) => {
                    debug!("{name}: {} byte block", payload.len());
                    data.extend_from_slice(payload);
                    idle = Duration::ZERO;
                    self.send_ack()?;
                }
                BulkBlock::Finished => break,
                BulkBlock::Empty | BulkBlock::Unrecognised => {
                    idle += handshake;
                    if idle > self.sercom.stall_guard() {
                        self.sercom.clear_buffers()?;
                        return Err(MartechError::TransferStalled {
                            filename: name.to_string(),
                            received: data.len(),
                        });
                    }
                }
            }
        }

        let path = directory.as_ref().join(class.local_name(name));
        fs::write(&path, &data)?;
        self.sercom.clear_buffers()?;
        info!("{} offloaded ({} bytes)", path.display(), data.len());
        self.sercom.pause(POST_TRANSFER_DELAY);
        Ok(path)
    }

    /// Offload files, choosing the request for each from its name.
    /// Decimated files must be offloaded before the full files they were
    /// derived from.
    pub fn offload_files<S: AsRef<str>, P: AsRef<Path>>(
        &mut self,
        names: &[S],
        directory: P,
    ) -> Result<Vec<PathBuf>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.get_file(name, FileClass::from_name(name), directory.as_ref())
            })
            .collect()
    }

    /// Offload a winch file that has been transferred to the controller.
    pub fn get_winch_file<P: AsRef<Path>>(&mut self, name: &str, directory: P) -> Result<PathBuf> {
        self.get_file(name, FileClass::Winch, directory)
    }

    /// Copy every file on the winch controller to the profiler controller.
    /// Returns the names the winch reported as transferred.
    pub fn transfer_winch_files(&mut self) -> Result<Vec<String>> {
        let entries = self.list_files(Listener::WC)?;
        let mut transferred = Vec::new();
        for entry in entries {
            self.send(&Command::new(Listener::WC, "GWF").arg(&entry.name))?;
            self.sercom.pause(Duration::from_secs(1));
            let reply = self.sercom.read_line()?;
            if reply.contains("DONE") {
                info!("winch file {} transferred", entry.name);
                transferred.push(entry.name);
            } else {
                warn!("winch file {} was not transferred", entry.name);
            }
        }
        Ok(transferred)
    }

    // ----------------------------------------------------------------
    // Passthrough
    // ----------------------------------------------------------------

    /// Connect the console straight through to an instrument port. The
    /// instrument is then reached at the console baud rate until it is sent
    /// `$PWETQ`.
    ///
    /// * `port`: instrument port number on the controller.
    pub fn enter_passthru(&mut self, port: u8) -> Result<()> {
        self.send(&Command::new(Listener::PC, "PAS").arg(port))?;
        self.sercom.pause(Duration::from_millis(500));
        let reply = self.sercom.read_response(CHECK_INTERVAL)?;
        debug!("passthrough to port {port}: {reply:?}");
        Ok(())
    }

    // ----------------------------------------------------------------
    // PicoDOS
    // ----------------------------------------------------------------

    fn picodos(&mut self, command: &str) -> Result<String> {
        self.sercom.clear_buffers()?;
        self.sercom.write_command(command, Eol::Cr)?;
        self.sercom.pause(Duration::from_millis(500));
        self.sercom.read_until(b"C:\\>")
    }

    /// Return from PicoDOS to the profiler application.
    pub fn return_to_host(&mut self) -> Result<()> {
        self.sercom.write_command("APP", Eol::Cr)?;
        self.sercom.pause(Duration::from_secs(3));
        Ok(())
    }

    /// Package settings as printed by PicoDOS `SET`.
    pub fn get_package_settings(&mut self) -> Result<String> {
        self.picodos("SET")
    }

    /// Number of ACS wavelengths output.
    pub fn get_acs_output_setting(&mut self) -> Result<String> {
        self.picodos("SET PKG.ACSB")
    }

    /// Change the number of ACS wavelengths output.
    pub fn set_acs_output_setting(&mut self, wavelengths: u32) -> Result<String> {
        self.picodos(&format!("SET PKG.ACSB={wavelengths}"))
    }
}

/// Directory argument as each controller expects it: relative on the
/// profiler controller, absolute on the winch.
fn directory_path(directory: &str, listener: Listener) -> String {
    match listener {
        Listener::PC => format!(".\\{directory}"),
        Listener::WC => format!("\\{directory}"),
    }
}

/// Decimal rendering that keeps a trailing `.0` on whole numbers.
fn decimal(value: f64) -> String {
    format!("{value:?}")
}

fn static_field(mnemonic: &str) -> &'static str {
    match mnemonic {
        "BD" => "breakaway depth",
        "PKD" => "parking depth",
        "RD" => "radio depth",
        "DO" => "depth offset",
        "SLSF" => "spool length scale factor",
        "STA" => "stop amps",
        "HLD" => "hold mode",
        "num" => "profile number",
        "GPS" => "gps power",
        "GGF" => "gps after profile",
        _ => "setting",
    }
}
