use crate::{
    devices::hardware::sercom::{Eol, Sercom, SerialConfig, SerialLink, CHECK_INTERVAL},
    error::{MartechError, Result},
    utils::yaml,
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::{ffi::OsStr, sync::OnceLock, time::Duration};
use uuid::Uuid;

/// Factory line speed of the nitrate sensor.
pub const SUNA_BAUD_RATE: u32 = 57600;

const STOP_ATTEMPTS: u32 = 10;

/// Time the sensor needs to come back after a wiper cycle, also allowed for
/// the wiper at the start of an autosample.
pub const WIPER_WAIT: Duration = Duration::from_secs(20);

/// Time the self test takes.
pub const SELFTEST_WAIT: Duration = Duration::from_secs(30);

/// Clock format accepted by `set clock`.
const CLOCK_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Marker present on every frame of autosampled data.
const FRAME_MARKER: &str = "SAT";

fn ok_pattern() -> &'static Regex {
    static OK: OnceLock<Regex> = OnceLock::new();
    OK.get_or_init(|| Regex::new(r"Ok (.*?)\r").expect("valid reply pattern"))
}

/// A file stored on the sensor.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SunaFile {
    pub name: String,
    /// Date as printed by the sensor.
    pub date: String,
    /// Size in bytes.
    pub size: u64,
}

/// One cell of an autosampled frame.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum FrameValue {
    Number(f64),
    Text(String),
}

impl From<&str> for FrameValue {
    fn from(cell: &str) -> Self {
        match cell.parse() {
            Ok(number) => FrameValue::Number(number),
            Err(_) => FrameValue::Text(cell.to_string()),
        }
    }
}

/// Driver for the Sea-Bird SUNA V2 nitrate sensor.
pub struct Suna<L: SerialLink = Box<dyn SerialPort>> {
    uuid: Uuid,
    sercom: Sercom<L>,
}

impl Suna {
    /// Open the sensor on its own port.
    ///
    /// * `config`: serial settings, normally at [`SUNA_BAUD_RATE`].
    pub fn open(config: &SerialConfig) -> Result<Self> {
        Ok(Self::new(Sercom::open(config)?))
    }

    /// Open the sensor from a serial config file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        let config: SerialConfig = yaml::from_yaml_file(filepath)?;
        Self::open(&config)
    }
}

impl<L: SerialLink> Suna<L> {
    pub fn new(sercom: Sercom<L>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            sercom,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn sercom(&self) -> &Sercom<L> {
        &self.sercom
    }

    pub fn into_sercom(self) -> Sercom<L> {
        self.sercom
    }

    /// Break into the command prompt. False if the prompt never shows.
    pub fn stop_sampling(&mut self) -> Result<bool> {
        for _ in 0..STOP_ATTEMPTS {
            self.sercom.write_command("$$$$$", Eol::Cr)?;
            self.sercom.write_command("", Eol::Cr)?;
            self.sercom.write_command("", Eol::Cr)?;
            let response = self.sercom.read_response(CHECK_INTERVAL)?;
            if response.contains("SUNA") {
                self.sercom.write_command("", Eol::Cr)?;
                self.sercom.write_command("", Eol::Cr)?;
                self.sercom.clear_buffers()?;
                return Ok(true);
            }
        }
        warn!("SUNA did not stop after {STOP_ATTEMPTS} attempts");
        Ok(false)
    }

    /// Leave the command prompt and resume the configured operation.
    pub fn start_sampling(&mut self) -> Result<()> {
        self.sercom.write_command("exit", Eol::CrLf)?;
        self.sercom.pause(Duration::from_secs(1));
        Ok(())
    }

    /// Send a query and return the value after `Ok`.
    fn get(&mut self, command: &str) -> Result<String> {
        self.sercom.write_command(command, Eol::CrLf)?;
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        ok_pattern()
            .captures_iter(&response)
            .last()
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| MartechError::no_match(command, ok_pattern().as_str(), &response))
    }

    fn get_number<T: std::str::FromStr>(&mut self, command: &str, field: &'static str) -> Result<T> {
        let value = self.get(command)?;
        value.trim().parse().map_err(|_| MartechError::parse(field, &value))
    }

    /// Free space on the internal disk in MB.
    pub fn get_disk_free(&mut self) -> Result<f64> {
        Ok(self.get_number::<u64>("get --diskfree", "disk free")? as f64 / 1e6)
    }

    /// Size of the internal disk in MB.
    pub fn get_disk_total(&mut self) -> Result<f64> {
        Ok(self.get_number::<u64>("get --disktotal", "disk total")? as f64 / 1e6)
    }

    /// Sensor clock as printed by the sensor.
    pub fn get_clock(&mut self) -> Result<String> {
        self.get("get clock")
    }

    /// Set the sensor clock to the current UTC time.
    pub fn set_clock(&mut self) -> Result<bool> {
        self.set_clock_to(Utc::now())
    }

    /// Set the sensor clock.
    ///
    /// * `time`: UTC time to set.
    pub fn set_clock_to(&mut self, time: DateTime<Utc>) -> Result<bool> {
        let command = format!("set clock {}", time.format(CLOCK_FORMAT));
        self.sercom.write_command(&command, Eol::CrLf)?;
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        Ok(response.contains("Ok"))
    }

    pub fn get_active_calfile_name(&mut self) -> Result<String> {
        self.get("get activecalfile")
    }

    pub fn get_serial_number(&mut self) -> Result<String> {
        let serial_number = self.get("get serialno")?;
        info!("connected to SNA{serial_number}");
        Ok(serial_number)
    }

    pub fn get_sensor_type(&mut self) -> Result<String> {
        self.get("get senstype")
    }

    pub fn get_sensor_version(&mut self) -> Result<String> {
        self.get("get sensvers")
    }

    pub fn get_firmware_version(&mut self) -> Result<String> {
        self.get("$Info FirmwareVersion")
    }

    /// True when external power is connected.
    pub fn external_power_status(&mut self) -> Result<bool> {
        let status = self.get("get --extpower")?;
        match status.trim() {
            "On" => Ok(true),
            "Off" => Ok(false),
            other => Err(MartechError::parse("external power", other)),
        }
    }

    /// Whole hours the lamp has been lit.
    pub fn get_lamp_usage(&mut self) -> Result<u64> {
        let seconds: f64 = self.get_number("get lamptime", "lamp time")?;
        Ok((seconds / 3600.0) as u64)
    }

    /// Run the built in self test and return its report.
    pub fn selftest(&mut self) -> Result<String> {
        info!("running SUNA self test");
        self.sercom.write_command("selftest", Eol::CrLf)?;
        self.sercom.pause(SELFTEST_WAIT);
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        Ok(response.replace('\r', ""))
    }

    /// Complete configuration listing.
    pub fn get_config(&mut self) -> Result<String> {
        self.sercom.write_command("get cfg", Eol::CrLf)?;
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        Ok(response.replace('\r', ""))
    }

    /// Cycle the wiper and wait for the sensor to come back.
    pub fn run_wiper(&mut self) -> Result<()> {
        info!("running the SUNA wiper");
        self.sercom.write_command("special swipewiper", Eol::CrLf)?;
        self.sercom.pause(WIPER_WAIT);
        Ok(())
    }

    /// Calibration files on the sensor.
    pub fn list_calfiles(&mut self) -> Result<Vec<SunaFile>> {
        self.list("List Cal", &[".CAL"])
    }

    /// Data files on the sensor.
    pub fn list_datafiles(&mut self) -> Result<Vec<SunaFile>> {
        self.list("List Data", &[".CSV", ".BIN"])
    }

    fn list(&mut self, command: &str, markers: &[&str]) -> Result<Vec<SunaFile>> {
        self.sercom.write_command(command, Eol::CrLf)?;
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        response
            .split('\n')
            .filter(|line| markers.iter().any(|m| line.contains(m)))
            .map(parse_file_line)
            .collect()
    }

    /// Sample for the given time, plus the wiper cycle, and return every
    /// frame. Numeric cells are parsed, the rest are kept as text.
    ///
    /// * `duration`: sampling time after the wiper has run.
    pub fn autosample(&mut self, duration: Duration) -> Result<Vec<Vec<FrameValue>>> {
        self.stop_sampling()?;
        self.start_sampling()?;
        self.sercom.pause(WIPER_WAIT + duration);
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        self.stop_sampling()?;
        Ok(response
            .split('\n')
            .filter(|line| line.contains(FRAME_MARKER))
            .map(|line| line.replace('\r', "").split(',').map(FrameValue::from).collect())
            .collect())
    }

    /// Reboot the firmware and drop the connection.
    pub fn reboot(mut self) -> Result<L> {
        self.sercom.write_command("Reboot", Eol::CrLf)?;
        Ok(self.sercom.close())
    }

    /// Leave the profiler passthrough.
    pub fn exit_passthru(&mut self) -> Result<bool> {
        self.sercom.exit_passthru()
    }
}

fn parse_file_line(line: &str) -> Result<SunaFile> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 4 {
        return Err(MartechError::parse("file listing", line));
    }
    Ok(SunaFile {
        name: fields[3].replace('\r', ""),
        date: fields[2].to_string(),
        size: fields[1]
            .trim()
            .parse()
            .map_err(|_| MartechError::parse("file size", fields[1]))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tests::MockLink;
    use chrono::TimeZone;
    use rstest::rstest;

    fn suna(link: MockLink) -> Suna<MockLink> {
        Suna::new(Sercom::new(link, "suna"))
    }

    #[test]
    fn test_stop_sampling() {
        let mut suna = suna(
            MockLink::new()
                .on("$$$$$", "SATSLF1234,2023135,12.1\r\n")
                .on("$$$$$", "SUNA> "),
        );
        assert!(suna.stop_sampling().unwrap());
        assert!(suna.sercom().link().written_text().starts_with("$$$$$\r\r\r"));
        assert!(!suna.sercom().link().written_text().contains('\n'));
    }

    #[test]
    fn test_disk_space() {
        let mut suna = suna(
            MockLink::new()
                .on("--diskfree", "get --diskfree\r\nOk 1500000000\r\nSUNA> ")
                .on("--disktotal", "get --disktotal\r\nOk 2000000000\r\nSUNA> "),
        );
        assert_eq!(suna.get_disk_free().unwrap(), 1500.0);
        assert_eq!(suna.get_disk_total().unwrap(), 2000.0);
    }

    #[test]
    fn test_get_without_ok_is_no_match() {
        let mut suna = suna(MockLink::new().on("get clock", "Error: unknown\r\n"));
        assert!(matches!(suna.get_clock(), Err(MartechError::NoMatch { .. })));
    }

    #[rstest]
    #[case("On", true)]
    #[case("Off", false)]
    fn test_external_power(#[case] status: &str, #[case] expected: bool) {
        let mut suna = suna(MockLink::new().on("--extpower", format!("Ok {status}\r\n")));
        assert_eq!(suna.external_power_status().unwrap(), expected);
    }

    #[test]
    fn test_lamp_usage_in_whole_hours() {
        let mut suna = suna(MockLink::new().on("lamptime", "Ok 7300.5\r\n"));
        assert_eq!(suna.get_lamp_usage().unwrap(), 2);
    }

    #[test]
    fn test_set_clock_format() {
        let mut suna = suna(MockLink::new().on("set clock", "Ok\r\n"));
        let time = Utc.with_ymd_and_hms(2023, 5, 17, 8, 30, 5).unwrap();
        assert!(suna.set_clock_to(time).unwrap());
        assert_eq!(suna.sercom().link().written_text(), "set clock 2023/05/17 08:30:05\r\n");
    }

    #[test]
    fn test_list_calfiles() {
        let listing = "List Cal\r\n\
            Files\t1024\t2022/11/14\tSNA1234A.CAL\r\n\
            Files\t2048\t2023/01/02\tSNA1234B.CAL\r\n\
            SUNA> ";
        let mut suna = suna(MockLink::new().on("List Cal", listing));
        let files = suna.list_calfiles().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(
            files[1],
            SunaFile {
                name: "SNA1234B.CAL".to_string(),
                date: "2023/01/02".to_string(),
                size: 2048
            }
        );
    }

    #[test]
    fn test_list_datafiles_keeps_csv_and_bin() {
        let listing = "Files\t10\t2023/05/01\tD2023121.CSV\r\n\
            Files\t20\t2023/05/01\tD2023121.BIN\r\n\
            Files\t30\t2023/05/01\tSYSLOG.LOG\r\n";
        let mut suna = suna(MockLink::new().on("List Data", listing));
        let names: Vec<String> = suna.list_datafiles().unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["D2023121.CSV", "D2023121.BIN"]);
    }

    #[test]
    fn test_autosample_parses_frames() {
        let link = MockLink::new()
            .on("$$$$$", "SUNA> ")
            .on("exit", "wiper\r\nSATSLF1234,2023135,12.5,NaNish\r\nSATSLF1234,2023135,12.6,x\r\n")
            .on("$$$$$", "SUNA> ");
        let mut suna = suna(link);
        let frames = suna.autosample(Duration::from_secs(5)).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][0], FrameValue::Text("SATSLF1234".to_string()));
        assert_eq!(frames[0][1], FrameValue::Number(2023135.0));
        assert_eq!(frames[1][2], FrameValue::Number(12.6));
        assert!(suna.sercom().link().pauses.contains(&Duration::from_secs(25)));
        assert_eq!(suna.sercom().link().unused_replies(), 0);
    }

    #[test]
    fn test_selftest_strips_carriage_returns() {
        let mut suna = suna(MockLink::new().on("selftest", "Lamp: Ok\r\nSpectrometer: Ok\r\n"));
        assert_eq!(suna.selftest().unwrap(), "Lamp: Ok\nSpectrometer: Ok\n");
        assert_eq!(suna.sercom().link().paused_for(), SELFTEST_WAIT + CHECK_INTERVAL);
    }

    #[test]
    #[cfg_attr(not(feature = "hardware_test"), ignore)]
    fn test_hardware_serial_number() {
        let port = std::env::var("MARTECH_TEST_PORT").expect("MARTECH_TEST_PORT not set");
        let mut suna = Suna::open(&SerialConfig::new(port, SUNA_BAUD_RATE)).unwrap();
        assert!(suna.stop_sampling().unwrap());
        assert!(!suna.get_serial_number().unwrap().is_empty());
    }
}
