use crate::{
    devices::hardware::sercom::{Eol, Sercom, SerialConfig, SerialLink, CHECK_INTERVAL},
    error::Result,
    utils::yaml,
};
use serialport::SerialPort;
use std::{ffi::OsStr, time::Duration};
use uuid::Uuid;

/// Factory line speed of the CTD.
pub const SBE49_BAUD_RATE: u32 = 115200;

/// Command prompt shown once the CTD has stopped.
const PROMPT: &str = "S>";

/// Driver for the Sea-Bird SBE 49 FastCAT CTD.
pub struct Sbe49<L: SerialLink = Box<dyn SerialPort>> {
    uuid: Uuid,
    sercom: Sercom<L>,
}

impl Sbe49 {
    /// Open the CTD on its own port.
    ///
    /// * `config`: serial settings, normally at [`SBE49_BAUD_RATE`].
    pub fn open(config: &SerialConfig) -> Result<Self> {
        Ok(Self::new(Sercom::open(config)?))
    }

    /// Open the CTD from a serial config file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        let config: SerialConfig = yaml::from_yaml_file(filepath)?;
        Self::open(&config)
    }
}

impl<L: SerialLink> Sbe49<L> {
    /// Drive the CTD over an existing connection, e.g. a profiler passthrough.
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

    /// Hand the connection back.
    pub fn into_sercom(self) -> Sercom<L> {
        self.sercom
    }

    /// Stop sampling and wait for the command prompt. True once `S>` shows.
    pub fn stop_sampling(&mut self) -> Result<bool> {
        self.sercom.write_command("STOP", Eol::CrLf)?;
        for _ in 0..3 {
            self.sercom.write_command("", Eol::CrLf)?;
        }
        self.sercom.pause(Duration::from_secs(1));
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        self.sercom.clear_buffers()?;
        Ok(response.contains(PROMPT))
    }

    /// Status report (`DS`).
    pub fn get_status(&mut self) -> Result<String> {
        self.sercom.write_command("DS", Eol::CrLf)?;
        self.sercom.read_response(CHECK_INTERVAL)
    }

    /// Calibration coefficients (`DCAL`).
    pub fn get_calibration_coeffs(&mut self) -> Result<String> {
        self.sercom.write_command("DCAL", Eol::CrLf)?;
        self.sercom.read_response(CHECK_INTERVAL)
    }

    /// Leave the profiler passthrough.
    pub fn exit_passthru(&mut self) -> Result<bool> {
        self.sercom.exit_passthru()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tests::MockLink;

    fn ctd(link: MockLink) -> Sbe49<MockLink> {
        Sbe49::new(Sercom::new(link, "sbe49"))
    }

    #[test]
    fn test_stop_sampling_sees_prompt() {
        let mut ctd = ctd(MockLink::new().on("STOP", "\r\nS>\r\nS>"));
        assert!(ctd.stop_sampling().unwrap());
        let written = ctd.sercom().link().written_text();
        assert_eq!(written, "STOP\r\n\r\n\r\n\r\n");
        assert!(ctd.sercom().link().pauses.contains(&Duration::from_secs(1)));
    }

    #[test]
    fn test_stop_sampling_without_prompt() {
        let mut ctd = ctd(MockLink::new().on("STOP", "23.4512, 4.0012, 10.1"));
        assert!(!ctd.stop_sampling().unwrap());
    }

    #[test]
    fn test_get_status() {
        let status = "SBE 49 FastCAT V 1.3  SERIAL NO. 0409\r\nnumber of scans to average = 1\r\nS>";
        let mut ctd = ctd(MockLink::new().on("DS", status));
        assert_eq!(ctd.get_status().unwrap(), status);
    }

    #[test]
    fn test_get_calibration_coeffs() {
        let mut ctd = ctd(MockLink::new().on("DCAL", "temperature:  14-nov-22\r\n"));
        assert!(ctd.get_calibration_coeffs().unwrap().starts_with("temperature"));
        assert_eq!(ctd.sercom().link().written_text(), "DCAL\r\n");
    }

    #[test]
    #[cfg_attr(not(feature = "hardware_test"), ignore)]
    fn test_hardware_stop_sampling() {
        let port = std::env::var("MARTECH_TEST_PORT").expect("MARTECH_TEST_PORT not set");
        let mut ctd = Sbe49::open(&SerialConfig::new(port, SBE49_BAUD_RATE)).unwrap();
        assert!(ctd.stop_sampling().unwrap());
    }
}
