use crate::{
    devices::hardware::sercom::{Eol, Sercom, SerialConfig, SerialLink, CHECK_INTERVAL},
    error::Result,
    utils::yaml,
};
use log::warn;
use serialport::SerialPort;
use std::ffi::OsStr;
use uuid::Uuid;

/// Factory line speed of the optode.
pub const OPTODE_BAUD_RATE: u32 = 115200;

const STOP_ATTEMPTS: u32 = 10;

/// Command prompt shown once the optode has stopped.
const PROMPT: &str = "#";

/// Driver for the Aanderaa 4831 oxygen optode.
pub struct Optode4831<L: SerialLink = Box<dyn SerialPort>> {
    uuid: Uuid,
    sercom: Sercom<L>,
}

impl Optode4831 {
    /// Open the optode on its own port.
    ///
    /// * `config`: serial settings, normally at [`OPTODE_BAUD_RATE`].
    pub fn open(config: &SerialConfig) -> Result<Self> {
        Ok(Self::new(Sercom::open(config)?))
    }

    /// Open the optode from a serial config file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        let config: SerialConfig = yaml::from_yaml_file(filepath)?;
        Self::open(&config)
    }
}

impl<L: SerialLink> Optode4831<L> {
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

    /// Send `STOP` until the `#` prompt appears. False if it never does.
    pub fn stop_sampling(&mut self) -> Result<bool> {
        for _ in 0..STOP_ATTEMPTS {
            self.sercom.write_command("STOP", Eol::CrLf)?;
            self.sercom.write_command("", Eol::CrLf)?;
            self.sercom.write_command("", Eol::CrLf)?;
            let response = self.sercom.read_response(CHECK_INTERVAL)?;
            if response.contains(PROMPT) {
                self.sercom.write_command("", Eol::CrLf)?;
                self.sercom.write_command("", Eol::CrLf)?;
                self.sercom.clear_buffers()?;
                return Ok(true);
            }
        }
        warn!("optode did not stop after {STOP_ATTEMPTS} attempts");
        Ok(false)
    }

    /// Every user setting (`GET ALL`).
    pub fn get_settings(&mut self) -> Result<String> {
        self.sercom.write_command("", Eol::CrLf)?;
        self.sercom.clear_buffers()?;
        self.sercom.write_command("GET ALL", Eol::CrLf)?;
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

    fn optode(link: MockLink) -> Optode4831<MockLink> {
        Optode4831::new(Sercom::new(link, "optode"))
    }

    #[test]
    fn test_stop_sampling() {
        let mut optode = optode(
            MockLink::new()
                .on("STOP", "MEASUREMENT\t4831\t512\t301.2\r\n")
                .on("STOP", "#\r\n"),
        );
        assert!(optode.stop_sampling().unwrap());
        assert_eq!(optode.sercom().link().written_text().matches("STOP").count(), 2);
    }

    #[test]
    fn test_stop_sampling_gives_up() {
        let mut optode = optode(MockLink::new());
        assert!(!optode.stop_sampling().unwrap());
    }

    #[test]
    fn test_get_settings_discards_stale_input() {
        let link = MockLink::new()
            .with_input("stale sample\r\n")
            .on("GET ALL", "Product Name\t4831\tOptode\r\n#");
        let mut optode = optode(link);
        let settings = optode.get_settings().unwrap();
        assert_eq!(settings, "Product Name\t4831\tOptode\r\n#");
    }
}
