use crate::{
    devices::hardware::sercom::{Eol, Sercom, SerialConfig, SerialLink, CHECK_INTERVAL},
    error::Result,
    utils::yaml,
};
use log::warn;
use serialport::SerialPort;
use std::ffi::OsStr;
use uuid::Uuid;

/// Factory line speed of the radiometer.
pub const OCR_BAUD_RATE: u32 = 57600;

/// Attempts at breaking into the command prompt.
const STOP_ATTEMPTS: u32 = 10;

/// Command prompt shown once the radiometer has stopped.
const PROMPT: &str = "$";

/// Driver for the Satlantic OCR-507 radiometer.
pub struct Ocr<L: SerialLink = Box<dyn SerialPort>> {
    uuid: Uuid,
    sercom: Sercom<L>,
}

impl Ocr {
    /// Open the radiometer on its own port.
    ///
    /// * `config`: serial settings, normally at [`OCR_BAUD_RATE`].
    pub fn open(config: &SerialConfig) -> Result<Self> {
        Ok(Self::new(Sercom::open(config)?))
    }

    /// Open the radiometer from a serial config file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        let config: SerialConfig = yaml::from_yaml_file(filepath)?;
        Self::open(&config)
    }
}

impl<L: SerialLink> Ocr<L> {
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

    /// Send `etx` until the prompt appears. False if it never does.
    pub fn stop_sampling(&mut self) -> Result<bool> {
        for _ in 0..STOP_ATTEMPTS {
            self.sercom.write_command("etx", Eol::CrLf)?;
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
        warn!("OCR did not stop after {STOP_ATTEMPTS} attempts");
        Ok(false)
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

    #[test]
    fn test_stop_sampling_retries_until_prompt() {
        let link = MockLink::new()
            .on("etx", "SATDI74321,1.23,4.56\r\n")
            .on("etx", "Command Console\r\n$ ");
        let mut ocr = Ocr::new(Sercom::new(link, "ocr"));
        assert!(ocr.stop_sampling().unwrap());
        assert_eq!(ocr.sercom().link().written_text().matches("etx").count(), 2);
        assert!(ocr.sercom().link().written_text().ends_with("\r\n\r\n\r\n\r\n"));
    }

    #[test]
    fn test_stop_sampling_gives_up() {
        let mut ocr = Ocr::new(Sercom::new(MockLink::new(), "ocr"));
        assert!(!ocr.stop_sampling().unwrap());
        let attempts = ocr.sercom().link().written_text().matches("etx").count();
        assert_eq!(attempts, STOP_ATTEMPTS as usize);
    }
}
