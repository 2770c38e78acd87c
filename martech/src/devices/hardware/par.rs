use crate::{
    devices::hardware::{
        eco::{Eco, EcoModel},
        sercom::{last_capture, Eol, Sercom, SerialConfig, SerialLink},
    },
    error::Result,
    utils::yaml,
};
use log::{info, warn};
use serialport::SerialPort;
use std::{
    ffi::OsStr,
    ops::{Deref, DerefMut},
};

/// Driver for the Sea-Bird ECO PAR. Everything shared with the rest of the
/// ECO family is reached through [`Eco`].
pub struct Par<L: SerialLink = Box<dyn SerialPort>>(Eco<L>);

impl Par {
    /// Open the sensor on its own port.
    ///
    /// * `config`: serial settings, normally at [`super::eco::ECO_BAUD_RATE`].
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

impl<L: SerialLink> Par<L> {
    pub fn new(sercom: Sercom<L>) -> Self {
        Self(Eco::new(sercom, EcoModel::Par))
    }

    /// Hand the connection back, e.g. to leave a passthrough.
    pub fn into_sercom(self) -> Sercom<L> {
        self.0.into_sercom()
    }

    pub fn open_wiper(&mut self) -> Result<bool> {
        self.0.move_wiper("$mvs 1")
    }

    pub fn close_wiper(&mut self) -> Result<bool> {
        self.0.move_wiper("$mvs 0")
    }

    /// Erase the internal memory. True when the menu then reports `Mem 0`.
    pub fn erase_memory(&mut self) -> Result<bool> {
        self.0.sercom_mut().write_command("$emc", Eol::CrLf)?;
        let response = self.0.read_until_memory_line()?;
        let memory = last_capture(r"Mem (.*?)\r", &response, "$emc")?;
        if memory.trim() == "0" {
            info!("PAR memory erased");
            Ok(true)
        } else {
            warn!("PAR memory still reports {memory}");
            Ok(false)
        }
    }
}

impl<L: SerialLink> Deref for Par<L> {
    type Target = Eco<L>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<L: SerialLink> DerefMut for Par<L> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        devices::hardware::eco::{tests::PAR_MENU, ECO_BAUD_RATE},
        utils::tests::MockLink,
    };
    use rstest::rstest;

    fn par(link: MockLink) -> Par<MockLink> {
        Par::new(Sercom::new(link, "par"))
    }

    #[rstest]
    #[case(true, "$mvs 1\r")]
    #[case(false, "$mvs 0\r")]
    fn test_wiper(#[case] open: bool, #[case] written: &str) {
        let mut par = par(MockLink::new().on("$mvs", "mvs ok\r\n"));
        let moved = if open { par.open_wiper() } else { par.close_wiper() };
        assert!(moved.unwrap());
        assert_eq!(par.sercom().link().written_text(), written);
    }

    #[test]
    fn test_wiper_without_echo() {
        let mut par = par(MockLink::new());
        assert!(!par.open_wiper().unwrap());
    }

    #[rstest]
    #[case("Erasing...\r\nMem 0\r\n", true)]
    #[case("Mem 12\r\n", false)]
    fn test_erase_memory(#[case] reply: &str, #[case] expected: bool) {
        let mut par = par(MockLink::new().on("$emc", reply));
        assert_eq!(par.erase_memory().unwrap(), expected);
    }

    #[test]
    fn test_menu_through_family_driver() {
        let mut par = par(MockLink::new().on("$mnu", PAR_MENU));
        assert_eq!(par.get_serial_number().unwrap(), "PARS-1234");
        assert_eq!(par.model(), EcoModel::Par);
    }

    #[test]
    #[cfg_attr(not(feature = "hardware_test"), ignore)]
    fn test_hardware_firmware_version() {
        let port = std::env::var("MARTECH_TEST_PORT").expect("MARTECH_TEST_PORT not set");
        let mut par = Par::open(&SerialConfig::new(port, ECO_BAUD_RATE)).unwrap();
        assert!(par.stop_sampling().unwrap());
        assert!(par.get_firmware_version().unwrap().starts_with("Par"));
    }
}
