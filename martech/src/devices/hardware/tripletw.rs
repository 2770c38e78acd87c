use crate::{
    devices::hardware::{
        eco::{Eco, EcoMenu, EcoModel},
        sercom::{Eol, Sercom, SerialConfig, SerialLink, CHECK_INTERVAL},
    },
    error::{MartechError, Result},
    utils::yaml,
};
use log::info;
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::{
    ffi::OsStr,
    ops::{Deref, DerefMut},
    time::Duration,
};

/// Dark counts and scale factor of one optical channel, as they appear on
/// the vendor calibration sheet.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ChannelCoefficients {
    /// `WL1`, `WL2` or `WL3`.
    pub channel: String,
    pub dark_counts: f64,
    pub scale_factor: f64,
}

/// Driver for the Sea-Bird ECO Triplet-w.
pub struct TripletW<L: SerialLink = Box<dyn SerialPort>>(Eco<L>);

impl TripletW {
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

impl<L: SerialLink> TripletW<L> {
    pub fn new(sercom: Sercom<L>) -> Self {
        Self(Eco::new(sercom, EcoModel::TripletW))
    }

    /// Hand the connection back, e.g. to leave a passthrough.
    pub fn into_sercom(self) -> Sercom<L> {
        self.0.into_sercom()
    }

    /// Cycle the wiper.
    pub fn wiper(&mut self) -> Result<bool> {
        self.0.move_wiper("$mvs")
    }

    /// Erase the internal memory. The sensor asks for the command to be
    /// retyped, and prints the menu once the erase is done.
    pub fn erase_memory(&mut self) -> Result<bool> {
        self.0.sercom_mut().write_command("$emc", Eol::CrLf)?;
        self.0.sercom_mut().pause(Duration::from_millis(100));
        let response = self.0.sercom_mut().read_response(CHECK_INTERVAL)?;
        if !response.contains("retype") {
            return Ok(false);
        }
        let sercom = self.0.sercom_mut();
        sercom.clear_buffers()?;
        sercom.write_command("$emc", Eol::CrLf)?;
        let response = sercom.read_until(b"Mem")?;
        let erased = response.contains("Ver");
        if erased {
            info!("Triplet-w memory erased");
        }
        Ok(erased)
    }

    /// Calibration coefficients of the three channels, from the menu.
    pub fn get_calibration_coefficients(&mut self) -> Result<Vec<ChannelCoefficients>> {
        calibration_coefficients(&self.0.menu()?)
    }
}

/// Read `M<n>d` and `M<n>s` for the three channels.
pub fn calibration_coefficients(menu: &EcoMenu) -> Result<Vec<ChannelCoefficients>> {
    (1..=3)
        .map(|n| {
            let dark = menu.field(&format!("M{n}d"))?;
            let scale = menu.field(&format!("M{n}s"))?;
            Ok(ChannelCoefficients {
                channel: format!("WL{n}"),
                dark_counts: dark.trim().parse().map_err(|_| MartechError::parse("dark counts", &dark))?,
                scale_factor: scale
                    .trim()
                    .parse()
                    .map_err(|_| MartechError::parse("scale factor", &scale))?,
            })
        })
        .collect()
}

impl<L: SerialLink> Deref for TripletW<L> {
    type Target = Eco<L>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<L: SerialLink> DerefMut for TripletW<L> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tests::MockLink;

    const MENU: &str = "Ser FLBBCD-5678\r\nVer Triplet5.20\r\nM1d 50\r\nM1s 1.210e-02\r\nM2d 48\r\nM2s 3.300e-06\r\n\
        M3d 45\r\nM3s 2.050e-02\r\nDat 05/17/23\r\nClk 08:30:05\r\nMem 3200\r\n";

    fn triplet(link: MockLink) -> TripletW<MockLink> {
        TripletW::new(Sercom::new(link, "triplet"))
    }

    #[test]
    fn test_calibration_coefficients() {
        let mut triplet = triplet(MockLink::new().on("$mnu", MENU));
        let coefficients = triplet.get_calibration_coefficients().unwrap();
        assert_eq!(coefficients.len(), 3);
        assert_eq!(
            coefficients[1],
            ChannelCoefficients {
                channel: "WL2".to_string(),
                dark_counts: 48.0,
                scale_factor: 3.3e-6
            }
        );
    }

    #[test]
    fn test_erase_memory_retypes() {
        let link = MockLink::new()
            .on("$emc", "Are you sure? retype $emc\r\n")
            .on("$emc", "Ver Triplet5.20\r\nMem 0\r\n");
        let mut triplet = triplet(link);
        assert!(triplet.erase_memory().unwrap());
        assert_eq!(triplet.sercom().link().written_text(), "$emc\r\n$emc\r\n");
    }

    #[test]
    fn test_erase_memory_without_prompt() {
        let mut triplet = triplet(MockLink::new().on("$emc", "?\r\n"));
        assert!(!triplet.erase_memory().unwrap());
    }

    #[test]
    fn test_wiper_and_stop_use_triplet_commands() {
        let link = MockLink::new()
            .on("!!!!", "Ver Triplet5.20\r\nMem 3200\r\n")
            .on("$mvs", "mvs\r\n");
        let mut triplet = triplet(link);
        assert!(triplet.stop_sampling().unwrap());
        assert!(triplet.wiper().unwrap());
        assert_eq!(triplet.sercom().link().written_text(), "!!!!$mvs\r");
    }
}
