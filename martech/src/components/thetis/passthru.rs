use crate::{
    devices::hardware::{
        ocr::Ocr,
        optode4831::Optode4831,
        sbe49::Sbe49,
        sercom::SerialLink,
        suna::Suna,
        thetis::{PowerState, Thetis, ThetisConfig},
        tripletw::{calibration_coefficients, TripletW},
    },
    error::{MartechError, Result},
    utils::yaml,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use serialport::SerialPort;
use std::{ffi::OsStr, fmt, path::PathBuf, time::Duration};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

/// Instruments wired to the profiler controller, by passthrough port.
#[derive(
    EnumString, IntoStaticStr, Display, EnumIter, Deserialize, Serialize, Copy, Clone, Debug, PartialEq, Eq,
)]
#[strum(ascii_case_insensitive)]
pub enum Instrument {
    Velpt,
    Optode,
    Acs,
    Battery,
    Ctd,
    Ocr,
    Winch,
    Suna,
    Triplet,
}

impl Instrument {
    /// Controller port the instrument is wired to.
    pub fn port(&self) -> u8 {
        match self {
            Instrument::Velpt => 1,
            Instrument::Optode => 2,
            Instrument::Acs => 3,
            Instrument::Battery => 4,
            Instrument::Ctd => 5,
            Instrument::Ocr => 6,
            Instrument::Winch => 7,
            Instrument::Suna => 8,
            Instrument::Triplet => 9,
        }
    }

    /// True when a sensor driver exists for the instrument.
    pub fn has_driver(&self) -> bool {
        match self {
            Instrument::Ctd | Instrument::Optode | Instrument::Ocr | Instrument::Suna | Instrument::Triplet => true,
            Instrument::Velpt | Instrument::Acs | Instrument::Battery | Instrument::Winch => false,
        }
    }
}

fn no_driver(instrument: Instrument) -> MartechError {
    MartechError::InvalidArgument(format!(
        "no driver for the {instrument} on port {}",
        instrument.port()
    ))
}

/// Labelled replies read from an instrument.
type Entries = Vec<(&'static str, String)>;

/// What one passthrough session read from an instrument.
#[derive(Clone, Debug, PartialEq)]
pub struct InstrumentReport {
    pub instrument: Instrument,
    /// The instrument reached its command prompt.
    pub stopped: bool,
    /// Labelled replies, in the order they were read.
    pub entries: Vec<(&'static str, String)>,
    /// The controller confirmed the end of the passthrough.
    pub released: bool,
}

impl fmt::Display for InstrumentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} on port {}", self.instrument, self.instrument.port())?;
        for (label, text) in &self.entries {
            writeln!(f, "--- {label} ---")?;
            writeln!(f, "{}", text.trim_end())?;
        }
        Ok(())
    }
}

/// Open a passthrough to one instrument, stop it sampling, read its
/// identity and settings and leave the passthrough again. The profiler is
/// always handed back, and the passthrough is left even when reading the
/// instrument fails.
///
/// * `thetis`: profiler the instrument hangs off.
/// * `instrument`: instrument to query.
pub fn query_instrument<L: SerialLink>(
    mut thetis: Thetis<L>,
    instrument: Instrument,
) -> (Thetis<L>, Result<InstrumentReport>) {
    if !instrument.has_driver() {
        return (thetis, Err(no_driver(instrument)));
    }
    if let Err(e) = thetis.enter_passthru(instrument.port()) {
        return (thetis, Err(e));
    }
    let (sercom, config) = thetis.into_parts();

    let (sercom, queried, released) = match instrument {
        Instrument::Ctd => {
            let mut ctd = Sbe49::new(sercom);
            let queried = read_ctd(&mut ctd);
            let released = ctd.exit_passthru();
            (ctd.into_sercom(), queried, released)
        }
        Instrument::Optode => {
            let mut optode = Optode4831::new(sercom);
            let queried = read_optode(&mut optode);
            let released = optode.exit_passthru();
            (optode.into_sercom(), queried, released)
        }
        Instrument::Ocr => {
            let mut ocr = Ocr::new(sercom);
            let queried = ocr.stop_sampling().map(|stopped| (stopped, Entries::new()));
            let released = ocr.exit_passthru();
            (ocr.into_sercom(), queried, released)
        }
        Instrument::Suna => {
            let mut suna = Suna::new(sercom);
            let queried = read_suna(&mut suna);
            let released = suna.exit_passthru();
            (suna.into_sercom(), queried, released)
        }
        Instrument::Triplet => {
            let mut triplet = TripletW::new(sercom);
            let queried = read_triplet(&mut triplet);
            let released = triplet.exit_passthru();
            (triplet.into_sercom(), queried, released)
        }
        Instrument::Velpt | Instrument::Acs | Instrument::Battery | Instrument::Winch => {
            let mut sercom = sercom;
            let released = sercom.exit_passthru();
            (sercom, Err(no_driver(instrument)), released)
        }
    };
    let thetis = Thetis::with_sercom(sercom, config);

    let report = match (queried, released) {
        (Ok((stopped, entries)), Ok(released)) => {
            if !stopped {
                warn!("{instrument} did not reach its prompt");
            }
            if !released {
                warn!("controller did not confirm the end of the {instrument} passthrough");
            }
            Ok(InstrumentReport {
                instrument,
                stopped,
                entries,
                released,
            })
        }
        (Ok(_), Err(e)) => Err(e),
        (Err(e), released) => {
            warn!("reading the {instrument} failed: {e}");
            if !matches!(released, Ok(true)) {
                warn!("controller did not confirm the end of the {instrument} passthrough");
            }
            Err(e)
        }
    };
    (thetis, report)
}

fn read_ctd<L: SerialLink>(ctd: &mut Sbe49<L>) -> Result<(bool, Entries)> {
    let stopped = ctd.stop_sampling()?;
    let entries = vec![
        ("Status", ctd.get_status()?),
        ("Calibration", ctd.get_calibration_coeffs()?),
    ];
    Ok((stopped, entries))
}

fn read_optode<L: SerialLink>(optode: &mut Optode4831<L>) -> Result<(bool, Entries)> {
    let stopped = optode.stop_sampling()?;
    Ok((stopped, vec![("Settings", optode.get_settings()?)]))
}

fn read_suna<L: SerialLink>(suna: &mut Suna<L>) -> Result<(bool, Entries)> {
    let stopped = suna.stop_sampling()?;
    let entries = vec![
        ("Serial Number", suna.get_serial_number()?),
        ("Firmware", suna.get_firmware_version()?),
        ("Configuration", suna.get_config()?),
    ];
    Ok((stopped, entries))
}

fn read_triplet<L: SerialLink>(triplet: &mut TripletW<L>) -> Result<(bool, Entries)> {
    let stopped = triplet.stop_sampling()?;
    let menu = triplet.menu()?;
    let coefficients = calibration_coefficients(&menu)?
        .iter()
        .map(|c| format!("{} dark {} scale {:e}", c.channel, c.dark_counts, c.scale_factor))
        .collect::<Vec<_>>()
        .join("\n");
    let entries = vec![("Menu", menu.text().to_string()), ("Calibration", coefficients)];
    Ok((stopped, entries))
}

fn default_warmup() -> Duration {
    Duration::from_secs(5)
}

#[serde_as]
#[derive(Deserialize, Serialize, Clone, PartialEq, Debug)]
pub struct PassthruConfig {
    /// Config of the profiler the instruments hang off.
    pub thetis_config_file: PathBuf,
    /// Instruments to query, in order.
    pub instruments: Vec<Instrument>,
    /// Time the instruments get to boot once powered.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_warmup")]
    pub warmup: Duration,
}

impl PassthruConfig {
    pub fn new<P: Into<PathBuf>>(thetis_config_file: P) -> Self {
        Self {
            thetis_config_file: thetis_config_file.into(),
            instruments: Vec::new(),
            warmup: default_warmup(),
        }
    }

    /// Query an instrument during the session.
    pub fn add_instrument(mut self, instrument: Instrument) -> Self {
        self.instruments.push(instrument);
        self
    }

    /// Create a `PassthruConfig` by reading data from a file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        yaml::from_yaml_file(filepath)
    }
}

/// A profiler and the instruments to reach through it.
pub struct PassthruSession<L: SerialLink = Box<dyn SerialPort>> {
    uuid: Uuid,
    thetis: Thetis<L>,
    config: PassthruConfig,
}

impl PassthruSession {
    pub fn new(config: PassthruConfig) -> Result<Self> {
        let thetis = Thetis::open(ThetisConfig::from_file(&config.thetis_config_file)?)?;
        Ok(Self::with_thetis(thetis, config))
    }

    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        Self::new(PassthruConfig::from_file(filepath)?)
    }
}

impl<L: SerialLink> PassthruSession<L> {
    pub fn with_thetis(thetis: Thetis<L>, config: PassthruConfig) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            thetis,
            config,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

/// Unit struct that runs a [`PassthruSession`].
pub struct PassthruController;

impl PassthruController {
    /// Power the sensors with the pump off, query every configured
    /// instrument and power the sensors down again. The sensors are powered
    /// down even when a query fails, and the session ends at the first
    /// failure. The profiler is returned with the reports.
    ///
    /// * `session`: consumed, the profiler comes back in the result.
    pub fn run<L: SerialLink>(session: PassthruSession<L>) -> Result<(Thetis<L>, Vec<InstrumentReport>)> {
        let PassthruSession { uuid, thetis, config } = session;
        info!("passthru session {uuid} for {} instruments", config.instruments.len());
        let (mut thetis, reports) = Self::query_all(thetis, &config);

        match (reports, thetis.power_sensors(PowerState::Off)) {
            (Ok(reports), Ok(_)) => Ok((thetis, reports)),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), off) => {
                if let Err(off_error) = off {
                    warn!("unable to power the sensors off: {off_error}");
                }
                Err(e)
            }
        }
    }

    fn query_all<L: SerialLink>(
        mut thetis: Thetis<L>,
        config: &PassthruConfig,
    ) -> (Thetis<L>, Result<Vec<InstrumentReport>>) {
        let powered = thetis
            .power_sensors(PowerState::On)
            .and_then(|_| thetis.power_pump(PowerState::Off));
        if let Err(e) = powered {
            return (thetis, Err(e));
        }
        thetis.sercom_mut().pause(config.warmup);

        let mut reports = Vec::new();
        for instrument in &config.instruments {
            let (returned, report) = query_instrument(thetis, *instrument);
            thetis = returned;
            match report {
                Ok(report) => reports.push(report),
                Err(e) => return (thetis, Err(e)),
            }
        }
        (thetis, Ok(reports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use crate::{
        devices::hardware::sercom::Sercom,
        messages::thetis::sentence::{Command, Listener},
        utils::tests::{mock_thetis, MockLink, SharedLink},
    };
    use rstest::rstest;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    const EXIT: &str = "$PWETA,PC,,,,PWETQ*00\r\n";

    #[test]
    fn test_ports_are_distinct() {
        let mut ports: Vec<u8> = Instrument::iter().map(|i| i.port()).collect();
        ports.dedup();
        assert_eq!(ports, (1..=9).collect::<Vec<u8>>());
    }

    #[rstest]
    #[case("ctd", Instrument::Ctd)]
    #[case("SUNA", Instrument::Suna)]
    #[case("Triplet", Instrument::Triplet)]
    fn test_instrument_from_str(#[case] name: &str, #[case] expected: Instrument) {
        assert_eq!(Instrument::from_str(name).unwrap(), expected);
    }

    #[test]
    fn test_query_without_driver_is_refused() {
        let (thetis, report) = query_instrument(mock_thetis(MockLink::new()), Instrument::Acs);
        assert!(matches!(report, Err(MartechError::InvalidArgument(_))));
        assert!(thetis.sercom().link().written.is_empty());
    }

    #[test]
    fn test_query_ctd() {
        let link = MockLink::new()
            .on("PAS,1,5", "\r\n")
            .on("STOP", "S>\r\n")
            .on("DS", "SBE 49 FastCAT V 1.3  SERIAL NO. 0409\r\nS>")
            .on("DCAL", "temperature:  14-nov-22\r\nS>")
            .on("$PWETQ", EXIT);
        let (thetis, report) = query_instrument(mock_thetis(link), Instrument::Ctd);
        let report = report.unwrap();
        assert!(report.stopped);
        assert!(report.released);
        assert_eq!(report.entries[0].0, "Status");
        assert!(report.entries[1].1.starts_with("temperature"));
        assert!(report.to_string().starts_with("Ctd on port 5\n--- Status ---\n"));
        assert_eq!(thetis.sercom().link().unused_replies(), 0);
    }

    #[test]
    fn test_query_triplet_reads_coefficients() {
        let menu = "Ser FLBBCD-5678\r\nVer Triplet5.20\r\nM1d 50\r\nM1s 1.210e-02\r\nM2d 48\r\nM2s 3.300e-06\r\n\
            M3d 45\r\nM3s 2.050e-02\r\nMem 3200\r\n";
        let link = MockLink::new()
            .on("PAS,1,9", "\r\n")
            .on("!!!!", menu)
            .on("$mnu", menu)
            .on("$PWETQ", EXIT);
        let (_, report) = query_instrument(mock_thetis(link), Instrument::Triplet);
        let report = report.unwrap();
        assert!(report.stopped);
        assert!(report.entries[1].1.starts_with("WL1 dark 50 scale 1.21e-2"));
    }

    #[test]
    fn test_session_powers_sensors_around_queries() {
        let link = MockLink::new()
            .on("CTDP", "CTD ON\r\n")
            .on("INSP", "INST ON\r\n")
            .on("PMP", "PMP OFF\r\n")
            .on("PAS,1,6", "\r\n")
            .on("etx", "\r\n$")
            .on("$PWETQ", EXIT)
            .on("CTDP", "CTD OFF\r\n")
            .on("INSP", "INST OFF\r\n");
        let session = PassthruSession::with_thetis(
            mock_thetis(link),
            PassthruConfig::new("thetis.yaml").add_instrument(Instrument::Ocr),
        );
        let (thetis, reports) = PassthruController::run(session).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].stopped);
        assert!(reports[0].entries.is_empty());
        let link = thetis.sercom().link();
        assert_eq!(link.unused_replies(), 0);
        assert!(link.pauses.contains(&Duration::from_secs(5)));
        assert!(link.written_text().contains("$PWETC,PC,,,,PAS,1,6*"));
    }

    #[test]
    fn test_failed_query_still_leaves_passthru() {
        let menu = "Ser FLBBCD-5678\r\nVer Triplet5.20\r\nMem 3200\r\n";
        let link = MockLink::new()
            .on("PAS,1,9", "\r\n")
            .on("!!!!", menu)
            .on("$mnu", menu)
            .on("$PWETQ", EXIT);
        let (thetis, report) = query_instrument(mock_thetis(link), Instrument::Triplet);
        assert!(matches!(report, Err(MartechError::NoMatch { .. })));
        let link = thetis.sercom().link();
        assert_eq!(link.unused_replies(), 0);
        assert!(link.written_text().ends_with("$PWETQ"));
    }

    #[test]
    fn test_session_powers_down_after_failed_query() {
        let menu = "Ser FLBBCD-5678\r\nVer Triplet5.20\r\nMem 3200\r\n";
        let link = SharedLink::new(
            MockLink::new()
                .on("CTDP", "CTD ON\r\n")
                .on("INSP", "INST ON\r\n")
                .on("PMP", "PMP OFF\r\n")
                .on("PAS,1,9", "\r\n")
                .on("!!!!", menu)
                .on("$mnu", menu)
                .on("$PWETQ", EXIT)
                .on("CTDP", "CTD OFF\r\n")
                .on("INSP", "INST OFF\r\n"),
        );
        let thetis = Thetis::with_sercom(Sercom::new(link.clone(), "mock"), ThetisConfig::new("mock"));
        let config = PassthruConfig::new("thetis.yaml")
            .add_instrument(Instrument::Triplet)
            .add_instrument(Instrument::Ctd);

        assert!(PassthruController::run(PassthruSession::with_thetis(thetis, config)).is_err());
        let link = link.link();
        assert_eq!(link.unused_replies(), 0);
        let written = link.written_text();
        assert!(written.contains("$PWETQ"));
        assert!(!written.contains("PAS,1,5"), "session should end at the first failure");
        let insp_off = Command::new(Listener::PC, "INSP").arg(0).encode();
        assert!(written.contains(&insp_off));
    }

    #[test]
    #[serial]
    fn test_read_write_passthru_config_file() {
        let write_config = PassthruConfig::new("config/devices/thetis.yaml")
            .add_instrument(Instrument::Ctd)
            .add_instrument(Instrument::Suna);
        let path = format!("{}/config/components/passthru.yaml", env!("CARGO_MANIFEST_DIR"));
        yaml::to_yaml_file(&write_config, &path).unwrap();
        let read_config = PassthruConfig::from_file(&path).unwrap();
        assert_eq!(write_config, read_config, "Failed to be created equally");
    }
}
