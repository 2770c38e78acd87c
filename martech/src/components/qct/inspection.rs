use crate::{
    components::qct::{
        conformance::QctFlag,
        log::QctLog,
        operator::{is_yes, Operator},
    },
    devices::hardware::{
        sercom::SerialLink,
        thetis::{PowerState, SurfaceState, Thetis, ThetisConfig},
    },
    error::Result,
    messages::thetis::sentence::Listener,
    utils::yaml,
};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use serialport::SerialPort;
use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use uuid::Uuid;

/// Form number prefix of the inspection QCT.
pub const DOCUMENT_PREFIX: &str = "3310-00200";

/// Serial numbers recorded for every profiler, in the order they are asked.
pub const SERIAL_NUMBER_PROMPTS: [&str; 17] = [
    "SBE 49 SN (49-XXX)",
    "Nortek AQD SN",
    "Nortek AQS SN",
    "Optode 4831 SN",
    "OCR-507 SN",
    "ECO Triplet-w SN",
    "SUNAv2 SN",
    "ACS SN",
    "ECO PAR SN",
    "ATM-914 Case SN",
    "ATM-914 Transducer SN",
    "Winch SN",
    "iBCN head SN",
    "iBCN body SN",
    "Flasher SN",
    "PBA #1 SN",
    "PBA #2 SN",
];

/// Physical inspection questions and what a yes records.
const INSPECTION_QUESTIONS: [(&str, &str); 3] = [
    (
        "Are sensor components present and in reasonable condition?",
        "Sensor components look okay.",
    ),
    (
        "Are sensor cables present and connected appropriately?",
        "Sensor cables look okay.",
    ),
    (
        "Are hardware components present and in reasonable condition?",
        "Hardware components look okay.",
    ),
];

/// Observations made once the sensors have been cycled.
const OBSERVATIONS: [(&str, &str); 4] = [
    ("Did the PAR wiper open and close?", "PAR wiper cycled."),
    ("Did the SUNA wiper cycle?", "SUNA wiper cycled."),
    ("Did the Triplet wiper cycle?", "Triplet wiper cycled."),
    ("Did the bioshutter open and close?", "Bioshutter cycled."),
];

/// Full form number from the sequential part typed by the operator.
pub fn document_number(sequence: &str) -> String {
    format!("{DOCUMENT_PREFIX}-{:0>5}", sequence.trim())
}

#[serde_as]
#[derive(Deserialize, Serialize, Clone, PartialEq, Debug)]
pub struct InspectionConfig {
    /// Config of the profiler under test.
    pub thetis_config_file: PathBuf,
    /// Where the QCT log is written.
    pub output_directory: PathBuf,
    /// Controller directory the test data is logged into.
    pub test_directory: String,
    /// Time the sensors run before the pump is switched off.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub pump_run: Duration,
    /// Time the sensors sample once the pump is off.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub sample_time: Duration,
}

impl InspectionConfig {
    /// Default timings.
    ///
    /// * `thetis_config_file`: profiler config.
    /// * `output_directory`: where the QCT log is written.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(thetis_config_file: P, output_directory: Q) -> Self {
        Self {
            thetis_config_file: thetis_config_file.into(),
            output_directory: output_directory.into(),
            test_directory: "qct".to_string(),
            pump_run: Duration::from_secs(10),
            sample_time: Duration::from_secs(30),
        }
    }

    /// Create an `InspectionConfig` by reading data from a file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        yaml::from_yaml_file(filepath)
    }
}

/// Result of an inspection.
#[derive(Clone, Debug, PartialEq)]
pub struct InspectionReport {
    pub log: PathBuf,
    pub flag: QctFlag,
}

/// Inspection QCT of a profiler: paperwork, serial numbers and a powered
/// check of the sensors, pump, surface switch and winch.
pub struct Inspection<L: SerialLink = Box<dyn SerialPort>> {
    uuid: Uuid,
    thetis: Thetis<L>,
    config: InspectionConfig,
}

impl Inspection {
    /// Open the profiler named in the config.
    ///
    /// * `config`: Set of config parameters.
    pub fn new(config: InspectionConfig) -> Result<Self> {
        let thetis = Thetis::open(ThetisConfig::from_file(&config.thetis_config_file)?)?;
        Ok(Self::with_thetis(thetis, config))
    }

    /// Build the inspection from a config file.
    ///
    /// * `filepath`: Path to file with configuration parameters.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        Self::new(InspectionConfig::from_file(filepath)?)
    }
}

impl<L: SerialLink> Inspection<L> {
    pub fn with_thetis(thetis: Thetis<L>, config: InspectionConfig) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            thetis,
            config,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn thetis_mut(&mut self) -> &mut Thetis<L> {
        &mut self.thetis
    }
}

/// Unit struct that runs an [`Inspection`].
pub struct InspectionController;

impl InspectionController {
    /// Run the inspection. The test stops early, with a fail, when the
    /// operator reports a problem before the profiler is powered.
    ///
    /// * `inspection`: profiler and settings.
    /// * `operator`: person running the test.
    pub fn run<L: SerialLink, O: Operator>(
        inspection: &mut Inspection<L>,
        operator: &mut O,
    ) -> Result<InspectionReport> {
        operator.pause(
            "If at any point during this QCT the answer to a prompt is no, the QCT should be \
             stopped and the issue resolved before proceeding.",
        )?;
        let name = operator.ask("QCT Conductor: ")?;
        let document = document_number(&operator.ask("Enter the sequential QCT form number: ")?);
        let host = operator.ask("Enter the JProfilerHost version: ")?;
        let processor = operator.ask("Enter the JMAFileProcessor version: ")?;

        fs::create_dir_all(&inspection.config.output_directory)?;
        let path = inspection
            .config
            .output_directory
            .join(format!("QCT_LOG_{document}.txt"));
        let mut log = QctLog::create(&path)?;
        log.entry(&format!("Operator: {name}"))?;
        log.entry(&format!("QCT performed on {}", Utc::now().format("%Y-%m-%d")))?;
        log.entry(&format!("Document Number: {document}"))?;
        log.entry(&format!("JProfilerHost Version: {host}"))?;
        log.entry(&format!("JMAFileProcessor Version: {processor}"))?;

        operator.notify("Physically inspect the profiler.")?;
        for (question, confirmed) in INSPECTION_QUESTIONS {
            if !ask_and_log(operator, &mut log, question, confirmed)? {
                return stop(log, &path, question);
            }
        }

        operator.notify("Gather sensor serial numbers from vendor documentation or serial number stickers.")?;
        operator.notify("If sensor serial numbers are not present or not visible, stop this QCT and resolve.")?;
        for prompt in SERIAL_NUMBER_PROMPTS {
            let serial_number = operator.ask(&format!("Enter the {prompt}: "))?;
            log.entry(&format!("{prompt}: {}", serial_number.trim()))?;
        }

        operator.notify("Gather sensor calibration certificates.")?;
        let question = "Are all calibration certificates present and complete?";
        if !ask_and_log(operator, &mut log, question, "Calibration certificates present.")? {
            return stop(log, &path, question);
        }

        let passed = Self::powered_check(inspection, operator, &mut log)?;
        let flag = QctFlag::from(passed);
        log.entry(&format!("Inspection QCT {flag}"))?;
        log.flush()?;
        Ok(InspectionReport { log: path, flag })
    }

    fn powered_check<L: SerialLink, O: Operator>(
        inspection: &mut Inspection<L>,
        operator: &mut O,
        log: &mut QctLog,
    ) -> Result<bool> {
        let config = inspection.config.clone();
        let thetis = &mut inspection.thetis;
        let mut passed = true;

        operator.notify("Attach a serial cable and charged batteries to the profiler.")?;
        operator.pause("Apply power to the profiler.")?;
        let version = thetis.get_version()?;
        log.entry(&format!(
            "{} connected on port {}",
            version.profiler_name(),
            thetis.sercom().name()
        ))?;

        thetis.make_directory(&config.test_directory, Listener::PC)?;
        if thetis.change_directory(&config.test_directory, Listener::PC)? {
            log.entry(&format!("Profiler Test Directory: {}", config.test_directory))?;
        } else {
            warn!("could not move into {}", config.test_directory);
            passed = false;
        }

        if thetis.data_logging(PowerState::On)? == PowerState::On {
            log.entry("Profiler logging on")?;
        }

        operator.notify(&format!(
            "Sensors will now power up. The pump will remain on for {} seconds and then shut off.",
            config.pump_run.as_secs()
        ))?;
        operator.notify("Please observe components such as wipers.")?;
        operator.pause("To power up sensors,")?;
        if thetis.power_sensors(PowerState::On)? {
            log.entry("Sensors on")?;
        } else {
            passed = false;
        }
        thetis.sercom_mut().pause(config.pump_run);
        thetis.power_pump(PowerState::Off)?;
        passed &= ask_and_log(operator, log, "Did the pump shut off?", "Pump off")?;

        thetis.sercom_mut().pause(config.sample_time);
        if thetis.power_sensors(PowerState::Off)? {
            operator.notify("Sensors should now be off.")?;
            log.entry("Sensors off")?;
        } else {
            passed = false;
        }

        for (question, confirmed) in OBSERVATIONS {
            passed &= ask_and_log(operator, log, question, confirmed)?;
        }

        let surface = thetis.get_surface_switch_status()?;
        operator.pause("Apply pressure to the surface pressure switch and hold it.")?;
        let submerged = thetis.get_surface_switch_status()?;
        let switch_ok = surface == SurfaceState::Surface && submerged == SurfaceState::Submerged;
        log.entry(&format!(
            "Surface switch {surface} then {submerged} under pressure: {}",
            QctFlag::from(switch_ok)
        ))?;
        passed &= switch_ok;

        if thetis.power_winch(PowerState::On)? {
            log.entry("Profiler winch on")?;
        }
        if thetis.data_logging(PowerState::Off)? == PowerState::Off {
            log.entry("Profiler logging off")?;
        }
        if thetis.power_winch(PowerState::Off)? {
            log.entry("Profiler winch off")?;
        }
        info!("powered check {}", QctFlag::from(passed));
        Ok(passed)
    }
}

fn ask_and_log<O: Operator>(operator: &mut O, log: &mut QctLog, question: &str, confirmed: &str) -> Result<bool> {
    let answer = operator.ask(&format!("{question} [Y/N] "))?;
    if is_yes(&answer) {
        log.answer(&answer, confirmed)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

fn stop(mut log: QctLog, path: &Path, question: &str) -> Result<InspectionReport> {
    warn!("QCT stopped at {question:?}");
    log.entry(&format!("QCT stopped: {question}"))?;
    log.flush()?;
    Ok(InspectionReport {
        log: path.to_path_buf(),
        flag: QctFlag::Fail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use crate::utils::tests::{mock_thetis, scratch_dir, thetis_reply, MockLink, ScriptedOperator};

    fn profiler_script() -> MockLink {
        MockLink::new()
            .on("VER", thetis_reply(Listener::PC, "VER", &["7", "4.2.1"]))
            .on("MKD", thetis_reply(Listener::PC, "MKD", &[]))
            .on("CD", thetis_reply(Listener::PC, "CD", &["\\qct"]))
            .on("LOG,1,1", thetis_reply(Listener::PC, "LOG", &["1"]))
            .on("CTDP", "CTD ON\r\n")
            .on("INSP", "INST ON\r\n")
            .on("PMP", "PMP OFF\r\n")
            .on("CTDP", "CTD OFF\r\n")
            .on("INSP", "INST OFF\r\n")
            .on("PSW", "$PWETA,PC,,,,PSW,1,SURFACE*00\r\n")
            .on("PSW", "$PWETA,PC,,,,PSW,1,SUBMERGED*00\r\n")
            .on("WP,1,1", "WINCH ON\r\n")
            .on("LOG,1,0", thetis_reply(Listener::PC, "LOG", &["0"]))
            .on("WP,1,0", "WINCH OFF\r\n")
    }

    fn answers(inspection: &[&str]) -> Vec<String> {
        let mut answers = vec!["", "Jane Doe", "42", "3.1.4", "2.0.0"];
        answers.extend_from_slice(inspection);
        answers.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_document_number() {
        assert_eq!(document_number("42"), "3310-00200-00042");
        assert_eq!(document_number(" 12345 "), "3310-00200-12345");
    }

    #[test]
    fn test_inspection_stops_on_no() {
        let dir = scratch_dir("inspection-stop");
        let mut inspection = Inspection::with_thetis(mock_thetis(MockLink::new()), InspectionConfig::new("thetis.yaml", &dir));
        let answers = answers(&["y", "n"]);
        let answers: Vec<&str> = answers.iter().map(String::as_str).collect();
        let mut operator = ScriptedOperator::new(&answers);

        let report = InspectionController::run(&mut inspection, &mut operator).unwrap();
        assert_eq!(report.flag, QctFlag::Fail);
        assert_eq!(report.log, dir.join("QCT_LOG_3310-00200-00042.txt"));
        let text = fs::read_to_string(&report.log).unwrap();
        assert!(text.contains(", Operator: Jane Doe\n"));
        assert!(text.contains("y, Sensor components look okay."));
        assert!(text.contains("QCT stopped: Are sensor cables"));
        assert!(inspection.thetis_mut().sercom().link().written.is_empty());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_inspection_passes() {
        let dir = scratch_dir("inspection-pass");
        let mut inspection = Inspection::with_thetis(mock_thetis(profiler_script()), InspectionConfig::new("thetis.yaml", &dir));
        let mut script = vec!["y", "y", "y"];
        script.extend(SERIAL_NUMBER_PROMPTS.iter().map(|_| "1234"));
        // certificates, apply power, power up, pump, 4 observations, surface switch
        script.extend(["Y", "", "", "y", "y", "y", "y", "y", ""]);
        let answers = answers(&script);
        let answers: Vec<&str> = answers.iter().map(String::as_str).collect();
        let mut operator = ScriptedOperator::new(&answers);

        let report = InspectionController::run(&mut inspection, &mut operator).unwrap();
        let text = fs::read_to_string(&report.log).unwrap();
        assert_eq!(report.flag, QctFlag::Pass, "{text}");
        assert!(text.contains("SBE 49 SN (49-XXX): 1234"));
        assert!(text.contains("WLP-007 connected on port mock"));
        assert!(text.contains("Surface switch SURFACE then SUBMERGED under pressure: PASS"));
        assert!(text.contains("Profiler logging off"));
        let link = inspection.thetis_mut().sercom().link();
        assert_eq!(link.unused_replies(), 0);
        assert!(link.pauses.contains(&Duration::from_secs(10)));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_read_write_inspection_config_file() {
        let write_config = InspectionConfig::new("config/devices/thetis.yaml", "/tmp/qct");
        let path = format!("{}/config/components/inspection.yaml", env!("CARGO_MANIFEST_DIR"));
        yaml::to_yaml_file(&write_config, &path).unwrap();
        let read_config = InspectionConfig::from_file(&path).unwrap();
        assert_eq!(write_config, read_config, "Failed to be created equally");
    }
}
