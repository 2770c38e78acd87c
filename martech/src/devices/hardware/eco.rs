use crate::{
    devices::hardware::{
        sercom::{last_capture, Eol, Sercom, SerialLink, CHECK_INTERVAL},
        thetis::PowerState,
    },
    error::{MartechError, Result},
    utils::time::ISO_SECONDS,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use log::{info, warn};
use std::time::Duration;
use strum_macros::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

/// Factory line speed of every ECO sensor.
pub const ECO_BAUD_RATE: u32 = 19200;

/// Largest value accepted by `$Pkt` and `$Set`.
pub const MAX_COLLECTION_ROWS: u32 = 65535;

/// Settle time after each half of a clock update.
const CLOCK_SETTLE: Duration = Duration::from_millis(250);

/// Time the menu takes to print.
const MENU_SETTLE: Duration = Duration::from_millis(200);

/// Time allowed for the wiper before sampled rows arrive.
const WIPER_SETTLE: Duration = Duration::from_secs(1);

/// Reads allowed while waiting on the memory line after an erase.
const ERASE_READS: u32 = 20;

/// Which ECO sensor is on the line. The family shares a menu, the models
/// differ in how sampling is interrupted.
#[derive(EnumString, IntoStaticStr, Display, Copy, Clone, Debug, PartialEq, Eq)]
pub enum EcoModel {
    Par,
    TripletW,
}

impl EcoModel {
    /// Characters that interrupt sampling.
    pub fn break_sequence(&self) -> &'static str {
        match self {
            EcoModel::Par => "!!!!!",
            EcoModel::TripletW => "!!!!",
        }
    }
}

/// Reply to `$mnu`. Every line holds a three letter field name and its value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EcoMenu {
    text: String,
}

impl EcoMenu {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self { text: text.into() }
    }

    /// The menu as printed.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Raw value of a field, e.g. `Ser`.
    pub fn field(&self, name: &str) -> Result<String> {
        last_capture(&format!(r"{name} (.*?)\r"), &self.text, "$mnu")
    }

    pub fn serial_number(&self) -> Result<String> {
        self.field("Ser")
    }

    /// Free memory as reported by `Mem`.
    pub fn memory(&self) -> Result<u64> {
        let value = self.field("Mem")?;
        value.trim().parse().map_err(|_| MartechError::parse("memory", &value))
    }

    pub fn firmware_version(&self) -> Result<String> {
        self.field("Ver")
    }

    /// Sensor clock from the `Dat` and `Clk` fields.
    pub fn datetime(&self) -> Result<NaiveDateTime> {
        let date = parse_date(&self.field("Dat")?)?;
        let time = parse_time(&self.field("Clk")?)?;
        Ok(date.and_time(time))
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%m/%d/%y").map_err(|_| MartechError::parse("date", value))
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M:%S").map_err(|_| MartechError::parse("time", value))
}

/// Menu driver shared by the ECO PAR and ECO Triplet-w.
pub struct Eco<L: SerialLink> {
    uuid: Uuid,
    sercom: Sercom<L>,
    model: EcoModel,
}

impl<L: SerialLink> Eco<L> {
    /// Drive an ECO sensor over an existing connection.
    ///
    /// * `sercom`: open connection at [`ECO_BAUD_RATE`].
    /// * `model`: which sensor is on the line.
    pub fn new(sercom: Sercom<L>, model: EcoModel) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            sercom,
            model,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn model(&self) -> EcoModel {
        self.model
    }

    pub fn sercom(&self) -> &Sercom<L> {
        &self.sercom
    }

    pub fn sercom_mut(&mut self) -> &mut Sercom<L> {
        &mut self.sercom
    }

    pub fn into_sercom(self) -> Sercom<L> {
        self.sercom
    }

    /// Interrupt sampling. True once the menu has printed its version line.
    pub fn stop_sampling(&mut self) -> Result<bool> {
        self.sercom.write_command(self.model.break_sequence(), Eol::None)?;
        let response = self.sercom.read_until(b"Mem")?;
        if response.contains("Ver") {
            self.sercom.pause(Duration::from_secs(1));
            self.sercom.clear_buffers()?;
            info!("{} has stopped sampling", self.model);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn start_sampling(&mut self) -> Result<()> {
        self.sercom.write_command("$run", Eol::Cr)
    }

    /// Run the wiper command and check that it was echoed.
    pub(crate) fn move_wiper(&mut self, command: &str) -> Result<bool> {
        self.sercom.write_command(command, Eol::Cr)?;
        let response = self.sercom.read_line()?;
        Ok(response.contains("mvs"))
    }

    /// Set the sensor clock to the current UTC time.
    pub fn set_datetime(&mut self) -> Result<bool> {
        self.set_datetime_to(Utc::now())
    }

    /// Set the sensor clock and check the date and time it reports back.
    ///
    /// * `time`: UTC time to set, at second precision.
    pub fn set_datetime_to(&mut self, time: DateTime<Utc>) -> Result<bool> {
        let mmddyy = time.format("%m%d%y").to_string();
        let hhmmss = time.format("%H%M%S").to_string();
        self.sercom.write_command(&format!("$date {mmddyy}"), Eol::Cr)?;
        self.sercom.pause(CLOCK_SETTLE);
        self.sercom.clear_buffers()?;
        self.sercom.write_command(&format!("$clk {hhmmss}"), Eol::Cr)?;
        self.sercom.pause(CLOCK_SETTLE);
        let response = self.sercom.read_response(CHECK_INTERVAL)?;

        let date = parse_date(&last_capture(r"Dat (.*?)\r", &response, "$clk")?)?;
        let clock = parse_time(&last_capture(r"Clk (.*?)\r", &response, "$clk")?)?;
        let matched = date.format("%m%d%y").to_string() == mmddyy
            && clock.format("%H%M%S").to_string() == hhmmss;
        if matched {
            info!("{} clock set to {}", self.model, time.format(ISO_SECONDS));
        } else {
            warn!("{} reports {date} {clock} after setting {time}", self.model);
        }
        Ok(matched)
    }

    /// Store the current settings in flash.
    pub fn store_settings(&mut self) -> Result<bool> {
        self.sercom.write_command("$sto", Eol::CrLf)?;
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        Ok(response.contains("done"))
    }

    /// Print and parse the menu.
    pub fn menu(&mut self) -> Result<EcoMenu> {
        self.sercom.write_command("$mnu", Eol::CrLf)?;
        self.sercom.pause(MENU_SETTLE);
        Ok(EcoMenu::new(self.sercom.read_response(CHECK_INTERVAL)?))
    }

    pub fn get_serial_number(&mut self) -> Result<String> {
        self.menu()?.serial_number()
    }

    pub fn get_memory(&mut self) -> Result<u64> {
        self.menu()?.memory()
    }

    pub fn get_firmware_version(&mut self) -> Result<String> {
        self.menu()?.firmware_version()
    }

    /// Sensor clock as `YYYY-MM-DDTHH:MM:SS`.
    pub fn get_sensor_datetime(&mut self) -> Result<String> {
        Ok(self.menu()?.datetime()?.format(ISO_SECONDS).to_string())
    }

    /// Settings as stored in flash (`$rls`).
    pub fn settings_from_flash(&mut self) -> Result<String> {
        self.sercom.write_command("$rls", Eol::CrLf)?;
        self.sercom.read_response(CHECK_INTERVAL)
    }

    /// Switch internal logging. True when the sensor reports the new state.
    pub fn log_data(&mut self, state: PowerState) -> Result<bool> {
        let command = format!("$rec {}", state.flag());
        self.sercom.write_command(&command, Eol::CrLf)?;
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        let reported = last_capture(r"Rec (.*?)\r", &response, &command)?;
        Ok(reported.trim().parse::<u8>().ok() == Some(state.flag()))
    }

    /// Rows collected between times (`$Pkt`). Returns the value echoed.
    pub fn set_packet_size(&mut self, rows: u32) -> Result<u32> {
        self.set_collection("Pkt", rows)
    }

    /// Rows collected between low power periods (`$Set`).
    pub fn set_row_count(&mut self, rows: u32) -> Result<u32> {
        self.set_collection("Set", rows)
    }

    fn set_collection(&mut self, field: &'static str, rows: u32) -> Result<u32> {
        if rows > MAX_COLLECTION_ROWS {
            return Err(MartechError::InvalidArgument(format!(
                "{field} must be between 0 and {MAX_COLLECTION_ROWS}, got {rows}"
            )));
        }
        let command = format!("${field} {rows}");
        self.sercom.write_command(&command, Eol::CrLf)?;
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        let echoed = last_capture(&format!(r"{field} (.*?)\r"), &response, &command)?;
        let echoed = echoed.trim().parse().map_err(|_| MartechError::parse(field, &echoed))?;
        if !self.store_settings()? {
            warn!("{} did not confirm storing {field}", self.model);
        }
        Ok(echoed)
    }

    /// Sample for the given time and return every row split on tabs. Wiper
    /// echoes and blank lines are dropped.
    ///
    /// * `duration`: sampling time after the wiper has run.
    pub fn collect_data(&mut self, duration: Duration) -> Result<Vec<Vec<String>>> {
        self.start_sampling()?;
        self.sercom.pause(WIPER_SETTLE + duration);
        let response = self.sercom.read_response(CHECK_INTERVAL)?;
        self.stop_sampling()?;
        let rows = response
            .replace('\r', "")
            .split('\n')
            .filter(|line| !line.is_empty() && !line.contains("mvs"))
            .map(|line| line.split('\t').map(str::to_string).collect())
            .collect();
        self.sercom.clear_buffers()?;
        Ok(rows)
    }

    /// Dump the internal memory (`$get`).
    pub fn get_data(&mut self) -> Result<String> {
        self.sercom.write_command("$get", Eol::CrLf)?;
        self.sercom.read_response(CHECK_INTERVAL)
    }

    /// Read until the memory line has arrived, giving up after a few reads.
    pub(crate) fn read_until_memory_line(&mut self) -> Result<String> {
        let mut response = String::new();
        for _ in 0..ERASE_READS {
            response.push_str(&self.sercom.read_response(CHECK_INTERVAL)?);
            if response.contains("Mem") {
                break;
            }
        }
        Ok(response)
    }

    /// Leave the profiler passthrough.
    pub fn exit_passthru(&mut self) -> Result<bool> {
        self.sercom.exit_passthru()
    }
}
