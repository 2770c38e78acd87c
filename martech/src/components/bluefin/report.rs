use crate::{
    devices::hardware::{bluefin::Bluefin, sercom::SerialLink},
    error::Result,
    messages::bluefin::summary::describe,
};
use chrono::Utc;
use log::info;
use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
};

/// Everything a battery reports about itself, as written to the bench
/// report.
#[derive(Clone, Debug, PartialEq)]
pub struct BatteryReport {
    pub operator: String,
    /// UTC date as `YYYY-MM-DD`.
    pub date: String,
    pub battery_sn: u64,
    pub device_sn: u64,
    pub model: String,
    pub firmware: String,
    pub address: u8,
    pub state: &'static str,
    pub error: &'static str,
    pub water: bool,
    pub voltage: f64,
    pub min_cell: f64,
    pub max_cell: f64,
    pub temperature: f64,
    /// Hours, minutes and seconds the battery has been on.
    pub runtime: (u32, u32, u32),
    /// Cell spread within the delta.
    pub balanced: bool,
}

impl BatteryReport {
    /// Query the battery. It is left as it was found.
    ///
    /// * `battery`: battery to query, alone on the bus.
    /// * `operator`: name recorded in the report.
    /// * `delta`: largest cell spread (V) reported as balanced.
    pub fn collect<L: SerialLink>(battery: &mut Bluefin<L>, operator: &str, delta: f64) -> Result<Self> {
        let version = battery.get_version_summary()?;
        let address = battery.get_address()?;
        let summary = battery.get_summary()?;
        Ok(Self {
            operator: operator.to_string(),
            date: Utc::now().format("%Y-%m-%d").to_string(),
            battery_sn: version.battery_sn,
            device_sn: version.device_sn,
            model: version.model,
            firmware: version.firmware,
            address,
            state: describe(&summary.state),
            error: describe(&summary.error),
            water: summary.water,
            voltage: summary.voltage,
            min_cell: summary.min_cell,
            max_cell: summary.max_cell,
            temperature: summary.temperature,
            runtime: summary.runtime_hms().unwrap_or_default(),
            balanced: summary.cell_spread() <= delta,
        })
    }

    /// File name of the report.
    pub fn file_name(&self) -> String {
        format!("bf_{}_report_{}.txt", self.battery_sn, self.date)
    }

    /// Write the report into `directory`, replacing an earlier report of
    /// the same day.
    pub fn write<P: AsRef<Path>>(&self, directory: P) -> Result<PathBuf> {
        fs::create_dir_all(&directory)?;
        let path = directory.as_ref().join(self.file_name());
        fs::write(&path, self.to_string())?;
        info!("battery report written to {}", path.display());
        Ok(path)
    }
}

impl fmt::Display for BatteryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s) = self.runtime;
        writeln!(f, "Operator: {}", self.operator)?;
        writeln!(f, "Date: {}", self.date)?;
        writeln!(f)?;
        writeln!(f, "Battery Serial Number: {}", self.battery_sn)?;
        writeln!(f, "Battery Board Serial Number: {}", self.device_sn)?;
        writeln!(f, "Battery Board Model: {}", self.model)?;
        writeln!(f, "Battery Board Firmware: {}", self.firmware)?;
        writeln!(f, "Battery Address: {}", self.address)?;
        writeln!(f, "Battery State: {}", self.state)?;
        writeln!(f, "Error State: {}", self.error)?;
        writeln!(f, "Water Intrusion Detected: {}", if self.water { "True" } else { "False" })?;
        writeln!(f, "Overall Voltage: {}", self.voltage)?;
        writeln!(f, "Minimum Cell Voltage: {}", self.min_cell)?;
        writeln!(f, "Maximum Cell Voltage: {}", self.max_cell)?;
        writeln!(f, "Battery Temperature: {}", self.temperature)?;
        writeln!(f, "Battery has been on for {h}h, {m}m, {s}s.")?;
        writeln!(f, "Balance Test Result: {}", if self.balanced { "True" } else { "False" })
    }
}

/// Unit struct for the bench query of a battery.
pub struct BatteryQueryController;

impl BatteryQueryController {
    /// Query the battery, switch its output off and write the report.
    ///
    /// * `battery`: battery alone on the bus.
    /// * `operator`: name recorded in the report.
    /// * `delta`: largest cell spread (V) reported as balanced.
    /// * `directory`: where the report is written.
    pub fn run<L: SerialLink, P: AsRef<Path>>(
        battery: &mut Bluefin<L>,
        operator: &str,
        delta: f64,
        directory: P,
    ) -> Result<(BatteryReport, PathBuf)> {
        let report = BatteryReport::collect(battery, operator, delta)?;
        battery.off()?;
        let path = report.write(directory)?;
        Ok((report, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::bluefin::balance::tests::{summary, VERSION},
        devices::hardware::{bluefin::BALANCE_DELTA, sercom::Sercom},
        utils::tests::{scratch_dir, MockLink},
    };

    #[test]
    fn test_query_writes_report() {
        let dir = scratch_dir("bluefin-report");
        let link = MockLink::new()
            .on("#00z0", VERSION)
            .on("#00?0", "$00?0 00 \r\n")
            .on("#00q0", summary(3.632, 3.651, 21.5))
            .on("#00bf", "");
        let mut battery = Bluefin::with_sercom(Sercom::new(link, "bluefin"), 0).unwrap();

        let (report, path) = BatteryQueryController::run(&mut battery, "Jane Doe", BALANCE_DELTA, &dir).unwrap();
        assert_eq!(report.battery_sn, 1187);
        assert_eq!(report.runtime, (1, 2, 3));
        assert!(report.balanced);
        assert_eq!(path, dir.join(report.file_name()));
        assert!(report.file_name().starts_with("bf_1187_report_"));

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Operator: Jane Doe");
        assert_eq!(lines[2], "");
        assert_eq!(lines[5], "Battery Board Model: SBM15");
        assert_eq!(lines[8], "Battery State: DISCHARGING");
        assert_eq!(lines[9], "Error State: No error");
        assert_eq!(lines[10], "Water Intrusion Detected: False");
        assert_eq!(lines[15], "Battery has been on for 1h, 2m, 3s.");
        assert_eq!(lines[16], "Balance Test Result: True");
        assert_eq!(battery.sercom().link().unused_replies(), 0);
        fs::remove_dir_all(dir).unwrap();
    }
}
