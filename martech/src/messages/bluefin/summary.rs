use crate::error::{MartechError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::EnumMessage;
use strum_macros::{Display, EnumMessage, EnumString, IntoStaticStr};

/// Operating state, the first character of the state token.
#[derive(
    EnumString, IntoStaticStr, Display, EnumMessage, Deserialize, Serialize, Copy, Clone, Debug, PartialEq, Eq,
)]
pub enum BatteryState {
    #[strum(serialize = "f", message = "OFF")]
    Off,
    #[strum(serialize = "d", message = "DISCHARGING")]
    Discharging,
    #[strum(serialize = "c", message = "CHARGING")]
    Charging,
    #[strum(serialize = "b", message = "BALANCING")]
    Balancing,
}

/// Error state, the second character of the state token.
#[derive(
    EnumString, IntoStaticStr, Display, EnumMessage, Deserialize, Serialize, Copy, Clone, Debug, PartialEq, Eq,
)]
pub enum BatteryError {
    #[strum(serialize = "-", message = "No error")]
    NoError,
    #[strum(serialize = "V", message = "Battery over voltage")]
    OverVoltage,
    #[strum(serialize = "v", message = "Battery under voltage")]
    UnderVoltage,
    #[strum(serialize = "I", message = "Battery over current")]
    OverCurrent,
    #[strum(serialize = "C", message = "Battery max cell over voltage")]
    CellOverVoltage,
    #[strum(serialize = "c", message = "Battery min cell under voltage")]
    CellUnderVoltage,
    #[strum(serialize = "x", message = "Battery min cell under fault voltage (2.0V)")]
    CellFault,
    #[strum(serialize = "T", message = "Battery over temperature")]
    OverTemperature,
    #[strum(serialize = "W", message = "Battery moisture intrusion detected by H2O sensors")]
    Moisture,
    #[strum(serialize = "H", serialize = "h", message = "Battery internal hardware fault")]
    HardwareFault,
    #[strum(serialize = "m", message = "Battery watchdog timeout")]
    Watchdog,
}

/// Human readable description of a state or error code.
pub fn describe<E: EnumMessage>(code: &E) -> &'static str {
    code.get_message().unwrap_or("Unknown")
}

/// One line battery summary, as returned by `q0` on the battery itself or
/// relayed by the profiler controller through `BFS`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BatterySummary {
    /// First token, the battery position or reply header.
    pub position: String,
    pub state: BatteryState,
    pub error: BatteryError,
    /// Pack voltage (V).
    pub voltage: f64,
    /// Pack current (A).
    pub current: f64,
    /// Oil temperature (degC).
    pub temperature: f64,
    pub min_cell: f64,
    pub max_cell: f64,
    /// Water intrusion detected.
    pub water: bool,
    pub watts: f64,
    /// Time enabled as `HH:MM:SS`.
    pub runtime: String,
    pub mode: Option<String>,
    /// Seconds until sleep, 0 when the timer is disabled.
    pub sleep_timer: Option<u32>,
}

impl BatterySummary {
    /// Parse the whitespace separated summary tokens.
    pub fn parse(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 10 {
            return Err(MartechError::no_match("q0", "summary tokens", line));
        }
        let mut flags = tokens[1].chars();
        let state = flags
            .next()
            .and_then(|c| BatteryState::from_str(&c.to_string()).ok())
            .ok_or_else(|| MartechError::parse("battery state", tokens[1]))?;
        let error = flags
            .next()
            .and_then(|c| BatteryError::from_str(&c.to_string()).ok())
            .ok_or_else(|| MartechError::parse("battery error", tokens[1]))?;
        Ok(Self {
            position: tokens[0].to_string(),
            state,
            error,
            voltage: number("voltage", tokens[2])?,
            current: number("current", tokens[3])?,
            temperature: number("temperature", tokens[4])?,
            min_cell: number("min cell", tokens[5])?,
            max_cell: number("max cell", tokens[6])?,
            water: number::<u8>("water", tokens[7])? == 1,
            watts: number("watts", tokens[8])?,
            runtime: tokens[9].to_string(),
            mode: tokens.get(10).map(|m| m.to_string()),
            sleep_timer: tokens.get(13).and_then(|t| t.parse().ok()),
        })
    }

    /// Runtime split into hours, minutes and seconds.
    pub fn runtime_hms(&self) -> Option<(u32, u32, u32)> {
        let mut parts = self.runtime.split(':').map(|p| p.parse::<u32>().ok());
        Some((parts.next()??, parts.next()??, parts.next()??))
    }

    /// Difference between the highest and lowest cell.
    pub fn cell_spread(&self) -> f64 {
        (self.max_cell - self.min_cell).abs()
    }
}

/// Identity and ratings of a battery, from `z0`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct VersionSummary {
    /// `m` or `s`.
    pub mode: String,
    pub device_sn: u64,
    pub battery_sn: u64,
    pub voltage_rating: u32,
    pub current_rating: u32,
    pub model: String,
    pub firmware: String,
}

impl VersionSummary {
    /// Parse the whitespace separated version tokens.
    pub fn parse(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 9 {
            return Err(MartechError::no_match("z0", "version tokens", line));
        }
        Ok(Self {
            mode: tokens[2].to_string(),
            device_sn: number("device serial number", tokens[3])?,
            battery_sn: number("battery serial number", tokens[4])?,
            voltage_rating: number("voltage rating", tokens[5])?,
            current_rating: number("current rating", tokens[6])?,
            model: tokens[7].to_string(),
            firmware: tokens[8].to_string(),
        })
    }
}

fn number<T: FromStr>(field: &'static str, token: &str) -> Result<T> {
    token.parse().map_err(|_| MartechError::parse(field, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SUMMARY: &str = "$00q0 d- 29.104  -1.250 21.5 3.632 3.651 0 36.4  01:02:03 m 0 0 600\r\n";

    #[test]
    fn test_parse_battery_summary() {
        let summary = BatterySummary::parse(SUMMARY).unwrap();
        assert_eq!(summary.state, BatteryState::Discharging);
        assert_eq!(summary.error, BatteryError::NoError);
        assert_eq!(summary.voltage, 29.104);
        assert_eq!(summary.current, -1.25);
        assert_eq!(summary.temperature, 21.5);
        assert!(!summary.water);
        assert_eq!(summary.runtime_hms(), Some((1, 2, 3)));
        assert_eq!(summary.mode.as_deref(), Some("m"));
        assert_eq!(summary.sleep_timer, Some(600));
        assert!((summary.cell_spread() - 0.019).abs() < 1e-9);
    }

    #[test]
    fn test_parse_relayed_summary_without_extras() {
        let summary = BatterySummary::parse("2 fm 28.1 0.0 19.0 3.5 3.6 1 0.0 00:00:10").unwrap();
        assert_eq!(summary.position, "2");
        assert_eq!(summary.state, BatteryState::Off);
        assert_eq!(summary.error, BatteryError::Watchdog);
        assert!(summary.water);
        assert_eq!(summary.sleep_timer, None);
    }

    #[test]
    fn test_parse_summary_rejects_short_line() {
        assert!(matches!(
            BatterySummary::parse("$00q0 d-"),
            Err(MartechError::NoMatch { .. })
        ));
    }

    #[rstest]
    #[case("H", BatteryError::HardwareFault)]
    #[case("h", BatteryError::HardwareFault)]
    #[case("C", BatteryError::CellOverVoltage)]
    #[case("c", BatteryError::CellUnderVoltage)]
    fn test_error_codes_are_case_sensitive(#[case] code: &str, #[case] expected: BatteryError) {
        assert_eq!(BatteryError::from_str(code).unwrap(), expected);
    }

    #[test]
    fn test_describe_codes() {
        assert_eq!(describe(&BatteryState::Balancing), "BALANCING");
        assert_eq!(describe(&BatteryError::Watchdog), "Battery watchdog timeout");
    }

    #[test]
    fn test_parse_version_summary() {
        let version = VersionSummary::parse("$00z0 1 m 4021 1187 30 20 SBM15 v2.14 \r\n").unwrap();
        assert_eq!(version.mode, "m");
        assert_eq!(version.device_sn, 4021);
        assert_eq!(version.battery_sn, 1187);
        assert_eq!(version.voltage_rating, 30);
        assert_eq!(version.current_rating, 20);
        assert_eq!(version.model, "SBM15");
        assert_eq!(version.firmware, "v2.14");
    }
}
