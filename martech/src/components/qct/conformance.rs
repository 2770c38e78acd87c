use crate::{
    error::{MartechError, Result},
    utils::time::{seconds_apart, ISO_SECONDS},
};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Largest difference, in seconds, between a sensor clock and the host
/// clock that still passes. Covers the time taken to query the sensor.
pub const CLOCK_TOLERANCE: f64 = 1.5;

/// Largest share of the memory that may be in use when a sensor is checked.
pub const MEMORY_LIMIT: f64 = 0.25;

/// Outcome of a conformance check.
#[derive(
    EnumString, IntoStaticStr, Display, Deserialize, Serialize, Copy, Clone, Debug, PartialEq, Eq,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum QctFlag {
    Pass,
    Fail,
}

impl From<bool> for QctFlag {
    fn from(passed: bool) -> Self {
        if passed {
            QctFlag::Pass
        } else {
            QctFlag::Fail
        }
    }
}

/// Compare a sensor clock against a reference time.
///
/// * `sensor_time`: UTC sensor time as `YYYY-MM-DDTHH:MM:SS`.
/// * `now`: reference UTC time.
/// * `tolerance`: largest accepted difference in seconds.
pub fn clock_test(sensor_time: &str, now: NaiveDateTime, tolerance: f64) -> Result<QctFlag> {
    let sensor = NaiveDateTime::parse_from_str(sensor_time.trim(), ISO_SECONDS)
        .map_err(|_| MartechError::parse("sensor time", sensor_time))?;
    Ok(QctFlag::from(seconds_apart(now, sensor) <= tolerance))
}

/// Compare a sensor clock against the host clock with the default tolerance.
pub fn clock_test_now(sensor_time: &str) -> Result<QctFlag> {
    clock_test(sensor_time, Utc::now().naive_utc(), CLOCK_TOLERANCE)
}

/// Pass when no more than a quarter of the memory is in use.
pub fn memory_test(used: u64, total: u64) -> QctFlag {
    QctFlag::from(used as f64 <= total as f64 * MEMORY_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn reference() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 5, 17)
            .unwrap()
            .and_hms_milli_opt(8, 30, 5, 400)
            .unwrap()
    }

    #[rstest]
    #[case("2023-05-17T08:30:05", QctFlag::Pass)]
    #[case("2023-05-17T08:30:04", QctFlag::Pass)]
    #[case("2023-05-17T08:30:03", QctFlag::Fail)]
    #[case("2023-05-17T08:30:07", QctFlag::Fail)]
    fn test_clock_test(#[case] sensor: &str, #[case] expected: QctFlag) {
        assert_eq!(clock_test(sensor, reference(), CLOCK_TOLERANCE).unwrap(), expected);
    }

    #[test]
    fn test_clock_test_rejects_bad_time() {
        assert!(matches!(
            clock_test("05/17/23 08:30:05", reference(), CLOCK_TOLERANCE),
            Err(MartechError::Parse { .. })
        ));
    }

    #[rstest]
    #[case(250, 1000, QctFlag::Pass)]
    #[case(251, 1000, QctFlag::Fail)]
    #[case(0, 0, QctFlag::Pass)]
    fn test_memory_test(#[case] used: u64, #[case] total: u64, #[case] expected: QctFlag) {
        assert_eq!(memory_test(used, total), expected);
    }

    #[test]
    fn test_flag_text() {
        assert_eq!(QctFlag::Pass.to_string(), "PASS");
        assert_eq!(QctFlag::Fail.to_string(), "FAIL");
    }
}
