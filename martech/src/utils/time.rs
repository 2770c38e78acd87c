use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Millisecond precision local timestamp used at the start of log lines.
pub const LOG_TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Second precision timestamp used for sensor clocks.
pub const ISO_SECONDS: &str = "%Y-%m-%dT%H:%M:%S";

/// Date stamp used in directory and log file names.
pub const FILE_DATE: &str = "%Y%m%d";

/// Current local time.
pub fn now() -> DateTime<Local> {
    Local::now()
}

/// Format a time for the start of a log line.
pub fn log_timestamp<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format(LOG_TIMESTAMP).to_string()
}

/// Absolute difference between two naive times in fractional seconds.
pub fn seconds_apart(a: NaiveDateTime, b: NaiveDateTime) -> f64 {
    let delta = a.signed_duration_since(b);
    delta.num_milliseconds().abs() as f64 / 1000.0
}
