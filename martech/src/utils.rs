/// Reading and writing YAML configuration files.
pub mod yaml;
/// Timestamp formats used in log files and device commands.
pub mod time;
/// Ctrl-c handling for long running procedures.
pub mod signal;
/// Scripted serial link for exercising drivers without hardware.
#[cfg(test)]
pub mod tests;
