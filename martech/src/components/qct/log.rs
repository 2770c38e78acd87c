use crate::{error::Result, utils::time::LOG_TIMESTAMP};
use chrono::Utc;
use log::info;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// Text log kept for every QCT. Header lines are written as given, entries
/// carry a millisecond UTC timestamp.
pub struct QctLog {
    path: PathBuf,
    file: File,
}

impl QctLog {
    /// Create the log, replacing an existing file.
    ///
    /// * `path`: log file to write.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(&path)?;
        info!("QCT log {}", path.as_ref().display());
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            file,
        })
    }

    /// Open the log for appending, creating it when missing.
    ///
    /// * `path`: log file to write.
    pub fn append<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a line as is.
    pub fn header(&mut self, line: &str) -> Result<()> {
        writeln!(self.file, "{line}")?;
        Ok(())
    }

    /// Write a timestamped line.
    pub fn entry(&mut self, message: &str) -> Result<()> {
        let timestamp = Utc::now().format(LOG_TIMESTAMP);
        writeln!(self.file, "{timestamp}, {message}")?;
        Ok(())
    }

    /// Write an operator answer followed by what it confirms.
    ///
    /// * `answer`: the answer as typed.
    /// * `message`: what a yes means.
    pub fn answer(&mut self, answer: &str, message: &str) -> Result<()> {
        self.entry(&format!("{answer}, {message}"))
    }

    /// Flush buffered lines to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tests::scratch_dir;
    use regex::Regex;
    use std::fs;

    #[test]
    fn test_header_and_entries() {
        let path = scratch_dir("qct-log").join("QCT_LOG.txt");
        let mut log = QctLog::create(&path).unwrap();
        log.header("Profiler: WLP-007").unwrap();
        log.entry("Sensors on").unwrap();
        log.answer("y", "Pump off").unwrap();
        log.flush().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Profiler: WLP-007");
        let entry = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}, Sensors on$").unwrap();
        assert!(entry.is_match(lines[1]), "{}", lines[1]);
        assert!(lines[2].ends_with(", y, Pump off"));
    }

    #[test]
    fn test_append_keeps_existing_lines() {
        let path = scratch_dir("qct-log").join("SBM1187.txt");
        QctLog::create(&path).unwrap().header("first").unwrap();
        QctLog::append(&path).unwrap().header("second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
