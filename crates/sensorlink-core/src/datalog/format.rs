//! Durable CSV log
//!
//! Every sample is appended as one row. The header is written only when the
//! file does not exist yet; an existing file is never truncated.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

use super::DataLogError;
use crate::sample::Sample;

/// Default log file name
pub const DEFAULT_LOG_FILE: &str = "sensor_data.csv";

/// Column names, in row order
pub const CSV_HEADER: [&str; 6] = [
    "Date",
    "Time",
    "Temperature_C",
    "Ambient_Humidity_%",
    "Soil_Humidity_%",
    "Potentiometer_ADC",
];

/// Append-only CSV log of every sample
#[derive(Debug, Clone)]
pub struct DurableLog {
    path: PathBuf,
}

impl DurableLog {
    /// Open (creating with a header if missing) the log at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DataLogError> {
        let log = Self {
            path: path.as_ref().to_path_buf(),
        };
        log.ensure_header()?;
        Ok(log)
    }

    /// Location of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> DataLogError {
        DataLogError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Create the file with a header row if it does not exist. Returns true if created.
    fn ensure_header(&self) -> Result<bool, DataLogError> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(self.io_err(e)),
        };
        writeln!(file, "{}", CSV_HEADER.join(",")).map_err(|e| self.io_err(e))?;
        tracing::info!("Created sample log {}", self.path.display());
        Ok(true)
    }

    /// Append a row stamped with the local wall-clock time
    pub fn persist(&self, sample: &Sample) -> Result<(), DataLogError> {
        self.persist_at(sample, Local::now().naive_local())
    }

    /// Append a row with an explicit timestamp
    pub fn persist_at(&self, sample: &Sample, timestamp: NaiveDateTime) -> Result<(), DataLogError> {
        // Evaluated per row: a log deleted while running comes back with a header
        self.ensure_header()?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        writeln!(file, "{}", format_row(sample, timestamp)).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    /// Data rows (header excluded), oldest first
    pub fn rows(&self) -> Result<Vec<String>, DataLogError> {
        let file = File::open(&self.path).map_err(|e| self.io_err(e))?;
        let mut rows = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io_err(e))?;
            if i == 0 || line.is_empty() {
                continue;
            }
            rows.push(line);
        }
        Ok(rows)
    }
}

/// Format one CSV row: date, time, two-decimal readings, integer ADC code
pub fn format_row(sample: &Sample, timestamp: NaiveDateTime) -> String {
    format!(
        "{},{},{:.2},{:.2},{:.2},{}",
        timestamp.format("%Y-%m-%d"),
        timestamp.format("%H:%M:%S"),
        sample.temperature,
        sample.ambient_humidity,
        sample.soil_humidity,
        sample.potentiometer
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_format_row() {
        let row = format_row(&Sample::new(23.5, 60.234, 45.0, 512), at(7, 5, 3));
        assert_eq!(row, "2024-03-09,07:05:03,23.50,60.23,45.00,512");
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let log = DurableLog::open(&path).unwrap();
        log.persist_at(&Sample::new(1.0, 2.0, 3.0, 4), at(1, 0, 0)).unwrap();

        // Reopen as a fresh process would
        let log = DurableLog::open(&path).unwrap();
        log.persist_at(&Sample::new(5.0, 6.0, 7.0, 8), at(2, 0, 0)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header = CSV_HEADER.join(",");
        assert_eq!(content.matches(&header).count(), 1);
        assert!(content.starts_with(&header));
        assert_eq!(log.rows().unwrap().len(), 2);
    }

    #[test]
    fn test_existing_file_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, "legacy content\n").unwrap();

        let log = DurableLog::open(&path).unwrap();
        log.persist_at(&Sample::new(1.0, 2.0, 3.0, 4), at(1, 0, 0)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("legacy content\n"));
        assert!(!content.contains("Date,Time"));
    }

    #[test]
    fn test_size_never_decreases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let log = DurableLog::open(&path).unwrap();

        let mut last = std::fs::metadata(&path).unwrap().len();
        for n in 0..20 {
            log.persist_at(&Sample::new(n as f64, 0.0, 0.0, n), at(3, 0, n as u32))
                .unwrap();
            let size = std::fs::metadata(&path).unwrap().len();
            assert!(size > last);
            last = size;
        }
    }

    #[test]
    fn test_deleted_log_recreated_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let log = DurableLog::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        log.persist_at(&Sample::new(1.0, 2.0, 3.0, 4), at(1, 0, 0)).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Date,Time,"));
        assert_eq!(log.rows().unwrap().len(), 1);
    }

    #[test]
    fn test_open_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("log.csv");
        assert!(matches!(DurableLog::open(&path), Err(DataLogError::Io { .. })));
    }
}
