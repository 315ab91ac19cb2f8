//! Data Logging
//!
//! Holds the bounded live history and the durable CSV record of every sample.

mod format;
mod recorder;

pub use format::{format_row, DurableLog, CSV_HEADER, DEFAULT_LOG_FILE};
pub use recorder::{ChartSnapshot, RollingWindow, DEFAULT_WINDOW_CAPACITY};

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::sample::Sample;

/// Errors from the durable log
#[derive(Error, Debug)]
pub enum DataLogError {
    #[error("Sample log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Recent history plus durable log
#[derive(Debug)]
pub struct DataStore {
    window: RollingWindow,
    log: DurableLog,
}

impl DataStore {
    /// Create a store keeping `capacity` samples in memory and logging to `log_path`
    pub fn new<P: AsRef<Path>>(capacity: usize, log_path: P) -> Result<Self, DataLogError> {
        Ok(Self {
            window: RollingWindow::new(capacity),
            log: DurableLog::open(log_path)?,
        })
    }

    /// Add a sample to the rolling window
    pub fn append(&mut self, sample: Sample) {
        self.window.push(sample);
    }

    /// Append a sample to the durable log
    pub fn persist(&self, sample: &Sample) -> Result<(), DataLogError> {
        self.log.persist(sample)
    }

    /// Append a sample to the durable log with an explicit timestamp
    pub fn persist_at(&self, sample: &Sample, timestamp: NaiveDateTime) -> Result<(), DataLogError> {
        self.log.persist_at(sample, timestamp)
    }

    /// Copy of the rolling window
    pub fn snapshot(&self) -> ChartSnapshot {
        self.window.snapshot()
    }

    /// Empty the rolling window; the log is untouched
    pub fn clear(&mut self) {
        self.window.clear();
    }

    /// Samples in the rolling window
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Check if the rolling window is empty
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// The rolling window
    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    /// The durable log
    pub fn log(&self) -> &DurableLog {
        &self.log
    }
}
