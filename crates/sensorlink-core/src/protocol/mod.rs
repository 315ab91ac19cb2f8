//! Serial Protocol Communication
//!
//! Implements the newline-delimited text protocol spoken by the sensor board:
//! one CSV reading per line inbound, single-byte actuator commands outbound.

pub mod commands;
mod error;
mod link;
pub mod line;
pub mod serial;
mod stream;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use commands::ActuatorCommand;
pub use error::{ConnectError, ParseError, ReadFault};
pub use link::SerialLink;
pub use serial::{configure_port, list_ports, open_port, PortInfo};
pub use stream::{SensorChannel, SerialChannel};

/// Default baud rate of the sensor board firmware
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default serial read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Time the board needs after the port opens (DTR toggle resets it) before output is trustworthy
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;

/// Reader poll interval; bounds how long a disconnect waits for the reader
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Samples buffered between the reader and the dispatch thread
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Longest accepted line, terminator excluded
pub const MAX_LINE_LENGTH: usize = 1024;

/// Prefix of firmware diagnostic lines
pub const ERROR_MARKER: &str = "Error";

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Port open, waiting for the board to settle
    Connecting,
    /// Connected and reading
    Connected,
}

/// Link configuration
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Per-read timeout
    pub read_timeout: Duration,
    /// Wait after opening before the reader starts
    pub settle_delay: Duration,
    /// Sleep between polls when no input is waiting
    pub poll_interval: Duration,
    /// Capacity of the reader → dispatch queue
    pub queue_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Ingestion counters for the current connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    /// Complete lines seen, of any kind
    pub lines_received: u64,
    /// Lines parsed into samples
    pub samples_parsed: u64,
    /// Lines the parser rejected
    pub lines_rejected: u64,
    /// `Error...` diagnostic lines from the firmware
    pub error_lines: u64,
    /// Transient read faults and overlong lines
    pub read_faults: u64,
    /// Samples dropped because the dispatch queue was full
    pub samples_dropped: u64,
}
