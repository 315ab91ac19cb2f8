//! Protocol errors

use thiserror::Error;

/// Errors returned when establishing a connection
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Could not open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    #[error("Could not configure port {port}: {reason}")]
    ConfigureFailed { port: String, reason: String },

    #[error("Already connected to {0}, disconnect first")]
    AlreadyConnected(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Faults raised inside the reader loop
///
/// None of these end the loop; they are logged and polling resumes.
#[derive(Error, Debug)]
pub enum ReadFault {
    #[error("Read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line exceeded {limit} bytes without a terminator")]
    Overflow { limit: usize },
}

/// Reasons a decoded line was rejected by the parser
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Expected 4 fields, got {0}")]
    FieldCount(usize),

    #[error("Field {index} is not a number: '{value}'")]
    InvalidNumber { index: usize, value: String },
}
