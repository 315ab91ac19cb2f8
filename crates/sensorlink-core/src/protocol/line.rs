//! Line framing and decoding
//!
//! The board prints one reading per line:
//!
//! ```text
//! <temperature>,<ambient humidity>,<soil humidity>,<potentiometer>\n
//! ```
//!
//! Lines starting with `Error` are diagnostics from the firmware and never
//! reach the parser. Bytes are decoded as Latin-1, so any byte sequence yields
//! a string.

use super::{ParseError, ReadFault, ERROR_MARKER, MAX_LINE_LENGTH};
use crate::sample::Sample;

/// Number of comma-separated fields in a sample line
pub const FIELD_COUNT: usize = 4;

/// What a decoded line turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// A valid sensor reading
    Sample(Sample),
    /// A firmware diagnostic (`Error...`), discarded
    Diagnostic(String),
    /// A line the parser rejected, discarded
    Rejected(ParseError),
    /// Blank line, ignored
    Empty,
}

/// Decode raw bytes one byte per code point (ISO-8859-1). Never fails.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Parse a sample line into a [`Sample`]
///
/// The potentiometer field may be written as a float; it is truncated
/// toward zero and must fit in an `i64`.
pub fn parse_line(line: &str) -> Result<Sample, ParseError> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() != FIELD_COUNT {
        return Err(ParseError::FieldCount(parts.len()));
    }

    let mut values = [0.0f64; FIELD_COUNT];
    for (index, part) in parts.iter().enumerate() {
        let trimmed = part.trim();
        values[index] = trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ParseError::InvalidNumber {
                index,
                value: trimmed.to_string(),
            })?;
    }

    let pot = values[3].trunc();
    // i64::MAX as f64 rounds up to 2^63, one past the largest i64
    if !(-(i64::MAX as f64)..(i64::MAX as f64)).contains(&pot) {
        return Err(ParseError::InvalidNumber {
            index: 3,
            value: parts[3].trim().to_string(),
        });
    }

    Ok(Sample::new(values[0], values[1], values[2], pot as i64))
}

/// Decode and classify one raw line (terminator already removed)
pub fn classify(raw: &[u8]) -> Line {
    let text = decode_latin1(raw);
    let line = text.trim();
    if line.is_empty() {
        return Line::Empty;
    }
    if line.starts_with(ERROR_MARKER) {
        return Line::Diagnostic(line.to_string());
    }
    match parse_line(line) {
        Ok(sample) => Line::Sample(sample),
        Err(e) => Line::Rejected(e),
    }
}

/// Accumulates bytes across reads and yields complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Set once an overlong line was dropped; skip bytes until the next newline
    discarding: bool,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every line completed by it
    ///
    /// An overlong line is reported as [`ReadFault::Overflow`] in place of
    /// its content; the remainder up to the next newline is dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Vec<u8>, ReadFault>> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else {
                    lines.push(Ok(std::mem::take(&mut self.pending)));
                }
                continue;
            }
            if self.discarding {
                continue;
            }
            self.pending.push(byte);
            if self.pending.len() > MAX_LINE_LENGTH {
                self.pending.clear();
                self.discarding = true;
                lines.push(Err(ReadFault::Overflow {
                    limit: MAX_LINE_LENGTH,
                }));
            }
        }
        lines
    }

    /// Bytes waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop any partial line
    pub fn clear(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}
