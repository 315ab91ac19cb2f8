//! Sensor sample
//!
//! One reading from the sensor board, as decoded from a single serial line.

use serde::{Deserialize, Serialize};

/// A single sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Air temperature in °C
    pub temperature: f64,
    /// Relative ambient humidity in %
    pub ambient_humidity: f64,
    /// Soil moisture in %
    pub soil_humidity: f64,
    /// Raw potentiometer ADC code
    pub potentiometer: i64,
}

impl Sample {
    /// Create a new sample
    pub fn new(temperature: f64, ambient_humidity: f64, soil_humidity: f64, potentiometer: i64) -> Self {
        Self {
            temperature,
            ambient_humidity,
            soil_humidity,
            potentiometer,
        }
    }
}
