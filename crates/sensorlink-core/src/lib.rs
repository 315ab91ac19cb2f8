//! # SensorLink Core Library
//!
//! Ingestion pipeline for an ESP32 sensor board reporting temperature,
//! ambient humidity, soil humidity and a potentiometer over a serial line.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial link lifecycle with a background reader and dispatch thread
//! - Line decoding and parsing of `temp,ambient,soil,pot` readings
//! - A bounded rolling window for live charts
//! - An append-only CSV log of every sample
//! - A controller fanning samples out to presentation subscribers
//! - A simulated board for running without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use sensorlink_core::{config::MonitorConfig, controller::Controller};
//!
//! let controller = Controller::from_config(&MonitorConfig::default())?;
//! controller.initialize();
//! controller.on_log_line(|line| println!("{line}"));
//! controller.connect("/dev/ttyUSB0")?;
//! controller.send_actuator_on();
//! ```

pub mod config;
pub mod controller;
pub mod datalog;
pub mod demo;
pub mod protocol;
pub mod sample;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::MonitorConfig;
    pub use crate::controller::Controller;
    pub use crate::datalog::{ChartSnapshot, DataStore, DurableLog, RollingWindow};
    pub use crate::protocol::{ConnectError, ConnectionState, LinkConfig, SerialLink};
    pub use crate::sample::Sample;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
