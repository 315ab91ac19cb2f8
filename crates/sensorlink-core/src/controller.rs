//! System controller
//!
//! Ties the serial link to the data store and defines what the presentation
//! layer is told about each sample. For every parsed sample, on the link's
//! dispatch thread:
//!
//! 1. the sample is appended to the rolling window,
//! 2. the sample is appended to the durable log,
//! 3. subscribers are notified in fixed order: values, chart snapshot, log line.
//!
//! A log write failure is logged and does not stop the notifications.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};

use chrono::{Local, NaiveTime};
use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::datalog::{ChartSnapshot, DataLogError, DataStore};
use crate::protocol::{
    list_ports, ActuatorCommand, ConnectError, ConnectionState, LinkStats, PortInfo,
    SensorChannel, SerialLink,
};
use crate::sample::Sample;

type ValuesHandler = Arc<dyn Fn(&Sample) + Send + Sync>;
type SnapshotHandler = Arc<dyn Fn(&ChartSnapshot) + Send + Sync>;
type LineHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default, Clone)]
struct UiHandlers {
    values_updated: Option<ValuesHandler>,
    chart_snapshot: Option<SnapshotHandler>,
    log_line: Option<LineHandler>,
}

/// Coordinates the serial link and the data store
pub struct Controller {
    link: SerialLink,
    store: Arc<Mutex<DataStore>>,
    ui: Arc<RwLock<UiHandlers>>,
}

impl Controller {
    /// Create a controller from its parts
    pub fn new(link: SerialLink, store: DataStore) -> Self {
        Self {
            link,
            store: Arc::new(Mutex::new(store)),
            ui: Arc::new(RwLock::new(UiHandlers::default())),
        }
    }

    /// Build link and store from configuration (creates the log file if needed)
    pub fn from_config(config: &MonitorConfig) -> Result<Self, DataLogError> {
        let store = DataStore::new(config.window_capacity, &config.log_path)?;
        Ok(Self::new(SerialLink::new(config.link_config()), store))
    }

    /// Route parsed samples from the link into the store and subscribers
    pub fn initialize(&self) {
        let store = Arc::clone(&self.store);
        let ui = Arc::clone(&self.ui);
        self.link
            .on_data_received(move |sample| handle_sample(&store, &ui, sample));
    }

    // ---- connection pass-through ----

    /// Connect to a serial port
    pub fn connect(&self, port: &str) -> Result<(), ConnectError> {
        self.link.connect(port)
    }

    /// Connect to an already-open channel (demo board, capture replay)
    pub fn connect_channel(
        &self,
        name: &str,
        channel: Box<dyn SensorChannel>,
    ) -> Result<(), ConnectError> {
        self.link.connect_channel(name, channel)
    }

    /// Disconnect; no-op when not connected
    pub fn disconnect(&self) {
        self.link.disconnect();
    }

    /// Switch the actuator on. False if not connected or the write failed.
    pub fn send_actuator_on(&self) -> bool {
        self.send_actuator(ActuatorCommand::On)
    }

    /// Switch the actuator off. False if not connected or the write failed.
    pub fn send_actuator_off(&self) -> bool {
        self.send_actuator(ActuatorCommand::Off)
    }

    /// Send an actuator command
    pub fn send_actuator(&self, command: ActuatorCommand) -> bool {
        let sent = self.link.send_command(&[command.byte()]);
        if sent {
            info!("Actuator {:?}", command);
        }
        sent
    }

    /// True while the port is open
    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// Ingestion counters for the current connection
    pub fn stats(&self) -> LinkStats {
        self.link.stats()
    }

    /// Name of the connected port
    pub fn port_name(&self) -> Option<String> {
        self.link.port_name()
    }

    /// List available serial ports
    pub fn list_ports() -> Vec<PortInfo> {
        list_ports()
    }

    // ---- data queries ----

    fn lock_store(&self) -> MutexGuard<'_, DataStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the rolling window
    pub fn snapshot(&self) -> ChartSnapshot {
        self.lock_store().snapshot()
    }

    /// Empty the rolling window (the durable log is kept)
    pub fn clear_history(&self) {
        self.lock_store().clear();
    }

    /// Data rows of the durable log
    pub fn log_rows(&self) -> Result<Vec<String>, DataLogError> {
        self.lock_store().log().rows()
    }

    // ---- subscriber registration (last registration wins) ----

    fn ui_mut(&self) -> RwLockWriteGuard<'_, UiHandlers> {
        self.ui.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest values, first notification per sample
    pub fn on_values_updated<F>(&self, handler: F)
    where
        F: Fn(&Sample) + Send + Sync + 'static,
    {
        self.ui_mut().values_updated = Some(Arc::new(handler));
    }

    /// Full rolling-window snapshot, second notification per sample
    pub fn on_chart_snapshot<F>(&self, handler: F)
    where
        F: Fn(&ChartSnapshot) + Send + Sync + 'static,
    {
        self.ui_mut().chart_snapshot = Some(Arc::new(handler));
    }

    /// Formatted console line, third notification per sample
    pub fn on_log_line<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.ui_mut().log_line = Some(Arc::new(handler));
    }

    /// Port opened and reader running
    pub fn on_connect_success<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.link.on_connect_success(handler);
    }

    /// Port could not be opened
    pub fn on_connect_error<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.link.on_connect_error(handler);
    }

    /// Explicit disconnect completed
    pub fn on_disconnected<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.link.on_disconnected(handler);
    }
}

fn handle_sample(store: &Mutex<DataStore>, ui: &RwLock<UiHandlers>, sample: Sample) {
    let snapshot = {
        let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
        store.append(sample);
        if let Err(e) = store.persist(&sample) {
            warn!("{e}");
        }
        store.snapshot()
    };

    let handlers = ui.read().unwrap_or_else(PoisonError::into_inner).clone();
    if let Some(handler) = handlers.values_updated {
        handler(&sample);
    }
    if let Some(handler) = handlers.chart_snapshot {
        handler(&snapshot);
    }
    if let Some(handler) = handlers.log_line {
        handler(&format_log_line(&sample, Local::now().time()));
    }
}

/// Console line for a sample: `[HH:MM:SS] T:23.5°C | Amb:60.2% | Soil:45.0% | Pot:512`
pub fn format_log_line(sample: &Sample, time: NaiveTime) -> String {
    format!(
        "[{}] T:{:.1}°C | Amb:{:.1}% | Soil:{:.1}% | Pot:{}",
        time.format("%H:%M:%S"),
        sample.temperature,
        sample.ambient_humidity,
        sample.soil_humidity,
        sample.potentiometer
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_log_line() {
        let time = NaiveTime::from_hms_opt(14, 3, 9).unwrap();
        let line = format_log_line(&Sample::new(23.46, 60.24, 45.0, 512), time);
        assert_eq!(line, "[14:03:09] T:23.5°C | Amb:60.2% | Soil:45.0% | Pot:512");
    }
}
