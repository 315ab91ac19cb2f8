//! Demo Mode - Simulated sensor board for running without hardware
//!
//! [`BoardSimulator`] produces plausible greenhouse readings: a slow daily
//! temperature swing, ambient humidity that moves against it, and soil that
//! dries out until the actuator (a pump) is switched on.
//!
//! [`DemoBoard`] wraps the simulator in a [`SensorChannel`] that prints one
//! line per period, exactly as the firmware would. [`ReplayChannel`] feeds
//! captured serial bytes instead.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::protocol::{ActuatorCommand, SensorChannel};
use crate::sample::Sample;

/// Default interval between demo readings
pub const DEMO_PERIOD_MS: u64 = 1500;

/// Roughly one line in this many is a firmware diagnostic
const DIAGNOSTIC_ODDS: u32 = 40;

/// Sensor board simulator
pub struct BoardSimulator {
    /// Soil moisture state (integrates pump and evaporation)
    soil: f64,
    /// Potentiometer position as a random walk
    pot: f64,
    /// Whether the pump is running
    actuator_on: bool,
    /// Last update time (ms)
    last_update_ms: Option<u64>,
    rng: StdRng,
}

impl Default for BoardSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardSimulator {
    /// Create a simulator seeded from entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a deterministic simulator
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            soil: 55.0,
            pot: 2048.0,
            actuator_on: false,
            last_update_ms: None,
            rng,
        }
    }

    /// Switch the simulated pump
    pub fn set_actuator(&mut self, on: bool) {
        self.actuator_on = on;
    }

    /// Whether the simulated pump is running
    pub fn actuator_on(&self) -> bool {
        self.actuator_on
    }

    /// Advance the simulation and produce a reading
    ///
    /// `elapsed_ms` is the time since the board started.
    pub fn update(&mut self, elapsed_ms: u64) -> Sample {
        let delta_s = self
            .last_update_ms
            .map(|last| elapsed_ms.saturating_sub(last) as f64 / 1000.0)
            .unwrap_or(0.0);
        self.last_update_ms = Some(elapsed_ms);

        let t = elapsed_ms as f64 / 1000.0;

        // One "day" every ten minutes keeps the demo lively
        let temperature = 24.0 + 4.0 * (t / 95.0).sin() + self.rng.gen_range(-0.2..0.2);
        let ambient = (60.0 - 2.5 * (temperature - 24.0) + self.rng.gen_range(-0.5..0.5))
            .clamp(0.0, 100.0);

        let rate = if self.actuator_on { 2.0 } else { -0.15 };
        self.soil = (self.soil + rate * delta_s).clamp(5.0, 95.0);
        let soil = (self.soil + self.rng.gen_range(-0.3..0.3)).clamp(0.0, 100.0);

        self.pot = (self.pot + self.rng.gen_range(-40.0..40.0)).clamp(0.0, 4095.0);

        Sample::new(temperature, ambient, soil, self.pot as i64)
    }

    /// Format a reading the way the firmware prints it
    pub fn format_line(sample: &Sample) -> String {
        format!(
            "{:.1},{:.1},{:.1},{}\r\n",
            sample.temperature, sample.ambient_humidity, sample.soil_humidity, sample.potentiometer
        )
    }
}

struct DemoState {
    simulator: BoardSimulator,
    started: Instant,
    next_line_at: Instant,
    period: Duration,
    output: VecDeque<u8>,
}

/// Simulated board exposed as a serial channel
#[derive(Clone)]
pub struct DemoBoard {
    state: Arc<Mutex<DemoState>>,
}

impl DemoBoard {
    /// Create a board printing one reading every `period`
    pub fn new(period: Duration) -> Self {
        Self::with_simulator(BoardSimulator::new(), period)
    }

    /// Create a board around an existing simulator
    pub fn with_simulator(simulator: BoardSimulator, period: Duration) -> Self {
        let now = Instant::now();
        Self {
            state: Arc::new(Mutex::new(DemoState {
                simulator,
                started: now,
                next_line_at: now,
                period,
                output: VecDeque::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DemoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the simulated pump is running
    pub fn actuator_on(&self) -> bool {
        self.lock().simulator.actuator_on()
    }

    /// Emit every line that is due
    fn tick(state: &mut DemoState) {
        let now = Instant::now();
        while state.next_line_at <= now {
            let elapsed_ms = state.next_line_at.duration_since(state.started).as_millis() as u64;
            let line = if state.simulator.rng.gen_ratio(1, DIAGNOSTIC_ODDS) {
                "Error: failed to read from DHT sensor!\r\n".to_string()
            } else {
                let sample = state.simulator.update(elapsed_ms);
                BoardSimulator::format_line(&sample)
            };
            state.output.extend(line.bytes());
            state.next_line_at += state.period.max(Duration::from_millis(1));
        }
    }
}

impl Default for DemoBoard {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEMO_PERIOD_MS))
    }
}

impl Read for DemoBoard {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        Self::tick(&mut state);
        let n = buf.len().min(state.output.len());
        for (slot, byte) in buf.iter_mut().zip(state.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for DemoBoard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        for &byte in buf {
            match ActuatorCommand::from_byte(byte) {
                Some(ActuatorCommand::On) => state.simulator.set_actuator(true),
                Some(ActuatorCommand::Off) => state.simulator.set_actuator(false),
                None => {}
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SensorChannel for DemoBoard {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let mut state = self.lock();
        Self::tick(&mut state);
        Ok(state.output.len() as u32)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.lock().output.clear();
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn SensorChannel>> {
        Ok(Box::new(self.clone()))
    }
}

#[derive(Default)]
struct ReplayState {
    input: VecDeque<u8>,
    written: Vec<u8>,
    pending_faults: u32,
}

/// Channel that plays back bytes pushed into it, e.g. a captured serial dump
#[derive(Clone, Default)]
pub struct ReplayChannel {
    state: Arc<Mutex<ReplayState>>,
}

/// Control handle for a [`ReplayChannel`] that stays usable after the channel is attached
#[derive(Clone)]
pub struct ReplayHandle {
    state: Arc<Mutex<ReplayState>>,
}

impl ReplayChannel {
    /// Create an empty channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a channel preloaded with a capture
    pub fn from_capture(bytes: &[u8]) -> (Self, ReplayHandle) {
        let channel = Self::new();
        let handle = channel.handle();
        handle.push(bytes);
        (channel, handle)
    }

    /// Get a control handle
    pub fn handle(&self) -> ReplayHandle {
        ReplayHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReplayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReplayHandle {
    fn lock(&self) -> MutexGuard<'_, ReplayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make bytes available to the reader
    pub fn push(&self, bytes: &[u8]) {
        self.lock().input.extend(bytes.iter().copied());
    }

    /// Everything written to the channel so far
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    /// Bytes not yet consumed by the reader
    pub fn remaining(&self) -> usize {
        self.lock().input.len()
    }

    /// Make the next `count` availability checks fail with an I/O error
    pub fn inject_faults(&self, count: u32) {
        self.lock().pending_faults += count;
    }
}

impl Read for ReplayChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        let n = buf.len().min(state.input.len());
        for (slot, byte) in buf.iter_mut().zip(state.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for ReplayChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SensorChannel for ReplayChannel {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let mut state = self.lock();
        if state.pending_faults > 0 {
            state.pending_faults -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected fault"));
        }
        Ok(state.input.len() as u32)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        // A capture has no boot noise to discard
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn SensorChannel>> {
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::line::parse_line;

    #[test]
    fn test_simulator_ranges() {
        let mut sim = BoardSimulator::seeded(7);
        for ms in (0..600_000).step_by(1500) {
            let s = sim.update(ms);
            assert!((15.0..35.0).contains(&s.temperature), "temperature {}", s.temperature);
            assert!((0.0..=100.0).contains(&s.ambient_humidity));
            assert!((0.0..=100.0).contains(&s.soil_humidity));
            assert!((0..=4095).contains(&s.potentiometer));
        }
    }

    #[test]
    fn test_pump_raises_soil_moisture() {
        let mut sim = BoardSimulator::seeded(1);
        sim.update(0);
        let dry = sim.update(60_000).soil_humidity;
        sim.set_actuator(true);
        let wet = sim.update(80_000).soil_humidity;
        assert!(wet > dry + 20.0, "soil {} -> {}", dry, wet);
    }

    #[test]
    fn test_format_line_parses() {
        let mut sim = BoardSimulator::seeded(3);
        let sample = sim.update(0);
        let line = BoardSimulator::format_line(&sample);
        let parsed = parse_line(line.trim()).unwrap();
        assert_eq!(parsed.potentiometer, sample.potentiometer);
        assert!((parsed.temperature - sample.temperature).abs() < 0.051);
    }

    #[test]
    fn test_demo_board_actuator_command() {
        let mut board = DemoBoard::default();
        board.write_all(&[ActuatorCommand::On.byte()]).unwrap();
        assert!(board.actuator_on());
        board.write_all(&[ActuatorCommand::Off.byte()]).unwrap();
        assert!(!board.actuator_on());
    }

    #[test]
    fn test_demo_board_emits_first_line_immediately() {
        let mut board = DemoBoard::default();
        assert!(board.bytes_to_read().unwrap() > 0);
    }

    #[test]
    fn test_replay_channel_records_writes() {
        let mut channel = ReplayChannel::new();
        let handle = channel.handle();
        handle.push(b"abc");
        let mut buf = [0u8; 8];
        assert_eq!(channel.read(&mut buf).unwrap(), 3);
        channel.write_all(b"1").unwrap();
        assert_eq!(handle.written(), b"1");
        assert_eq!(handle.remaining(), 0);
    }
}
