//! Rolling window
//!
//! Keeps the most recent samples for live charts.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::sample::Sample;

/// Default number of samples kept for charts
pub const DEFAULT_WINDOW_CAPACITY: usize = 50;

/// Fixed-capacity FIFO of recent samples
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl RollingWindow {
    /// Create an empty window. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Push a sample, evicting the oldest when over capacity
    pub fn push(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Maximum number of samples retained
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the window is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Samples oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Remove all samples
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Copy the window into parallel series
    pub fn snapshot(&self) -> ChartSnapshot {
        let len = self.samples.len();
        let mut snap = ChartSnapshot {
            index: (0..len).collect(),
            temperatures: Vec::with_capacity(len),
            ambient_humidities: Vec::with_capacity(len),
            soil_humidities: Vec::with_capacity(len),
            potentiometers: Vec::with_capacity(len),
        };
        for s in &self.samples {
            snap.temperatures.push(s.temperature);
            snap.ambient_humidities.push(s.ambient_humidity);
            snap.soil_humidities.push(s.soil_humidity);
            snap.potentiometers.push(s.potentiometer);
        }
        snap
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

/// Point-in-time copy of the rolling window as chart series
///
/// `index` is the sample ordinal (0 = oldest retained), not a timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSnapshot {
    /// Ordinals 0..len
    pub index: Vec<usize>,
    /// °C
    pub temperatures: Vec<f64>,
    /// %
    pub ambient_humidities: Vec<f64>,
    /// %
    pub soil_humidities: Vec<f64>,
    /// ADC codes
    pub potentiometers: Vec<i64>,
}

impl ChartSnapshot {
    /// Number of points in every series
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the snapshot holds no points
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Newest point as a sample
    pub fn latest(&self) -> Option<Sample> {
        let i = self.len().checked_sub(1)?;
        Some(Sample::new(
            self.temperatures[i],
            self.ambient_humidities[i],
            self.soil_humidities[i],
            self.potentiometers[i],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(n: i64) -> Sample {
        Sample::new(n as f64, n as f64 + 0.5, n as f64 + 0.25, n)
    }

    #[test]
    fn test_window_under_capacity() {
        let mut window = RollingWindow::new(5);
        for n in 0..3 {
            window.push(sample(n));
        }
        let snap = window.snapshot();
        assert_eq!(snap.index, vec![0, 1, 2]);
        assert_eq!(snap.potentiometers, vec![0, 1, 2]);
    }

    #[test]
    fn test_window_keeps_last_n() {
        let capacity = DEFAULT_WINDOW_CAPACITY;
        for extra in [0usize, 1, 7, 120] {
            let mut window = RollingWindow::default();
            let total = capacity + extra;
            for n in 0..total as i64 {
                window.push(sample(n));
                assert!(window.len() <= capacity);
            }
            let snap = window.snapshot();
            let expected: Vec<i64> = (extra as i64..total as i64).collect();
            assert_eq!(snap.potentiometers, expected);
            assert_eq!(snap.index, (0..capacity).collect::<Vec<_>>());
            assert_eq!(snap.temperatures[0], extra as f64);
        }
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut window = RollingWindow::new(3);
        window.push(sample(1));
        let snap = window.snapshot();
        window.push(sample(2));
        window.clear();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.latest(), Some(sample(1)));
        assert!(window.is_empty());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut window = RollingWindow::new(0);
        window.push(sample(1));
        window.push(sample(2));
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.latest(), Some(&sample(2)));
    }
}
