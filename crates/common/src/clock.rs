//! Clock and timing utilities for audio/video synchronization.
//!
//! Playback and export never read wall-clock time directly. They read a
//! [`MediaClock`], which is either a monotonic clock anchored at creation
//! (live audio output) or a manually advanced clock (offline rendering and
//! tests). This module provides:
//! - The clock abstraction and its two implementations
//! - Frame pacing for the live render loop
//! - Drift measurement between the audio and video streams

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// A source of media time in seconds.
///
/// Values are non-decreasing for the lifetime of the clock.
pub trait MediaClock: Send + Sync {
    /// Seconds elapsed since the clock's epoch.
    fn now_secs(&self) -> f64;
}

/// A monotonic clock anchored to the moment it was created.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    /// The instant the clock started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl MonotonicClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Wall-clock time at epoch.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Convert seconds to nanoseconds.
    pub fn secs_to_ns(secs: f64) -> u64 {
        (secs * 1_000_000_000.0) as u64
    }
}

impl MediaClock for MonotonicClock {
    fn now_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the underlying time, so a test can hold one handle and
/// advance it while the engine under test reads another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `secs`. Negative values are ignored.
    pub fn advance(&self, secs: f64) {
        if secs <= 0.0 || !secs.is_finite() {
            return;
        }
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += secs;
    }

    /// Jump to an absolute time. Moving backwards is ignored.
    pub fn set(&self, secs: f64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if secs > *now {
            *now = secs;
        }
    }
}

impl MediaClock for ManualClock {
    fn now_secs(&self) -> f64 {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drift measurement between two streams.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Timestamp in the reference stream (ns).
    pub reference_ns: u64,
    /// Timestamp in the measured stream (ns).
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Build a measurement from two timestamps in seconds.
    pub fn from_secs(reference_secs: f64, measured_secs: f64) -> Self {
        Self {
            reference_ns: MonotonicClock::secs_to_ns(reference_secs.max(0.0)),
            measured_ns: MonotonicClock::secs_to_ns(measured_secs.max(0.0)),
        }
    }

    /// Drift in nanoseconds (positive = measured is ahead).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

/// Frame interval for the live render loop.
#[derive(Debug, Clone, Copy)]
pub struct RateController {
    target_interval_ns: u64,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_hz.max(1) as u64,
        }
    }

    /// Target interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.target_interval_ns
    }

    /// Target interval as a `Duration`.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.target_interval_ns)
    }
}
