//! Audio output sessions.
//!
//! An [`AudioOutput`] owns a [`MediaClock`] and opens [`AudioSession`]s that
//! play a buffer from an offset. Playback and export both go through these
//! traits so that "at most one session at a time" can be checked with an
//! [`AudioSessionTracker`] regardless of the backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mawsooah_common::clock::{MediaClock, MonotonicClock};
use mawsooah_common::error::{MawsooahError, MawsooahResult};

use crate::decoder::PcmBuffer;
use crate::wav::WavWriter;

/// A single playing audio source.
pub trait AudioSession: Send {
    /// Position inside the source buffer, in seconds.
    fn position_secs(&self) -> f64;

    /// Stop playback and release the output. Idempotent.
    fn stop(&mut self);

    /// Whether the session still holds the output.
    fn is_active(&self) -> bool;
}

/// A device (or stand-in) that audio sessions play through.
pub trait AudioOutput: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// The clock this output plays against.
    fn clock(&self) -> Arc<dyn MediaClock>;

    /// Start playing `buffer` from `offset_secs`.
    fn open(
        &self,
        buffer: Arc<PcmBuffer>,
        offset_secs: f64,
    ) -> MawsooahResult<Box<dyn AudioSession>>;

    /// Tracker counting sessions opened through this output.
    fn tracker(&self) -> &AudioSessionTracker;
}

/// Destination for rendered samples.
pub trait AudioSink {
    fn write_samples(&mut self, samples: &[f32]) -> MawsooahResult<()>;
}

impl AudioSink for Vec<f32> {
    fn write_samples(&mut self, samples: &[f32]) -> MawsooahResult<()> {
        self.extend_from_slice(samples);
        Ok(())
    }
}

impl<W: std::io::Write + std::io::Seek> AudioSink for WavWriter<W> {
    fn write_samples(&mut self, samples: &[f32]) -> MawsooahResult<()> {
        self.write(samples)
            .map_err(|e| MawsooahError::export_encoding(format!("Failed writing audio: {e}")))
    }
}

#[derive(Debug, Default)]
struct TrackerCounts {
    opened: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Counts audio sessions: total opened, currently active, and the peak
/// number active at once.
#[derive(Debug, Clone, Default)]
pub struct AudioSessionTracker {
    counts: Arc<TrackerCounts>,
}

impl AudioSessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session. The returned lease releases it on drop.
    pub fn acquire(&self) -> SessionLease {
        self.counts.opened.fetch_add(1, Ordering::SeqCst);
        let active = self.counts.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counts.peak.fetch_max(active, Ordering::SeqCst);
        SessionLease {
            counts: Some(self.counts.clone()),
        }
    }

    /// Sessions opened over the tracker's lifetime.
    pub fn opened(&self) -> usize {
        self.counts.opened.load(Ordering::SeqCst)
    }

    /// Sessions currently holding the output.
    pub fn active(&self) -> usize {
        self.counts.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously active sessions.
    pub fn peak(&self) -> usize {
        self.counts.peak.load(Ordering::SeqCst)
    }
}

/// Proof that a session is registered with a tracker.
#[derive(Debug)]
pub struct SessionLease {
    counts: Option<Arc<TrackerCounts>>,
}

impl SessionLease {
    /// Release the lease early. Further calls do nothing.
    pub fn release(&mut self) {
        if let Some(counts) = self.counts.take() {
            counts.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn is_held(&self) -> bool {
        self.counts.is_some()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.release();
    }
}

/// Output that plays nothing but keeps time.
///
/// Used headless and in tests. Position advances with the output's clock,
/// exactly as a real device would.
pub struct SilentAudioOutput {
    clock: Arc<dyn MediaClock>,
    tracker: AudioSessionTracker,
}

impl SilentAudioOutput {
    pub fn new(clock: Arc<dyn MediaClock>) -> Self {
        Self {
            clock,
            tracker: AudioSessionTracker::new(),
        }
    }

    /// Silent output driven by a fresh monotonic clock.
    pub fn monotonic() -> Self {
        let clock = MonotonicClock::start();
        tracing::debug!(epoch = clock.epoch_wall(), "Silent output clock started");
        Self::new(Arc::new(clock))
    }

    /// Share an existing tracker.
    pub fn with_tracker(mut self, tracker: AudioSessionTracker) -> Self {
        self.tracker = tracker;
        self
    }
}

impl AudioOutput for SilentAudioOutput {
    fn name(&self) -> &str {
        "silent"
    }

    fn clock(&self) -> Arc<dyn MediaClock> {
        self.clock.clone()
    }

    fn open(
        &self,
        buffer: Arc<PcmBuffer>,
        offset_secs: f64,
    ) -> MawsooahResult<Box<dyn AudioSession>> {
        let duration = buffer.duration_secs();
        let offset = offset_secs.clamp(0.0, duration);
        tracing::debug!(offset, duration, "Opening silent audio session");
        Ok(Box::new(SilentSession {
            clock: self.clock.clone(),
            started_at: self.clock.now_secs(),
            offset,
            duration,
            stopped_at: None,
            lease: self.tracker.acquire(),
        }))
    }

    fn tracker(&self) -> &AudioSessionTracker {
        &self.tracker
    }
}

struct SilentSession {
    clock: Arc<dyn MediaClock>,
    started_at: f64,
    offset: f64,
    duration: f64,
    stopped_at: Option<f64>,
    lease: SessionLease,
}

impl SilentSession {
    fn position_at(&self, now: f64) -> f64 {
        (self.offset + (now - self.started_at).max(0.0)).min(self.duration)
    }
}

impl AudioSession for SilentSession {
    fn position_secs(&self) -> f64 {
        match self.stopped_at {
            Some(position) => position,
            None => self.position_at(self.clock.now_secs()),
        }
    }

    fn stop(&mut self) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(self.position_at(self.clock.now_secs()));
        }
        self.lease.release();
    }

    fn is_active(&self) -> bool {
        self.lease.is_held()
    }
}
