//! Offline audio rendering for export.
//!
//! The export loop is timed by this session's sample cursor instead of a
//! wall clock: each video frame advances the cursor by an exact number of
//! samples, so audio and video cannot drift apart.

use std::sync::Arc;

use mawsooah_common::error::MawsooahResult;

use crate::decoder::PcmBuffer;
use crate::session::{AudioSession, AudioSessionTracker, AudioSink, SessionLease};

/// Plays a buffer into an [`AudioSink`] as fast as it is asked to.
pub struct OfflineAudioSession {
    buffer: Arc<PcmBuffer>,
    cursor: usize,
    lease: SessionLease,
}

impl OfflineAudioSession {
    /// Open a session at the start of `buffer`.
    pub fn open(buffer: Arc<PcmBuffer>, tracker: &AudioSessionTracker) -> Self {
        Self {
            buffer,
            cursor: 0,
            lease: tracker.acquire(),
        }
    }

    /// Samples rendered so far.
    pub fn position_samples(&self) -> usize {
        self.cursor
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    pub fn total_samples(&self) -> usize {
        self.buffer.len()
    }

    pub fn duration_secs(&self) -> f64 {
        self.buffer.duration_secs()
    }

    /// Whether every sample has been rendered.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.buffer.len()
    }

    /// Render samples up to (exclusive) `target`, clamped to the buffer.
    ///
    /// Returns how many samples were written. A target behind the cursor
    /// writes nothing.
    pub fn render_until(
        &mut self,
        target: usize,
        sink: &mut dyn AudioSink,
    ) -> MawsooahResult<usize> {
        let target = target.min(self.buffer.len());
        if target <= self.cursor || !self.lease.is_held() {
            return Ok(0);
        }
        sink.write_samples(&self.buffer.samples()[self.cursor..target])?;
        let written = target - self.cursor;
        self.cursor = target;
        Ok(written)
    }

    /// Render everything that is left.
    pub fn drain(&mut self, sink: &mut dyn AudioSink) -> MawsooahResult<usize> {
        self.render_until(self.buffer.len(), sink)
    }
}

impl AudioSession for OfflineAudioSession {
    fn position_secs(&self) -> f64 {
        self.cursor as f64 / self.buffer.sample_rate() as f64
    }

    fn stop(&mut self) {
        self.lease.release();
    }

    fn is_active(&self) -> bool {
        self.lease.is_held()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Arc<PcmBuffer> {
        Arc::new(PcmBuffer::new(
            (0..len).map(|i| i as f32 / len as f32).collect(),
            24_000,
        ))
    }

    #[test]
    fn test_render_until_advances_cursor() {
        let tracker = AudioSessionTracker::new();
        let mut session = OfflineAudioSession::open(ramp(1000), &tracker);
        let mut sink = Vec::new();

        assert_eq!(session.render_until(400, &mut sink).unwrap(), 400);
        assert_eq!(session.render_until(300, &mut sink).unwrap(), 0);
        assert_eq!(session.render_until(5000, &mut sink).unwrap(), 600);
        assert!(session.is_finished());
        assert_eq!(sink.len(), 1000);
        assert_eq!(sink[..], ramp(1000).samples()[..]);
    }

    #[test]
    fn test_position_is_sample_exact() {
        let tracker = AudioSessionTracker::new();
        let mut session = OfflineAudioSession::open(ramp(48_000), &tracker);
        session.render_until(12_000, &mut Vec::new()).unwrap();
        assert_eq!(session.position_secs(), 0.5);
    }

    #[test]
    fn test_stop_releases_and_halts() {
        let tracker = AudioSessionTracker::new();
        let mut session = OfflineAudioSession::open(ramp(100), &tracker);
        assert_eq!(tracker.active(), 1);
        session.stop();
        assert_eq!(tracker.active(), 0);
        assert_eq!(session.drain(&mut Vec::new()).unwrap(), 0);
    }
}
