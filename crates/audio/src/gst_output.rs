//! Live audio output through a GStreamer sink.
//!
//! The buffer is written to a temporary WAV file once per buffer and played
//! with `filesrc ! wavparse ! audioconvert ! audioresample ! autoaudiosink`.

use std::sync::{Arc, OnceLock};

use gst::prelude::*;
use gstreamer as gst;

use mawsooah_common::clock::{MediaClock, MonotonicClock};
use mawsooah_common::error::{MawsooahError, MawsooahResult};

use crate::decoder::PcmBuffer;
use crate::session::{AudioOutput, AudioSession, AudioSessionTracker, SessionLease};
use crate::wav::TempWavCache;

fn init_gstreamer() -> MawsooahResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(MawsooahError::playback(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

fn escape_path(path: &std::path::Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}

/// Plays sessions through the default system audio sink.
pub struct GstAudioOutput {
    clock: Arc<MonotonicClock>,
    tracker: AudioSessionTracker,
    wav_files: TempWavCache,
}

impl GstAudioOutput {
    pub fn new() -> MawsooahResult<Self> {
        init_gstreamer()?;
        let clock = MonotonicClock::start();
        tracing::info!(epoch = clock.epoch_wall(), "GStreamer audio output ready");
        Ok(Self {
            clock: Arc::new(clock),
            tracker: AudioSessionTracker::new(),
            wav_files: TempWavCache::new(),
        })
    }

    pub fn with_tracker(mut self, tracker: AudioSessionTracker) -> Self {
        self.tracker = tracker;
        self
    }
}

impl AudioOutput for GstAudioOutput {
    fn name(&self) -> &str {
        "gstreamer"
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

        let wav_file = self.wav_files.file_for(&buffer)?;

        let launch = format!(
            "filesrc location=\"{}\" ! wavparse ! audioconvert ! audioresample ! autoaudiosink",
            escape_path(wav_file.path())
        );
        let pipeline = gst::parse::launch(&launch)
            .map_err(|e| MawsooahError::playback(format!("Failed to build audio pipeline: {e}")))?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| MawsooahError::playback("Launch string did not produce a pipeline"))?;

        pipeline
            .set_state(gst::State::Paused)
            .map_err(|e| MawsooahError::playback(format!("Failed to preroll audio: {e:?}")))?;
        if let (Err(e), _, _) = pipeline.state(gst::ClockTime::from_seconds(5)) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(MawsooahError::playback(format!(
                "Audio pipeline failed to preroll: {e:?}"
            )));
        }

        if offset > 0.0 {
            let position = gst::ClockTime::from_nseconds(MonotonicClock::secs_to_ns(offset));
            if let Err(e) = pipeline
                .seek_simple(gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE, position)
            {
                tracing::warn!(offset, error = %e, "Audio seek failed; playing from start");
            }
        }

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| MawsooahError::playback(format!("Failed to start audio: {e:?}")))?;

        tracing::debug!(offset, duration, "Opened GStreamer audio session");

        Ok(Box::new(GstAudioSession {
            pipeline: Some(pipeline),
            _wav_file: wav_file,
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

struct GstAudioSession {
    pipeline: Option<gst::Pipeline>,
    _wav_file: Arc<tempfile::NamedTempFile>,
    clock: Arc<MonotonicClock>,
    started_at: f64,
    offset: f64,
    duration: f64,
    stopped_at: Option<f64>,
    lease: SessionLease,
}

impl GstAudioSession {
    fn position_at(&self, now: f64) -> f64 {
        (self.offset + (now - self.started_at).max(0.0)).min(self.duration)
    }
}

impl AudioSession for GstAudioSession {
    fn position_secs(&self) -> f64 {
        self.stopped_at
            .unwrap_or_else(|| self.position_at(self.clock.now_secs()))
    }

    fn stop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                tracing::warn!(error = ?e, "Failed to stop audio pipeline");
            }
            self.stopped_at = Some(self.position_at(self.clock.now_secs()));
        }
        self.lease.release();
    }

    fn is_active(&self) -> bool {
        self.lease.is_held()
    }
}

impl Drop for GstAudioSession {
    fn drop(&mut self) {
        self.stop();
    }
}
