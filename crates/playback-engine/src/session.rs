//! Live playback session management.

use std::fmt;
use std::sync::Arc;

use image::RgbaImage;

use mawsooah_audio::session::{AudioOutput, AudioSession};
use mawsooah_common::clock::{DriftMeasurement, MediaClock};
use mawsooah_common::config::{AppConfig, SubtitleDefaults};
use mawsooah_common::error::{MawsooahError, MawsooahResult};
use mawsooah_processing_core::ken_burns::{
    EffectSelector, KenBurnsAnimation, RandomEffectSelector,
};
use mawsooah_processing_core::timeline_builder::Timeline;
use mawsooah_project_model::segment::SubtitleMode;
use mawsooah_project_model::timeline::SegmentTiming;
use mawsooah_project_model::transform::Transform;
use mawsooah_render_engine::assets::ImageCache;
use mawsooah_render_engine::compositor::{FrameCompositor, SubtitleStyle};
use mawsooah_render_engine::export::{
    ExportEngine, ExportJob, ExportSettings, ProgressCallback, VideoFile,
};

/// Audio position and clock may disagree by this much before it is logged.
const DRIFT_WARN_MS: f64 = 100.0;

/// State of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Nothing playing; the cursor is at the start or pinned to the end.
    #[default]
    Stopped,
    /// Audio session open, cursor following the clock.
    Playing,
    /// Audio released, position held in the paused offset.
    Paused,
}

/// Sent to observers when the segment on screen changes.
#[derive(Debug, Clone)]
pub struct SegmentChange {
    pub index: usize,
    pub timing: SegmentTiming,
    /// Duration of the new segment in seconds.
    pub duration: f64,
}

/// Receives segment changes.
///
/// Implemented for any `FnMut(&SegmentChange) + Send` closure.
pub trait SegmentObserver: Send {
    fn segment_changed(&mut self, change: &SegmentChange);
}

impl<F> SegmentObserver for F
where
    F: FnMut(&SegmentChange) + Send,
{
    fn segment_changed(&mut self, change: &SegmentChange) {
        self(change)
    }
}

struct ActiveSegment {
    index: usize,
    timing: SegmentTiming,
    animation: KenBurnsAnimation,
}

/// Plays one timeline through an [`AudioOutput`].
///
/// While playing, the position is `clock.now_secs() - reference`; the audio
/// session is only the sound. At most one audio session is open at a time:
/// every transition closes the current one before opening another.
pub struct PlaybackSession {
    timeline: Timeline,
    output: Arc<dyn AudioOutput>,
    clock: Arc<dyn MediaClock>,
    state: PlaybackState,
    audio: Option<Box<dyn AudioSession>>,
    reference: f64,
    paused_offset: f64,
    cursor: f64,
    active: Option<ActiveSegment>,
    drift_warned: bool,
    subtitle_mode: SubtitleMode,
    selector: Box<dyn EffectSelector>,
    observers: Vec<Box<dyn SegmentObserver>>,
    images: ImageCache,
    compositor: Arc<FrameCompositor>,
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("output", &self.output.name())
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .field("paused_offset", &self.paused_offset)
            .field("active_index", &self.active_index())
            .field("subtitle_mode", &self.subtitle_mode)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl PlaybackSession {
    /// Create a stopped session. Segment images are decoded up front.
    pub fn new(timeline: Timeline, output: Arc<dyn AudioOutput>) -> Self {
        let clock = output.clock();
        let images = ImageCache::preload_timeline(&timeline);
        tracing::info!(
            output = output.name(),
            segments = timeline.segment_count(),
            duration_secs = timeline.duration(),
            "Playback session created"
        );
        Self {
            timeline,
            output,
            clock,
            state: PlaybackState::Stopped,
            audio: None,
            reference: 0.0,
            paused_offset: 0.0,
            cursor: 0.0,
            active: None,
            drift_warned: false,
            subtitle_mode: SubtitleMode::default(),
            selector: Box::new(RandomEffectSelector::new()),
            observers: Vec::new(),
            images,
            compositor: Arc::new(FrameCompositor::new(SubtitleStyle::from_config(
                &SubtitleDefaults::default(),
            ))),
        }
    }

    /// Create a session using the configured subtitle track and style.
    pub fn from_config(
        timeline: Timeline,
        output: Arc<dyn AudioOutput>,
        config: &AppConfig,
    ) -> Self {
        let mode = config
            .playback
            .subtitle_mode
            .parse::<SubtitleMode>()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default subtitle mode");
                SubtitleMode::default()
            });
        let compositor = FrameCompositor::new(SubtitleStyle::from_config(&config.subtitles));
        Self::new(timeline, output)
            .with_subtitle_mode(mode)
            .with_compositor(Arc::new(compositor))
    }

    /// Replace the effect selector (random by default).
    pub fn with_selector(mut self, selector: impl EffectSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn with_compositor(mut self, compositor: Arc<FrameCompositor>) -> Self {
        self.compositor = compositor;
        self
    }

    pub fn with_subtitle_mode(mut self, mode: SubtitleMode) -> Self {
        self.subtitle_mode = mode;
        self
    }

    /// Register an observer for segment changes.
    pub fn add_observer(&mut self, observer: impl SegmentObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Current session state.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Cursor position in seconds, as of the last transition or tick.
    pub fn position(&self) -> f64 {
        self.cursor
    }

    /// Offset playback resumes from.
    pub fn paused_offset(&self) -> f64 {
        self.paused_offset
    }

    pub fn duration(&self) -> f64 {
        self.timeline.duration()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn output(&self) -> &Arc<dyn AudioOutput> {
        &self.output
    }

    pub fn compositor(&self) -> &Arc<FrameCompositor> {
        &self.compositor
    }

    /// Index of the segment on screen, once playback or a seek has resolved one.
    pub fn active_index(&self) -> Option<usize> {
        self.active.as_ref().map(|active| active.index)
    }

    pub fn active_timing(&self) -> Option<&SegmentTiming> {
        self.active.as_ref().map(|active| &active.timing)
    }

    pub fn subtitle_mode(&self) -> SubtitleMode {
        self.subtitle_mode
    }

    pub fn set_subtitle_mode(&mut self, mode: SubtitleMode) {
        if mode != self.subtitle_mode {
            tracing::debug!(%mode, "Subtitle mode changed");
        }
        self.subtitle_mode = mode;
    }

    /// Start playing from `from_offset`, clamped to the timeline.
    ///
    /// Any open audio session is closed first. Playing while already playing
    /// restarts at the new offset.
    pub fn play(&mut self, from_offset: f64) -> MawsooahResult<()> {
        let offset = self.clamp_offset(from_offset);
        self.start_at(offset)?;
        tracing::info!(offset_secs = offset, output = self.output.name(), "Playback started");
        Ok(())
    }

    /// Pause playback, keeping the position.
    pub fn pause(&mut self) -> MawsooahResult<()> {
        if self.state != PlaybackState::Playing {
            return Err(MawsooahError::playback("Not playing"));
        }
        let offset = self.clamp_offset(self.clock.now_secs() - self.reference);
        self.stop_audio();
        self.paused_offset = offset;
        self.cursor = offset;
        self.state = PlaybackState::Paused;
        self.resolve_active(offset);
        tracing::info!(offset_secs = offset, "Playback paused");
        Ok(())
    }

    /// Resume from the paused offset. After the end of the timeline this
    /// starts over from the beginning.
    pub fn resume(&mut self) -> MawsooahResult<()> {
        if self.state == PlaybackState::Playing {
            return Err(MawsooahError::playback("Already playing"));
        }
        self.play(self.paused_offset)
    }

    /// Pause when playing, otherwise play from the paused offset.
    pub fn toggle(&mut self) -> MawsooahResult<PlaybackState> {
        match self.state {
            PlaybackState::Playing => self.pause()?,
            PlaybackState::Paused | PlaybackState::Stopped => self.play(self.paused_offset)?,
        }
        Ok(self.state)
    }

    /// Move to `t`, clamped to `[0, duration]`.
    ///
    /// While playing the audio restarts at `t`; otherwise only the paused
    /// offset moves. The active segment is resolved immediately.
    pub fn seek(&mut self, t: f64) -> MawsooahResult<()> {
        let target = self.clamp_offset(t);
        if self.state == PlaybackState::Playing {
            self.start_at(target)?;
        } else {
            self.paused_offset = target;
            self.cursor = target;
            self.resolve_active(target);
        }
        tracing::debug!(target_secs = target, state = ?self.state, "Seek");
        Ok(())
    }

    /// Stop playback and rewind to the start.
    pub fn stop(&mut self) {
        if self.state == PlaybackState::Stopped && self.cursor == 0.0 {
            return;
        }
        self.stop_audio();
        self.state = PlaybackState::Stopped;
        self.paused_offset = 0.0;
        self.cursor = 0.0;
        self.resolve_active(0.0);
        tracing::info!("Playback stopped");
    }

    /// Advance the cursor to the clock. Call once per display frame.
    ///
    /// Reaching the end stops playback with the cursor pinned to the
    /// duration and the paused offset reset, so the next play starts over.
    pub fn tick(&mut self) -> PlaybackState {
        if self.state != PlaybackState::Playing {
            return self.state;
        }

        let duration = self.duration();
        let elapsed = self.clock.now_secs() - self.reference;
        if elapsed >= duration {
            self.stop_audio();
            self.state = PlaybackState::Stopped;
            self.cursor = duration;
            self.paused_offset = 0.0;
            tracing::info!(duration_secs = duration, "Playback reached end of timeline");
            return self.state;
        }

        let elapsed = elapsed.max(0.0);
        self.cursor = elapsed;
        self.check_drift(elapsed);
        self.resolve_active(elapsed);
        self.state
    }

    /// Subtitle for the segment on screen in the current mode.
    pub fn subtitle_text(&self) -> Option<&str> {
        self.displayed_timing()
            .and_then(|timing| timing.segment.subtitle(self.subtitle_mode))
    }

    /// Ken Burns transform for the segment on screen at the cursor.
    pub fn current_transform(&self) -> Transform {
        self.active
            .as_ref()
            .map(|active| {
                active
                    .animation
                    .transform_at(active.timing.local_time(self.cursor))
            })
            .unwrap_or(Transform::IDENTITY)
    }

    /// Draw the live frame onto `surface`.
    ///
    /// Before anything has been played or sought, the first segment is shown
    /// unanimated.
    pub fn render_frame(&self, surface: &mut RgbaImage) {
        let image = self
            .displayed_timing()
            .and_then(|timing| self.images.get(timing.image()))
            .map(|image| &**image);
        self.compositor
            .render(surface, image, &self.current_transform(), self.subtitle_text());
    }

    /// Pause if playing and hand back an export job for this timeline.
    ///
    /// Export runs its own offline audio session, so live audio is released
    /// first.
    pub fn prepare_export(&mut self, settings: ExportSettings) -> MawsooahResult<ExportJob> {
        if self.state == PlaybackState::Playing {
            self.pause()?;
            tracing::info!("Paused playback for export");
        }
        Ok(ExportJob::new(self.timeline.clone(), settings))
    }

    /// Export this timeline on the calling thread.
    pub fn export_video(
        &mut self,
        engine: &ExportEngine,
        settings: ExportSettings,
        progress: Option<ProgressCallback>,
    ) -> MawsooahResult<VideoFile> {
        let job = self.prepare_export(settings)?;
        engine.export(&job, progress)
    }

    /// Export this timeline on the blocking pool.
    pub async fn export_video_async(
        &mut self,
        engine: Arc<ExportEngine>,
        settings: ExportSettings,
        progress: Option<ProgressCallback>,
    ) -> MawsooahResult<VideoFile> {
        let job = self.prepare_export(settings)?;
        mawsooah_render_engine::export::export_video(engine, job, progress).await
    }

    // Internal helpers

    fn clamp_offset(&self, t: f64) -> f64 {
        if t.is_nan() {
            0.0
        } else {
            t.clamp(0.0, self.duration())
        }
    }

    /// Open a session at `offset` and anchor the clock to it.
    fn start_at(&mut self, offset: f64) -> MawsooahResult<()> {
        self.stop_audio();
        let session = match self.output.open(self.timeline.master().clone(), offset) {
            Ok(session) => session,
            Err(e) => {
                if self.state == PlaybackState::Playing {
                    self.state = PlaybackState::Paused;
                    self.paused_offset = offset;
                    self.cursor = offset;
                }
                tracing::warn!(error = %e, "Failed to open audio session");
                return Err(e);
            }
        };
        self.audio = Some(session);
        self.reference = self.clock.now_secs() - offset;
        self.paused_offset = offset;
        self.cursor = offset;
        self.drift_warned = false;
        self.state = PlaybackState::Playing;
        self.resolve_active(offset);
        Ok(())
    }

    fn stop_audio(&mut self) {
        if let Some(mut audio) = self.audio.take() {
            audio.stop();
        }
    }

    fn displayed_timing(&self) -> Option<&SegmentTiming> {
        self.active_timing()
            .or_else(|| self.timeline.timings().get(0))
    }

    /// Look up the segment at `t` and notify observers if it changed.
    fn resolve_active(&mut self, t: f64) {
        let Some(index) = self.timeline.active_index(t) else {
            return;
        };
        if self.active_index() == Some(index) {
            return;
        }
        let Some(timing) = self.timeline.timings().get(index).cloned() else {
            return;
        };

        let effect = self.selector.select(&timing);
        let animation = KenBurnsAnimation::for_timing(effect, &timing);
        tracing::debug!(index, start_secs = timing.start, ?effect, "Active segment changed");

        let change = SegmentChange {
            index,
            duration: timing.duration(),
            timing: timing.clone(),
        };
        self.active = Some(ActiveSegment {
            index,
            timing,
            animation,
        });
        for observer in &mut self.observers {
            observer.segment_changed(&change);
        }
    }

    fn check_drift(&mut self, elapsed: f64) {
        let Some(audio) = self.audio.as_ref() else {
            return;
        };
        let drift = DriftMeasurement::from_secs(elapsed, audio.position_secs());
        if drift.exceeds_threshold_ms(DRIFT_WARN_MS) {
            if !self.drift_warned {
                tracing::warn!(
                    drift_ms = drift.drift_ms(),
                    output = self.output.name(),
                    "Audio drifting from playback clock"
                );
                self.drift_warned = true;
            }
        } else {
            self.drift_warned = false;
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.stop_audio();
    }
}
