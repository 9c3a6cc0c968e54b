//! Export: render a timeline to a single video file.
//!
//! # Pipeline
//!
//! 1. **Negotiate** a container/codec with the recorder backend. Nothing is
//!    allocated if no format is supported.
//! 2. **Preload** every distinct segment image.
//! 3. **Render** frame by frame. Time comes from the offline audio session's
//!    sample cursor: each frame reads the current audio time, draws the
//!    active segment with its seeded Ken Burns transform, then advances the
//!    audio by exactly one frame's worth of samples.
//! 4. **Finalize** the recorder into a [`VideoFile`].
//!
//! The audio session and the recorder are owned guards, so every exit path
//! (success, error, cancellation) releases them.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbaImage;

use mawsooah_audio::offline::OfflineAudioSession;
use mawsooah_audio::session::{AudioSession, AudioSessionTracker};
use mawsooah_common::clock::DriftMeasurement;
use mawsooah_common::config::ExportDefaults;
use mawsooah_common::error::{MawsooahError, MawsooahResult};
use mawsooah_processing_core::ken_burns::{
    EffectSelector, KenBurnsAnimation, SeededEffectSelector,
};
use mawsooah_processing_core::timeline_builder::Timeline;
use mawsooah_project_model::segment::SubtitleMode;

use crate::assets::ImageCache;
use crate::compositor::FrameCompositor;
use crate::formats::{negotiate, VideoFormat};
use crate::recorder::{RecorderBackend, RecorderGuard, RecorderSettings};

/// Export parameters.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,

    /// Topic the file is named after.
    pub topic: String,

    /// File name prefix (`<prefix>-<topic>.<ext>`).
    pub file_prefix: String,

    /// Formats to try, in order.
    pub format_preference: Vec<VideoFormat>,

    /// Subtitles burned into the video. Off unless asked for.
    pub subtitle_mode: SubtitleMode,

    /// Video bitrate in kbps (0 = encoder default).
    pub video_bitrate_kbps: u32,

    pub audio_bitrate_kbps: u32,
}

impl ExportSettings {
    pub fn from_config(config: &ExportDefaults) -> Self {
        Self {
            width: config.width.max(2),
            height: config.height.max(2),
            fps: config.fps.max(1),
            topic: String::new(),
            file_prefix: config.file_prefix.clone(),
            format_preference: VideoFormat::preference_from_names(&config.format_preference),
            subtitle_mode: SubtitleMode::Off,
            video_bitrate_kbps: config.video_bitrate_kbps,
            audio_bitrate_kbps: config.audio_bitrate_kbps,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32, fps: u32) -> Self {
        self.width = width.max(2);
        self.height = height.max(2);
        self.fps = fps.max(1);
        self
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from_config(&ExportDefaults::default())
    }
}

/// A timeline queued for export, with its cancellation flag.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub timeline: Timeline,
    pub settings: ExportSettings,
    cancel: Arc<AtomicBool>,
}

impl ExportJob {
    pub fn new(timeline: Timeline, settings: ExportSettings) -> Self {
        Self {
            timeline,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that cancels the export when set. Shareable across threads.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Export progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Percentage of audio time rendered, in `[0, 100]`.
    pub percent: f64,

    /// Frames rendered so far.
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Rendering,
    Finalizing,
    Complete,
    Failed,
}

/// The exported file.
#[derive(Debug, Clone)]
pub struct VideoFile {
    pub data: Vec<u8>,
    pub format: VideoFormat,
    pub file_name: String,
}

impl VideoFile {
    pub fn mime_type(&self) -> String {
        self.format.mime_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the file into `dir` (created if needed) and return its path.
    pub fn save_to(&self, dir: &Path) -> MawsooahResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.data)?;
        tracing::info!(path = %path.display(), bytes = self.data.len(), "Video saved");
        Ok(path)
    }
}

/// `<prefix>-<topic>.<ext>` with whitespace runs collapsed to `-` and
/// characters that are unsafe in file names removed.
pub fn export_file_name(prefix: &str, topic: &str, extension: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    let mut pending_dash = false;
    for ch in topic.trim().chars() {
        if ch.is_whitespace() {
            pending_dash = true;
            continue;
        }
        if ch.is_control() || matches!(ch, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
            continue;
        }
        if pending_dash && !slug.is_empty() {
            slug.push('-');
        }
        pending_dash = false;
        slug.push(ch);
    }

    let prefix = prefix.trim();
    match (prefix.is_empty(), slug.is_empty()) {
        (false, false) => format!("{prefix}-{slug}.{extension}"),
        (false, true) => format!("{prefix}.{extension}"),
        (true, false) => format!("{slug}.{extension}"),
        (true, true) => format!("export.{extension}"),
    }
}

/// Sample index at which frame `frame` starts: `round(frame * rate / fps)`.
///
/// Computed in integers so the per-frame audio quantum never accumulates
/// rounding error.
pub fn frame_sample_index(frame: u64, sample_rate: u32, fps: u32) -> u64 {
    let fps = fps.max(1) as u64;
    (2 * frame * sample_rate as u64 + fps) / (2 * fps)
}

/// Number of frames rendered for `total_samples` of audio.
pub fn frame_count(total_samples: usize, sample_rate: u32, fps: u32) -> u64 {
    let total = total_samples as u64;
    let mut frames = total * fps.max(1) as u64 / sample_rate.max(1) as u64;
    while frame_sample_index(frames, sample_rate, fps) < total {
        frames += 1;
    }
    while frames > 0 && frame_sample_index(frames - 1, sample_rate, fps) >= total {
        frames -= 1;
    }
    frames
}

struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last_percent: Cell<f64>,
    frames: Cell<u64>,
    total: Cell<u64>,
}

impl ProgressReporter {
    fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last_percent: Cell::new(0.0),
            frames: Cell::new(0),
            total: Cell::new(0),
        }
    }

    fn emit(&self, percent: f64, frames_rendered: u64, total_frames: u64, stage: ExportStage) {
        let percent = percent.clamp(self.last_percent.get(), 100.0);
        self.last_percent.set(percent);
        self.frames.set(frames_rendered);
        self.total.set(total_frames);
        if let Some(cb) = &self.callback {
            cb(ExportProgress {
                percent,
                frames_rendered,
                total_frames,
                stage,
            });
        }
    }

    fn stage(&self, stage: ExportStage) {
        self.emit(
            self.last_percent.get(),
            self.frames.get(),
            self.total.get(),
            stage,
        );
    }
}

/// Renders timelines through a recorder backend.
pub struct ExportEngine {
    backend: Arc<dyn RecorderBackend>,
    compositor: Arc<FrameCompositor>,
    tracker: AudioSessionTracker,
}

impl ExportEngine {
    pub fn new(backend: Arc<dyn RecorderBackend>, compositor: Arc<FrameCompositor>) -> Self {
        Self {
            backend,
            compositor,
            tracker: AudioSessionTracker::new(),
        }
    }

    /// Count export audio sessions with a shared tracker.
    pub fn with_tracker(mut self, tracker: AudioSessionTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &AudioSessionTracker {
        &self.tracker
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Render `job` to a video file on the current thread.
    pub fn export(
        &self,
        job: &ExportJob,
        progress: Option<ProgressCallback>,
    ) -> MawsooahResult<VideoFile> {
        let reporter = ProgressReporter::new(progress);
        let start = std::time::Instant::now();

        tracing::info!(
            backend = self.backend.name(),
            segments = job.timeline.segment_count(),
            duration_secs = job.timeline.duration(),
            width = job.settings.width,
            height = job.settings.height,
            fps = job.settings.fps,
            "Starting export"
        );

        let result = self.run(job, &reporter);
        match &result {
            Ok(file) => {
                reporter.emit(
                    100.0,
                    reporter.frames.get(),
                    reporter.total.get(),
                    ExportStage::Complete,
                );
                tracing::info!(
                    file = %file.file_name,
                    bytes = file.data.len(),
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "Export complete"
                );
            }
            Err(MawsooahError::ExportCancelled) => {
                reporter.stage(ExportStage::Failed);
                tracing::info!("Export cancelled");
            }
            Err(e) => {
                reporter.stage(ExportStage::Failed);
                tracing::error!(error = %e, "Export failed");
            }
        }
        result
    }

    fn run(&self, job: &ExportJob, reporter: &ProgressReporter) -> MawsooahResult<VideoFile> {
        let settings = &job.settings;
        let timeline = &job.timeline;
        reporter.emit(0.0, 0, 0, ExportStage::Preparing);

        let format = negotiate(&settings.format_preference, self.backend.as_ref())?;
        if job.is_cancelled() {
            return Err(MawsooahError::ExportCancelled);
        }

        let images = ImageCache::preload_timeline(timeline);

        let master = timeline.master().clone();
        let sample_rate = master.sample_rate();
        let total_samples = master.len();
        let fps = settings.fps.max(1);
        let duration = timeline.duration();
        let total_frames = frame_count(total_samples, sample_rate, fps);

        let mut audio = OfflineAudioSession::open(master, &self.tracker);
        let mut recorder = RecorderGuard::new(self.backend.start(&RecorderSettings {
            width: settings.width,
            height: settings.height,
            fps,
            format,
            sample_rate,
            video_bitrate_kbps: settings.video_bitrate_kbps,
            audio_bitrate_kbps: settings.audio_bitrate_kbps,
        })?);

        let mut surface = RgbaImage::new(settings.width, settings.height);
        let mut selector = SeededEffectSelector;
        let mut animations: HashMap<usize, KenBurnsAnimation> = HashMap::new();
        let mut frame: u64 = 0;

        loop {
            if job.is_cancelled() {
                return Err(MawsooahError::ExportCancelled);
            }

            let current = audio.position_secs();
            let percent = if duration > 0.0 {
                (current / duration).min(1.0) * 100.0
            } else {
                100.0
            };
            reporter.emit(percent, frame, total_frames, ExportStage::Rendering);

            if current >= duration || audio.is_finished() {
                break;
            }
            let Some(timing) = timeline.active_at(current) else {
                break;
            };

            let animation = *animations
                .entry(timing.index)
                .or_insert_with(|| KenBurnsAnimation::for_timing(selector.select(timing), timing));
            let transform = animation.transform_at(timing.local_time(current));
            let image = images.get(timing.image()).map(|image| &**image);
            let subtitle = timing.segment.subtitle(settings.subtitle_mode);

            self.compositor
                .render(&mut surface, image, &transform, subtitle);
            recorder.push_frame(&surface)?;
            frame += 1;

            let target = frame_sample_index(frame, sample_rate, fps).min(total_samples as u64);
            audio.render_until(target as usize, recorder.audio_sink()?)?;
        }

        let drift = DriftMeasurement::from_secs(audio.position_secs(), frame as f64 / fps as f64);
        let frame_ms = 1000.0 / fps as f64;
        if drift.exceeds_threshold_ms(frame_ms) {
            tracing::warn!(drift_ms = drift.drift_ms(), "Audio/video drift exceeds one frame");
        } else {
            tracing::debug!(drift_ms = drift.drift_ms(), frames = frame, "Render loop finished");
        }
        audio.stop();

        reporter.emit(100.0, frame, total_frames, ExportStage::Finalizing);
        let data = recorder.finish()?;

        Ok(VideoFile {
            data,
            format,
            file_name: export_file_name(&settings.file_prefix, &settings.topic, format.extension()),
        })
    }
}

/// Run an export on the blocking pool.
pub async fn export_video(
    engine: Arc<ExportEngine>,
    job: ExportJob,
    progress: Option<ProgressCallback>,
) -> MawsooahResult<VideoFile> {
    tokio::task::spawn_blocking(move || engine.export(&job, progress))
        .await
        .map_err(|e| MawsooahError::export_encoding(format!("Export task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::tests::png_bytes;
    use crate::recorder::MemoryRecorderBackend;
    use mawsooah_audio::decoder::SPEECH_SAMPLE_RATE;
    use mawsooah_processing_core::timeline_builder::build_timeline_blocking;
    use mawsooah_project_model::segment::{MediaBlob, Segment};
    use crate::recorder::Recorder;
    use mawsooah_audio::session::AudioSink;
    use std::sync::Mutex;

    fn timeline(durations: &[f64]) -> Timeline {
        let segments = durations
            .iter()
            .enumerate()
            .map(|(i, secs)| {
                let samples = (secs * SPEECH_SAMPLE_RATE as f64).round() as usize;
                let audio: Vec<u8> = (0..samples)
                    .flat_map(|n| ((n % 200) as i16 * 50).to_le_bytes())
                    .collect();
                let shade = (i as u8).wrapping_mul(60);
                Segment::new(
                    format!("segment {i}"),
                    MediaBlob::from_bytes(audio),
                    MediaBlob::from_bytes(png_bytes(12, 8, [shade, 100, 200 - shade, 255])),
                )
            })
            .collect();
        build_timeline_blocking(segments).unwrap()
    }

    fn settings() -> ExportSettings {
        ExportSettings::default()
            .with_size(32, 18, 10)
            .with_topic("Ancient  Egypt / Pharaohs")
    }

    fn collecting() -> (Arc<Mutex<Vec<ExportProgress>>>, ProgressCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, Box::new(move |p| sink.lock().unwrap().push(p)))
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            export_file_name("mawsooah", "Ancient  Egypt / Pharaohs", "mp4"),
            "mawsooah-Ancient-Egypt-Pharaohs.mp4"
        );
        assert_eq!(export_file_name("mawsooah", "  ", "webm"), "mawsooah.webm");
        assert_eq!(
            export_file_name("mawsooah", "تاريخ مصر", "mp4"),
            "mawsooah-تاريخ-مصر.mp4"
        );
        assert_eq!(export_file_name("mawsooah", "a:b?c", "mp4"), "mawsooah-abc.mp4");
    }

    #[test]
    fn test_frame_sample_index_is_exact() {
        assert_eq!(frame_sample_index(0, 24_000, 30), 0);
        assert_eq!(frame_sample_index(1, 24_000, 30), 800);
        assert_eq!(frame_sample_index(30, 24_000, 30), 24_000);
        // 24000 / 7 is not integral.
        assert_eq!(frame_sample_index(1, 24_000, 7), 3429);
        assert_eq!(frame_sample_index(7, 24_000, 7), 24_000);
    }

    #[test]
    fn test_frame_count() {
        assert_eq!(frame_count(24_000, 24_000, 10), 10);
        assert_eq!(frame_count(24_001, 24_000, 10), 11);
        assert_eq!(frame_count(0, 24_000, 10), 0);
        assert_eq!(frame_count(1, 24_000, 30), 1);
    }

    #[test]
    fn test_export_renders_every_frame_and_all_audio() {
        let backend = Arc::new(MemoryRecorderBackend::new());
        let engine = ExportEngine::new(backend.clone(), Arc::new(FrameCompositor::default()));
        let timeline = timeline(&[0.5, 0.3, 0.2]);
        let job = ExportJob::new(timeline.clone(), settings());

        let file = engine.export(&job, None).unwrap();
        assert_eq!(file.file_name, "mawsooah-Ancient-Egypt-Pharaohs.mp4");
        assert_eq!(file.format, VideoFormat::MP4_H264_AAC);

        let recording = &backend.recordings()[0];
        assert!(recording.finished);
        assert_eq!(recording.frame_hashes.len(), 10);
        assert_eq!(recording.audio_samples.as_slice(), timeline.master().samples());
        assert_eq!(engine.tracker().active(), 0);
        assert_eq!(engine.tracker().opened(), 1);
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_100() {
        let engine = ExportEngine::new(
            Arc::new(MemoryRecorderBackend::new()),
            Arc::new(FrameCompositor::default()),
        );
        let job = ExportJob::new(timeline(&[0.4, 0.35]), settings());
        let (seen, callback) = collecting();

        engine.export(&job, Some(callback)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first().unwrap().stage, ExportStage::Preparing);
        assert_eq!(seen.last().unwrap().stage, ExportStage::Complete);
        for pair in seen.windows(2) {
            assert!(pair[1].percent >= pair[0].percent);
        }
        let rendering: Vec<_> = seen
            .iter()
            .filter(|p| p.stage == ExportStage::Rendering)
            .collect();
        assert!(rendering.iter().all(|p| (0.0..=100.0).contains(&p.percent)));
        // 100 only at the stop condition, i.e. the last rendering report.
        assert!(rendering[..rendering.len() - 1]
            .iter()
            .all(|p| p.percent < 100.0));
        assert!(rendering.last().unwrap().percent >= 99.9);
    }

    #[test]
    fn test_unsupported_export_allocates_nothing() {
        let backend = Arc::new(MemoryRecorderBackend::supporting(Vec::new()));
        let engine = ExportEngine::new(backend.clone(), Arc::new(FrameCompositor::default()));
        let job = ExportJob::new(timeline(&[0.2]), settings());
        let (seen, callback) = collecting();

        let err = engine.export(&job, Some(callback)).unwrap_err();
        assert!(matches!(err, MawsooahError::ExportUnsupported { .. }));
        assert_eq!(engine.tracker().opened(), 0);
        assert_eq!(backend.started(), 0);
        assert_eq!(seen.lock().unwrap().last().unwrap().stage, ExportStage::Failed);
    }

    #[test]
    fn test_two_exports_are_frame_identical() {
        let backend = Arc::new(MemoryRecorderBackend::new());
        let engine = ExportEngine::new(backend.clone(), Arc::new(FrameCompositor::default()));
        let timeline = timeline(&[0.31, 0.27, 0.45]);

        engine.export(&ExportJob::new(timeline.clone(), settings()), None).unwrap();
        engine.export(&ExportJob::new(timeline, settings()), None).unwrap();

        let recordings = backend.recordings();
        assert_eq!(recordings[0].frame_hashes, recordings[1].frame_hashes);
        assert_eq!(recordings[0].audio_samples, recordings[1].audio_samples);
    }

    #[test]
    fn test_cancelled_export_releases_everything() {
        let backend = Arc::new(MemoryRecorderBackend::new());
        let engine = ExportEngine::new(backend.clone(), Arc::new(FrameCompositor::default()));
        let job = ExportJob::new(timeline(&[1.0]), settings());
        let flag = job.cancel_flag();
        let callback: ProgressCallback = Box::new(move |p| {
            if p.frames_rendered >= 3 {
                flag.store(true, Ordering::SeqCst);
            }
        });

        let err = engine.export(&job, Some(callback)).unwrap_err();
        assert!(matches!(err, MawsooahError::ExportCancelled));
        assert_eq!(engine.tracker().active(), 0);
        let recording = &backend.recordings()[0];
        assert!(recording.aborted);
        assert!(!recording.finished);
    }

    #[test]
    fn test_broken_image_uses_placeholder() {
        let segment = Segment::new(
            "no picture",
            MediaBlob::from_bytes(vec![0u8; 4800]),
            MediaBlob::from_bytes(vec![1u8, 2, 3]),
        );
        let timeline = build_timeline_blocking(vec![segment]).unwrap();
        let backend = Arc::new(MemoryRecorderBackend::new());
        let engine = ExportEngine::new(backend.clone(), Arc::new(FrameCompositor::default()));

        engine.export(&ExportJob::new(timeline, settings()), None).unwrap();
        let recording = &backend.recordings()[0];
        assert_eq!(recording.frame_hashes.len(), 1);
    }

    #[test]
    fn test_save_to_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = VideoFile {
            data: vec![1, 2, 3],
            format: VideoFormat::WEBM,
            file_name: export_file_name("mawsooah", "test", "webm"),
        };
        let path = file.save_to(&dir.path().join("out")).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_async_export() {
        let engine = Arc::new(ExportEngine::new(
            Arc::new(MemoryRecorderBackend::new()),
            Arc::new(FrameCompositor::default()),
        ));
        let job = ExportJob::new(timeline(&[0.2]), settings());
        let file = export_video(engine, job, None).await.unwrap();
        assert!(!file.is_empty());
    }

    /// Fails on the `fail_at`-th frame and records whether it was aborted.
    struct FailingBackend {
        fail_at: usize,
        aborted: Arc<AtomicBool>,
        finished: Arc<AtomicBool>,
    }

    struct FailingRecorder {
        frames: usize,
        fail_at: usize,
        audio: Vec<f32>,
        aborted: Arc<AtomicBool>,
        finished: Arc<AtomicBool>,
    }

    impl RecorderBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        fn supports(&self, _format: &VideoFormat) -> bool {
            true
        }

        fn start(&self, _settings: &RecorderSettings) -> MawsooahResult<Box<dyn Recorder>> {
            Ok(Box::new(FailingRecorder {
                frames: 0,
                fail_at: self.fail_at,
                audio: Vec::new(),
                aborted: self.aborted.clone(),
                finished: self.finished.clone(),
            }))
        }
    }

    impl Recorder for FailingRecorder {
        fn push_frame(&mut self, _frame: &RgbaImage) -> MawsooahResult<()> {
            self.frames += 1;
            if self.frames == self.fail_at {
                return Err(MawsooahError::export_encoding("encoder pipe closed"));
            }
            Ok(())
        }

        fn audio_sink(&mut self) -> &mut dyn AudioSink {
            &mut self.audio
        }

        fn finish(self: Box<Self>) -> MawsooahResult<Vec<u8>> {
            self.finished.store(true, Ordering::SeqCst);
            Ok(vec![0])
        }

        fn abort(&mut self) {
            self.aborted.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_recorder_failure_mid_export_aborts_and_releases_audio() {
        let backend = FailingBackend {
            fail_at: 3,
            aborted: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
        };
        let aborted = backend.aborted.clone();
        let finished = backend.finished.clone();
        let engine = ExportEngine::new(Arc::new(backend), Arc::new(FrameCompositor::default()));
        let job = ExportJob::new(timeline(&[0.5, 0.5]), settings());
        let (seen, callback) = collecting();

        let result = engine.export(&job, Some(callback));

        let err = result.unwrap_err();
        assert!(matches!(err, MawsooahError::ExportEncoding { .. }), "{err:?}");
        assert_eq!(engine.tracker().opened(), 1);
        assert_eq!(engine.tracker().active(), 0);
        assert!(aborted.load(Ordering::SeqCst));
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(seen.lock().unwrap().last().unwrap().stage, ExportStage::Failed);
    }
}

