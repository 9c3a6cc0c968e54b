//! Recorders: where export frames and audio go.
//!
//! A [`RecorderBackend`] reports which formats it can produce and starts
//! [`Recorder`]s. Two backends ship:
//!
//! - [`FfmpegRecorderBackend`]: raw RGBA frames are piped into an `ffmpeg`
//!   child process, audio is collected into a WAV file, and both are muxed
//!   when the recorder finishes.
//! - [`MemoryRecorderBackend`]: keeps frame hashes and samples in memory.
//!   Used to verify export determinism and in tests.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;

use image::RgbaImage;
use serde::Serialize;

use mawsooah_audio::session::AudioSink;
use mawsooah_audio::wav::WavWriter;
use mawsooah_common::error::{MawsooahError, MawsooahResult};
use mawsooah_project_model::hash::fnv1a_64;

use crate::formats::{AudioCodec, Container, VideoCodec, VideoFormat};

/// Parameters a recorder is started with.
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: VideoFormat,
    pub sample_rate: u32,
    /// Video bitrate in kbps (0 = encoder default).
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
}

/// An in-progress recording.
pub trait Recorder: Send {
    /// Append one video frame. Frames must match the configured size.
    fn push_frame(&mut self, frame: &RgbaImage) -> MawsooahResult<()>;

    /// Sink receiving the export audio.
    fn audio_sink(&mut self) -> &mut dyn AudioSink;

    /// Finalize and return the encoded file.
    fn finish(self: Box<Self>) -> MawsooahResult<Vec<u8>>;

    /// Discard everything recorded so far.
    fn abort(&mut self);
}

/// Factory for recorders.
pub trait RecorderBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this backend can produce `format`.
    fn supports(&self, format: &VideoFormat) -> bool;

    fn start(&self, settings: &RecorderSettings) -> MawsooahResult<Box<dyn Recorder>>;
}

/// Owns a recorder and aborts it unless [`RecorderGuard::finish`] is called.
pub struct RecorderGuard {
    inner: Option<Box<dyn Recorder>>,
}

impl RecorderGuard {
    pub fn new(recorder: Box<dyn Recorder>) -> Self {
        Self {
            inner: Some(recorder),
        }
    }

    pub fn push_frame(&mut self, frame: &RgbaImage) -> MawsooahResult<()> {
        self.recorder()?.push_frame(frame)
    }

    pub fn audio_sink(&mut self) -> MawsooahResult<&mut dyn AudioSink> {
        Ok(self.recorder()?.audio_sink())
    }

    pub fn finish(mut self) -> MawsooahResult<Vec<u8>> {
        match self.inner.take() {
            Some(recorder) => recorder.finish(),
            None => Err(MawsooahError::export_encoding("recorder already finished")),
        }
    }

    fn recorder(&mut self) -> MawsooahResult<&mut Box<dyn Recorder>> {
        self.inner
            .as_mut()
            .ok_or_else(|| MawsooahError::export_encoding("recorder already finished"))
    }
}

impl Drop for RecorderGuard {
    fn drop(&mut self) {
        if let Some(mut recorder) = self.inner.take() {
            tracing::debug!("Discarding unfinished recording");
            recorder.abort();
        }
    }
}

fn check_frame_size(frame: &RgbaImage, settings: &RecorderSettings) -> MawsooahResult<()> {
    if frame.dimensions() != (settings.width, settings.height) {
        return Err(MawsooahError::export_encoding(format!(
            "frame is {}x{}, recorder expects {}x{}",
            frame.width(),
            frame.height(),
            settings.width,
            settings.height
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// What a memory recorder captured.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryRecording {
    pub format: Option<VideoFormat>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// FNV-1a hash of each frame's raw RGBA bytes.
    pub frame_hashes: Vec<u64>,
    pub audio_samples: Vec<f32>,
    pub finished: bool,
    pub aborted: bool,
}

/// Backend that records into memory.
#[derive(Debug, Clone)]
pub struct MemoryRecorderBackend {
    supported: Option<Vec<VideoFormat>>,
    recordings: Arc<Mutex<Vec<Arc<Mutex<MemoryRecording>>>>>,
}

impl Default for MemoryRecorderBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecorderBackend {
    /// Supports every format.
    pub fn new() -> Self {
        Self {
            supported: None,
            recordings: Arc::default(),
        }
    }

    /// Supports only `formats`.
    pub fn supporting(formats: Vec<VideoFormat>) -> Self {
        Self {
            supported: Some(formats),
            recordings: Arc::default(),
        }
    }

    /// Number of recorders started so far.
    pub fn started(&self) -> usize {
        self.recordings
            .lock()
            .map(|r| r.len())
            .unwrap_or_else(|e| e.into_inner().len())
    }

    /// Snapshot of every recording, oldest first.
    pub fn recordings(&self) -> Vec<MemoryRecording> {
        let recordings = self.recordings.lock().unwrap_or_else(|e| e.into_inner());
        recordings
            .iter()
            .map(|r| r.lock().unwrap_or_else(|e| e.into_inner()).clone())
            .collect()
    }
}

impl RecorderBackend for MemoryRecorderBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports(&self, format: &VideoFormat) -> bool {
        self.supported
            .as_ref()
            .map_or(true, |formats| formats.contains(format))
    }

    fn start(&self, settings: &RecorderSettings) -> MawsooahResult<Box<dyn Recorder>> {
        let recording = Arc::new(Mutex::new(MemoryRecording {
            format: Some(settings.format),
            width: settings.width,
            height: settings.height,
            fps: settings.fps,
            ..MemoryRecording::default()
        }));
        self.recordings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(recording.clone());
        Ok(Box::new(MemoryRecorder {
            settings: settings.clone(),
            recording,
            audio: Vec::new(),
        }))
    }
}

struct MemoryRecorder {
    settings: RecorderSettings,
    recording: Arc<Mutex<MemoryRecording>>,
    audio: Vec<f32>,
}

impl MemoryRecorder {
    fn with_recording<T>(&self, f: impl FnOnce(&mut MemoryRecording) -> T) -> T {
        let mut recording = self.recording.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut recording)
    }
}

impl Recorder for MemoryRecorder {
    fn push_frame(&mut self, frame: &RgbaImage) -> MawsooahResult<()> {
        check_frame_size(frame, &self.settings)?;
        let hash = fnv1a_64(frame.as_raw());
        self.with_recording(|r| r.frame_hashes.push(hash));
        Ok(())
    }

    fn audio_sink(&mut self) -> &mut dyn AudioSink {
        &mut self.audio
    }

    fn finish(self: Box<Self>) -> MawsooahResult<Vec<u8>> {
        let audio = self.audio.clone();
        let snapshot = self.with_recording(|r| {
            r.audio_samples = audio;
            r.finished = true;
            r.clone()
        });
        Ok(serde_json::to_vec(&snapshot)?)
    }

    fn abort(&mut self) {
        self.with_recording(|r| {
            r.frame_hashes.clear();
            r.aborted = true;
        });
        self.audio.clear();
    }
}

// ---------------------------------------------------------------------------
// ffmpeg backend
// ---------------------------------------------------------------------------

fn video_encoder_candidates(codec: VideoCodec) -> &'static [&'static str] {
    match codec {
        VideoCodec::H264 => &["libx264", "libopenh264"],
        VideoCodec::Vp9 => &["libvpx-vp9"],
        VideoCodec::Vp8 => &["libvpx"],
    }
}

fn audio_encoder_candidates(codec: AudioCodec) -> &'static [&'static str] {
    match codec {
        AudioCodec::Aac => &["aac", "libfdk_aac"],
        AudioCodec::Opus => &["libopus", "opus"],
    }
}

/// Codecs to try for a container when none are pinned.
fn default_codecs(container: Container) -> (&'static [VideoCodec], &'static [AudioCodec]) {
    match container {
        Container::Mp4 => (&[VideoCodec::H264], &[AudioCodec::Aac]),
        Container::Webm => (&[VideoCodec::Vp9, VideoCodec::Vp8], &[AudioCodec::Opus]),
    }
}

/// Parse the encoder table printed by `ffmpeg -hide_banner -encoders`.
fn parse_encoder_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let flags = fields.next()?;
            let name = fields.next()?;
            (flags.len() == 6).then(|| name.to_string())
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EncoderChoice {
    video: &'static str,
    audio: &'static str,
}

/// Backend that encodes with an `ffmpeg` binary.
#[derive(Debug)]
pub struct FfmpegRecorderBackend {
    binary: PathBuf,
    encoders: OnceLock<HashSet<String>>,
}

impl FfmpegRecorderBackend {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            encoders: OnceLock::new(),
        }
    }

    /// Encoders the binary offers. Probed once; an unusable binary offers
    /// none.
    fn encoders(&self) -> &HashSet<String> {
        self.encoders.get_or_init(|| {
            let output = Command::new(&self.binary)
                .args(["-hide_banner", "-encoders"])
                .stdin(Stdio::null())
                .stderr(Stdio::null())
                .output();
            match output {
                Ok(output) if output.status.success() => {
                    let encoders = parse_encoder_list(&String::from_utf8_lossy(&output.stdout));
                    tracing::debug!(count = encoders.len(), "Probed ffmpeg encoders");
                    encoders
                }
                Ok(output) => {
                    tracing::warn!(status = %output.status, "ffmpeg encoder probe failed");
                    HashSet::new()
                }
                Err(e) => {
                    tracing::warn!(binary = %self.binary.display(), error = %e, "ffmpeg not available");
                    HashSet::new()
                }
            }
        })
    }

    fn choose_encoders(&self, format: &VideoFormat) -> Option<EncoderChoice> {
        choose_encoders(self.encoders(), format)
    }
}

fn choose_encoders(available: &HashSet<String>, format: &VideoFormat) -> Option<EncoderChoice> {
    let (default_video, default_audio) = default_codecs(format.container);
    let video_codecs = format
        .video
        .map(|c| vec![c])
        .unwrap_or_else(|| default_video.to_vec());
    let audio_codecs = format
        .audio
        .map(|c| vec![c])
        .unwrap_or_else(|| default_audio.to_vec());

    let video = video_codecs
        .into_iter()
        .flat_map(|c| video_encoder_candidates(c).iter().copied())
        .find(|name| available.contains(*name))?;
    let audio = audio_codecs
        .into_iter()
        .flat_map(|c| audio_encoder_candidates(c).iter().copied())
        .find(|name| available.contains(*name))?;
    Some(EncoderChoice { video, audio })
}

impl RecorderBackend for FfmpegRecorderBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn supports(&self, format: &VideoFormat) -> bool {
        self.choose_encoders(format).is_some()
    }

    fn start(&self, settings: &RecorderSettings) -> MawsooahResult<Box<dyn Recorder>> {
        let encoders = self.choose_encoders(&settings.format).ok_or_else(|| {
            MawsooahError::export_unsupported(format!(
                "ffmpeg cannot encode {}",
                settings.format
            ))
        })?;

        let workdir = tempfile::Builder::new().prefix("mawsooah-export-").tempdir()?;
        let video_path = workdir
            .path()
            .join(format!("video.{}", settings.format.extension()));
        let audio_path = workdir.path().join("audio.wav");

        let audio = WavWriter::new(
            BufWriter::new(File::create(&audio_path)?),
            settings.sample_rate,
        )?;

        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgba".into(),
            "-s".into(),
            format!("{}x{}", settings.width, settings.height),
            "-r".into(),
            settings.fps.to_string(),
            "-i".into(),
            "-".into(),
            "-an".into(),
            "-c:v".into(),
            encoders.video.into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
        ];
        if settings.video_bitrate_kbps > 0 {
            args.push("-b:v".into());
            args.push(format!("{}k", settings.video_bitrate_kbps));
        }
        args.push(video_path.to_string_lossy().into_owned());

        tracing::debug!(?args, "Starting ffmpeg video encoder");
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MawsooahError::export_encoding(format!("Failed to start ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MawsooahError::export_encoding("Failed to open ffmpeg stdin"))?;
        let stderr_task = child.stderr.take().map(drain_stderr);

        tracing::info!(
            pid = child.id(),
            video_encoder = encoders.video,
            audio_encoder = encoders.audio,
            "ffmpeg recorder started"
        );

        Ok(Box::new(FfmpegRecorder {
            binary: self.binary.clone(),
            settings: settings.clone(),
            encoders,
            child: Some(child),
            stdin: Some(BufWriter::new(stdin)),
            stderr_task,
            audio: Some(audio),
            video_path,
            audio_path,
            workdir,
            closed: ClosedSink,
        }))
    }
}

/// Read stderr on a separate thread so ffmpeg never blocks on a full pipe.
fn drain_stderr(stderr: std::process::ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut output = String::new();
        match reader.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    })
}

struct FfmpegRecorder {
    binary: PathBuf,
    settings: RecorderSettings,
    encoders: EncoderChoice,
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr_task: Option<JoinHandle<String>>,
    audio: Option<WavWriter<BufWriter<File>>>,
    video_path: PathBuf,
    audio_path: PathBuf,
    workdir: tempfile::TempDir,
    closed: ClosedSink,
}

/// Audio sink left behind once the WAV writer has been finalized.
struct ClosedSink;

impl AudioSink for ClosedSink {
    fn write_samples(&mut self, _samples: &[f32]) -> MawsooahResult<()> {
        Err(MawsooahError::export_encoding("audio sink is closed"))
    }
}

impl FfmpegRecorder {
    fn finish_video(&mut self) -> MawsooahResult<()> {
        // Closing stdin signals end of input.
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().map_err(|e| {
                MawsooahError::export_encoding(format!("Failed writing frame to ffmpeg: {e}"))
            })?;
        }
        let Some(mut child) = self.child.take() else {
            return Err(MawsooahError::export_encoding("ffmpeg already finished"));
        };
        let status = child
            .wait()
            .map_err(|e| MawsooahError::export_encoding(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = self
            .stderr_task
            .take()
            .and_then(|task| task.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(MawsooahError::export_encoding(format!(
                "ffmpeg video encode failed (status {status}): {}",
                stderr_output.trim()
            )));
        }
        Ok(())
    }

    fn mux(&self, output: &Path) -> MawsooahResult<()> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-i".into(),
            self.video_path.to_string_lossy().into_owned(),
            "-i".into(),
            self.audio_path.to_string_lossy().into_owned(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            self.encoders.audio.into(),
            "-b:a".into(),
            format!("{}k", self.settings.audio_bitrate_kbps.max(32)),
        ];
        if self.settings.format.container == Container::Mp4 {
            args.push("-movflags".into());
            args.push("+faststart".into());
        }
        args.push(output.to_string_lossy().into_owned());

        tracing::debug!(?args, "Muxing export");
        let result = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| MawsooahError::export_encoding(format!("Failed to start ffmpeg mux: {e}")))?;

        if !result.status.success() {
            return Err(MawsooahError::export_encoding(format!(
                "ffmpeg mux failed (status {}): {}",
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl Recorder for FfmpegRecorder {
    fn push_frame(&mut self, frame: &RgbaImage) -> MawsooahResult<()> {
        check_frame_size(frame, &self.settings)?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MawsooahError::export_encoding("ffmpeg input is closed"))?;
        stdin.write_all(frame.as_raw()).map_err(|e| {
            MawsooahError::export_encoding(format!("Failed writing frame to ffmpeg: {e}"))
        })
    }

    fn audio_sink(&mut self) -> &mut dyn AudioSink {
        match self.audio.as_mut() {
            Some(writer) => writer as &mut dyn AudioSink,
            None => &mut self.closed,
        }
    }

    fn finish(mut self: Box<Self>) -> MawsooahResult<Vec<u8>> {
        if let Some(audio) = self.audio.take() {
            audio
                .finalize()
                .and_then(|mut writer| writer.flush())
                .map_err(|e| {
                    MawsooahError::export_encoding(format!("Failed writing audio track: {e}"))
                })?;
        }
        self.finish_video()?;

        let output = self
            .workdir
            .path()
            .join(format!("output.{}", self.settings.format.extension()));
        self.mux(&output)?;
        let bytes = std::fs::read(&output).map_err(|e| {
            MawsooahError::export_encoding(format!("Failed reading encoded video: {e}"))
        })?;

        tracing::info!(bytes = bytes.len(), "ffmpeg recording finished");
        Ok(bytes)
    }

    fn abort(&mut self) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                tracing::debug!(error = %e, "ffmpeg already exited");
            }
            let _ = child.wait();
        }
        if let Some(task) = self.stderr_task.take() {
            let _ = task.join();
        }
        self.audio.take();
    }
}

// Stops ffmpeg when `finish` returned early with an error.
impl Drop for FfmpegRecorder {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.abort();
        }
    }
}
