//! Mawsooah Render Engine
//!
//! Draws frames and turns a timeline into a single video file.
//!
//! # Pipeline Architecture
//!
//! ```text
//! segment images ──► ImageCache ──┐
//!                                 ├── FrameCompositor (cover + Ken Burns + subtitles)
//! timeline timings ───────────────┘          │
//!                                            ▼
//! master audio ──► OfflineAudioSession ──► Recorder (ffmpeg / memory)
//!                   (export clock)                │
//!                                                 ▼
//!                                    mawsooah-<topic>.mp4 / .webm
//! ```

pub mod assets;
pub mod compositor;
pub mod export;
pub mod formats;
pub mod recorder;

pub use assets::ImageCache;
pub use compositor::{FrameCompositor, SubtitleStyle};
pub use export::*;
pub use formats::{negotiate, Container, VideoFormat};
pub use recorder::{FfmpegRecorderBackend, MemoryRecorderBackend, Recorder, RecorderBackend};
