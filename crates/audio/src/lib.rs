//! Mawsooah Audio
//!
//! Everything that touches speech audio:
//! - **Decoding:** Headerless 16-bit PCM blobs into float sample buffers
//! - **WAV:** Encoding the merged narration for download and muxing
//! - **Sessions:** Owned, scoped audio-rendering sessions for live playback
//!   and for offline export, with a tracker that enforces one active session

pub mod decoder;
pub mod offline;
pub mod session;
pub mod wav;

#[cfg(feature = "gstreamer")]
pub mod gst_output;

pub use decoder::*;
pub use offline::OfflineAudioSession;
pub use session::*;
