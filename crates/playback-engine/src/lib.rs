//! Mawsooah Playback Engine
//!
//! Plays a built timeline live: one audio session at a time, a clock-driven
//! cursor, segment change notifications and Ken Burns framing for the
//! segment on screen.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                PlaybackSession                 │
//! │  ┌────────────┐  ┌───────────┐  ┌───────────┐  │
//! │  │ AudioOutput│  │ MediaClock│  │ Effect    │  │
//! │  │ (session)  │  │ reference │  │ Selector  │  │
//! │  └─────┬──────┘  └─────┬─────┘  └─────┬─────┘  │
//! │        │   tick()      ▼              │        │
//! │        │        cursor ─► active ─────┘        │
//! │        │                segment                │
//! │        ▼                   │                   │
//! │   speakers          observers + FrameCompositor│
//! └───────────────────────────────────────────────┘
//!            ▲
//!            │ once per display frame
//!      run_frame_loop (tokio interval)
//! ```

pub mod frame_loop;
pub mod session;

pub use frame_loop::{run_frame_loop, SharedSession};
pub use session::*;
