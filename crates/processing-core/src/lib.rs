//! Mawsooah Processing Core
//!
//! Turns an ordered list of segments into something playable:
//! - **Timeline Builder:** Decode every segment and lay the speech out on
//!   one master track with contiguous per-segment timings
//! - **Ken Burns:** The pan/zoom effect table and the selectors that pick an
//!   effect per segment (random for live preview, seeded for export)
//!
//! Decoding aside, this crate is pure computation.

pub mod ken_burns;
pub mod timeline_builder;

pub use ken_burns::{
    EffectSelector, KenBurnsAnimation, KenBurnsEffect, RandomEffectSelector, SeededEffectSelector,
};
pub use timeline_builder::{build_timeline, build_timeline_blocking, Timeline};
