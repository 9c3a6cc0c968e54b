//! Mawsooah Project Model
//!
//! Defines the core data contracts shared by playback and export:
//! - **Segments:** One narration unit (transcripts, speech audio, image)
//! - **Timings:** The per-segment time windows of the merged timeline
//! - **Transforms:** Pan/zoom state applied to a displayed image
//!
//! Everything here is plain data. Decoding, scheduling, and rendering live
//! in the crates that consume these types.

pub mod hash;
pub mod segment;
pub mod timeline;
pub mod transform;

pub use hash::fnv1a_64;
pub use segment::*;
pub use timeline::*;
pub use transform::*;
