//! Ken Burns animation: slow pan/zoom over each segment's still image.
//!
//! Every segment gets one effect from a fixed table. Live preview picks
//! effects at random; export derives them from the segment start time so two
//! exports of the same timeline are frame-identical.
//!
//! The animation runs one second longer than the segment it belongs to, so
//! the image is still moving when the next segment cuts in.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use mawsooah_project_model::timeline::SegmentTiming;
use mawsooah_project_model::transform::Transform;

/// Extra animation time past the end of a segment, in seconds.
pub const OVERRUN_SECS: f64 = 1.0;

/// Peak zoom used by every effect.
pub const ZOOM_SCALE: f64 = 1.15;

/// Horizontal pan extent, as a fraction of surface width, either side of centre.
pub const PAN_EXTENT: f64 = 0.05;

/// The fixed effect table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KenBurnsEffect {
    ZoomIn,
    ZoomOut,
    PanRight,
    PanLeft,
}

impl KenBurnsEffect {
    /// Table order; the seeded selector indexes into it.
    pub const ALL: [KenBurnsEffect; 4] = [
        KenBurnsEffect::ZoomIn,
        KenBurnsEffect::ZoomOut,
        KenBurnsEffect::PanRight,
        KenBurnsEffect::PanLeft,
    ];

    /// Start and end transforms.
    pub fn endpoints(&self) -> (Transform, Transform) {
        match self {
            Self::ZoomIn => (Transform::IDENTITY, Transform::zoom(ZOOM_SCALE)),
            Self::ZoomOut => (Transform::zoom(ZOOM_SCALE), Transform::IDENTITY),
            Self::PanRight => (
                Transform::new(ZOOM_SCALE, -PAN_EXTENT, 0.0),
                Transform::new(ZOOM_SCALE, PAN_EXTENT, 0.0),
            ),
            Self::PanLeft => (
                Transform::new(ZOOM_SCALE, PAN_EXTENT, 0.0),
                Transform::new(ZOOM_SCALE, -PAN_EXTENT, 0.0),
            ),
        }
    }

    /// Transform at `progress` in `[0, 1]` (clamped).
    pub fn transform_at(&self, progress: f64) -> Transform {
        let (from, to) = self.endpoints();
        Transform::lerp(&from, &to, progress)
    }
}

/// One effect stretched over a segment's animation span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KenBurnsAnimation {
    pub effect: KenBurnsEffect,
    /// Animation span in seconds (segment duration plus overrun).
    pub span_secs: f64,
}

impl KenBurnsAnimation {
    pub fn new(effect: KenBurnsEffect, segment_duration: f64) -> Self {
        Self {
            effect,
            span_secs: segment_duration.max(0.0) + OVERRUN_SECS,
        }
    }

    /// Animation for a timed segment.
    pub fn for_timing(effect: KenBurnsEffect, timing: &SegmentTiming) -> Self {
        Self::new(effect, timing.duration())
    }

    /// Progress after `local_secs` inside the segment.
    pub fn progress(&self, local_secs: f64) -> f64 {
        (local_secs / self.span_secs).clamp(0.0, 1.0)
    }

    /// Transform after `local_secs` inside the segment.
    pub fn transform_at(&self, local_secs: f64) -> Transform {
        self.effect.transform_at(self.progress(local_secs))
    }
}

/// Chooses the effect shown for a segment.
pub trait EffectSelector: Send {
    fn select(&mut self, timing: &SegmentTiming) -> KenBurnsEffect;
}

/// Uniform random choice. Used for live preview, not reproducible.
#[derive(Debug)]
pub struct RandomEffectSelector {
    rng: StdRng,
}

impl RandomEffectSelector {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// A reproducible sequence, for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomEffectSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectSelector for RandomEffectSelector {
    fn select(&mut self, _timing: &SegmentTiming) -> KenBurnsEffect {
        KenBurnsEffect::ALL[self.rng.gen_range(0..KenBurnsEffect::ALL.len())]
    }
}

/// Deterministic choice from the segment start: `floor(start * 100) mod 4`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeededEffectSelector;

impl SeededEffectSelector {
    pub fn effect_for_start(start_secs: f64) -> KenBurnsEffect {
        let seed = (start_secs.max(0.0) * 100.0).floor() as u64;
        KenBurnsEffect::ALL[(seed % KenBurnsEffect::ALL.len() as u64) as usize]
    }
}

impl EffectSelector for SeededEffectSelector {
    fn select(&mut self, timing: &SegmentTiming) -> KenBurnsEffect {
        Self::effect_for_start(timing.start)
    }
}
