//! Pan/zoom transform applied on top of the cover-fitted image.
//!
//! Translation is expressed as a fraction of the surface size so the same
//! transform reads identically on a square preview and a 1280×720 export.

use serde::{Deserialize, Serialize};

/// Additional scale and translation, anchored at the surface centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Zoom relative to the cover fit (1.0 = exact cover).
    pub scale: f64,
    /// Horizontal shift, as a fraction of surface width (positive = right).
    pub translate_x: f64,
    /// Vertical shift, as a fraction of surface height (positive = down).
    pub translate_y: f64,
}

impl Transform {
    /// No extra zoom, no shift.
    pub const IDENTITY: Transform = Transform {
        scale: 1.0,
        translate_x: 0.0,
        translate_y: 0.0,
    };

    /// Create a transform. Scale is clamped to at least 1% to keep the
    /// inverse mapping finite.
    pub fn new(scale: f64, translate_x: f64, translate_y: f64) -> Self {
        Self {
            scale: scale.max(0.01),
            translate_x,
            translate_y,
        }
    }

    /// Uniform zoom without translation.
    pub fn zoom(scale: f64) -> Self {
        Self::new(scale, 0.0, 0.0)
    }

    /// Linearly interpolate between two transforms.
    pub fn lerp(a: &Transform, b: &Transform, t: f64) -> Transform {
        let t = t.clamp(0.0, 1.0);
        Transform {
            scale: a.scale + (b.scale - a.scale) * t,
            translate_x: a.translate_x + (b.translate_x - a.translate_x) * t,
            translate_y: a.translate_y + (b.translate_y - a.translate_y) * t,
        }
    }

    /// Translation in surface pixels.
    pub fn offset_px(&self, surface_width: u32, surface_height: u32) -> (f64, f64) {
        (
            self.translate_x * surface_width as f64,
            self.translate_y * surface_height as f64,
        )
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
