//! Frame compositor: image, Ken Burns transform, and subtitle band.
//!
//! Every frame is drawn from scratch onto an RGBA surface:
//!
//! 1. Clear to black.
//! 2. Draw the segment image scaled to cover the surface, then apply the
//!    transform's extra scale and translation around the surface centre.
//!    Pixels are inverse-mapped and sampled bilinearly, so the output only
//!    depends on the inputs (two renders of the same frame are identical).
//! 3. Draw the subtitle, if any, as wrapped centred text over a translucent
//!    band near the bottom.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::{FontVec, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size, Blend};
use imageproc::rect::Rect;

use mawsooah_common::config::SubtitleDefaults;
use mawsooah_common::error::{MawsooahError, MawsooahResult};
use mawsooah_project_model::transform::Transform;

/// Background left around (and under) the image.
pub const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Fill used when a segment image is missing or failed to decode.
pub const PLACEHOLDER: Rgba<u8> = Rgba([38, 38, 46, 255]);

const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Fraction of the surface width available to subtitle text.
const TEXT_WIDTH_FRACTION: f32 = 0.9;

/// Gap between the band and the bottom edge, as a fraction of height.
const BOTTOM_MARGIN_FRACTION: f32 = 0.05;

const LINE_SPACING: f32 = 1.25;

/// Fonts tried, in order, when no subtitle font is configured or the
/// configured one fails to load.
pub const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/noto/NotoNaskhArabic-Regular.ttf",
    "/usr/share/fonts/noto/NotoNaskhArabic-Regular.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// How subtitles are drawn.
#[derive(Clone)]
pub struct SubtitleStyle {
    /// Font for subtitle text. Without one no subtitles are drawn.
    pub font: Option<Arc<FontVec>>,
    /// Font size as a fraction of surface height.
    pub font_scale: f32,
    /// Band opacity in `[0, 1]`.
    pub band_opacity: f32,
}

impl fmt::Debug for SubtitleStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubtitleStyle")
            .field("font", &self.font.as_ref().map(|_| "<font>"))
            .field("font_scale", &self.font_scale)
            .field("band_opacity", &self.band_opacity)
            .finish()
    }
}

/// Font-less style with default sizing. Use [`SubtitleStyle::from_config`]
/// to pick up a font.
impl Default for SubtitleStyle {
    fn default() -> Self {
        let defaults = SubtitleDefaults::default();
        Self {
            font: None,
            font_scale: defaults.font_scale,
            band_opacity: defaults.band_opacity,
        }
    }
}

impl SubtitleStyle {
    /// Build a style from configuration.
    ///
    /// The configured font is tried first, then [`SYSTEM_FONT_CANDIDATES`].
    /// Fonts that fail to load are logged and skipped.
    pub fn from_config(config: &SubtitleDefaults) -> Self {
        if let Some(path) = config.font_path.as_deref().filter(|path| !path.exists()) {
            tracing::warn!(path = %path.display(), "Configured subtitle font not found");
        }
        let font = find_font(&font_candidates(config)).map(|(path, font)| {
            tracing::debug!(path = %path.display(), "Subtitle font loaded");
            font
        });
        Self {
            font,
            font_scale: config.font_scale,
            band_opacity: config.band_opacity,
        }
    }

    /// Use the given font data.
    pub fn with_font_bytes(mut self, bytes: Vec<u8>) -> MawsooahResult<Self> {
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| MawsooahError::config(format!("Invalid subtitle font: {e}")))?;
        self.font = Some(Arc::new(font));
        Ok(self)
    }

    fn font_px(&self, surface_height: u32) -> f32 {
        (surface_height as f32 * self.font_scale).max(8.0)
    }

    fn band_alpha(&self) -> u8 {
        (self.band_opacity.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

fn font_candidates(config: &SubtitleDefaults) -> Vec<PathBuf> {
    config
        .font_path
        .iter()
        .cloned()
        .chain(SYSTEM_FONT_CANDIDATES.iter().map(PathBuf::from))
        .collect()
}

/// First candidate that exists and parses as a font.
fn find_font(candidates: &[PathBuf]) -> Option<(PathBuf, Arc<FontVec>)> {
    candidates.iter().filter(|path| path.exists()).find_map(|path| {
        load_font(path)
            .map_err(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Subtitle font unavailable")
            })
            .ok()
            .map(|font| (path.clone(), font))
    })
}

fn load_font(path: &Path) -> MawsooahResult<Arc<FontVec>> {
    let bytes = std::fs::read(path)?;
    FontVec::try_from_vec(bytes)
        .map(Arc::new)
        .map_err(|e| MawsooahError::config(format!("Invalid subtitle font: {e}")))
}

/// Draws frames. Shared between live playback and export.
#[derive(Debug)]
pub struct FrameCompositor {
    style: SubtitleStyle,
}

impl Default for FrameCompositor {
    fn default() -> Self {
        Self::new(SubtitleStyle::default())
    }
}

impl FrameCompositor {
    /// Without a font in `style`, subtitles are skipped and a warning is
    /// logged here once.
    pub fn new(style: SubtitleStyle) -> Self {
        if style.font.is_none() {
            tracing::warn!("No subtitle font available; subtitles will not be drawn");
        }
        Self { style }
    }

    pub fn style(&self) -> &SubtitleStyle {
        &self.style
    }

    pub fn has_font(&self) -> bool {
        self.style.font.is_some()
    }

    /// Draw one frame onto `surface`.
    ///
    /// `image` of `None` draws the placeholder fill. `subtitle` of `None` (or
    /// blank text) draws no band.
    pub fn render(
        &self,
        surface: &mut RgbaImage,
        image: Option<&RgbaImage>,
        transform: &Transform,
        subtitle: Option<&str>,
    ) {
        match image {
            Some(image) if image.width() > 0 && image.height() > 0 => {
                fill(surface, BACKGROUND);
                draw_cover(surface, image, transform);
            }
            _ => fill(surface, PLACEHOLDER),
        }

        if let Some(text) = subtitle.map(str::trim).filter(|t| !t.is_empty()) {
            self.draw_subtitle(surface, text);
        }
    }

    fn draw_subtitle(&self, surface: &mut RgbaImage, text: &str) {
        let Some(font) = self.style.font.as_deref() else {
            return;
        };
        let (width, height) = surface.dimensions();
        if width == 0 || height == 0 {
            return;
        }

        let px = self.style.font_px(height);
        let scale = PxScale::from(px);
        let max_width = (width as f32 * TEXT_WIDTH_FRACTION) as u32;
        let line_height = px * LINE_SPACING;
        let padding = px * 0.5;

        let lines = wrap_lines(font, scale, text, max_width);
        let text_width = lines
            .iter()
            .map(|line| text_size(scale, font, line).0)
            .max()
            .unwrap_or(0);

        let band_width = ((text_width as f32 + padding * 2.0) as u32).min(width);
        let band_height = ((lines.len() as f32 * line_height + padding * 2.0) as u32).min(height);
        let band_x = (width - band_width) / 2;
        let margin = (height as f32 * BOTTOM_MARGIN_FRACTION) as u32;
        let band_y = height.saturating_sub(band_height + margin);

        if band_width > 0 && band_height > 0 {
            let mut blend = Blend(std::mem::take(surface));
            draw_filled_rect_mut(
                &mut blend,
                Rect::at(band_x as i32, band_y as i32).of_size(band_width, band_height),
                Rgba([0, 0, 0, self.style.band_alpha()]),
            );
            *surface = blend.0;
        }

        // Glyphs are laid out left to right without shaping.
        for (i, line) in lines.iter().enumerate() {
            let (line_width, _) = text_size(scale, font, line);
            let x = (width as i32 - line_width as i32) / 2;
            let y = band_y as f32 + padding + i as f32 * line_height;
            draw_text_mut(surface, TEXT_COLOR, x, y as i32, scale, font, line);
        }
    }
}

fn fill(surface: &mut RgbaImage, color: Rgba<u8>) {
    for pixel in surface.pixels_mut() {
        *pixel = color;
    }
}

/// Scale that makes an `iw × ih` image cover a `sw × sh` surface.
pub fn cover_scale(surface: (u32, u32), image: (u32, u32)) -> f64 {
    let (sw, sh) = (surface.0 as f64, surface.1 as f64);
    let (iw, ih) = (image.0.max(1) as f64, image.1.max(1) as f64);
    (sw / iw).max(sh / ih)
}

fn draw_cover(surface: &mut RgbaImage, image: &RgbaImage, transform: &Transform) {
    let (sw, sh) = surface.dimensions();
    let (iw, ih) = image.dimensions();
    let scale = cover_scale((sw, sh), (iw, ih)) * transform.scale;
    let (dx, dy) = transform.offset_px(sw, sh);
    let (cx, cy) = (sw as f64 / 2.0 + dx, sh as f64 / 2.0 + dy);
    let (icx, icy) = (iw as f64 / 2.0, ih as f64 / 2.0);

    for (x, y, pixel) in surface.enumerate_pixels_mut() {
        let u = (x as f64 + 0.5 - cx) / scale + icx - 0.5;
        let v = (y as f64 + 0.5 - cy) / scale + icy - 0.5;
        if let Some(sample) = sample_bilinear(image, u, v) {
            *pixel = sample;
        }
    }
}

/// Bilinear sample at pixel-centre coordinates. `None` outside the image.
fn sample_bilinear(image: &RgbaImage, u: f64, v: f64) -> Option<Rgba<u8>> {
    let (w, h) = image.dimensions();
    if u < -0.5 || v < -0.5 || u > w as f64 - 0.5 || v > h as f64 - 0.5 {
        return None;
    }

    let u = u.clamp(0.0, (w - 1) as f64);
    let v = v.clamp(0.0, (h - 1) as f64);
    let x0 = u.floor() as u32;
    let y0 = v.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = u - x0 as f64;
    let fy = v - y0 as f64;

    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgba(out))
}

/// Greedy word wrap to `max_width` pixels. A single word wider than the
/// limit gets a line of its own.
fn wrap_lines(font: &FontVec, scale: PxScale, text: &str, max_width: u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{current} {word}");
        if text_size(scale, font, &candidate).0 <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
