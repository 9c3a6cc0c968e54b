//! Decoded segment images, keyed by blob fingerprint.
//!
//! Images shared by several segments are decoded once. A blob that fails to
//! decode is logged and left out of the cache; the compositor draws the
//! placeholder for it.

use std::collections::HashMap;
use std::sync::Arc;

use image::RgbaImage;

use mawsooah_common::error::{MawsooahError, MawsooahResult};
use mawsooah_processing_core::timeline_builder::Timeline;
use mawsooah_project_model::segment::MediaBlob;

/// Decode an image blob in any format `image` recognises.
pub fn decode_image(blob: &MediaBlob) -> MawsooahResult<RgbaImage> {
    let bytes = blob
        .bytes()
        .map_err(|e| MawsooahError::asset_load(format!("image blob unreadable: {e}")))?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| MawsooahError::asset_load(format!("image decode failed: {e}")))?;
    Ok(image.to_rgba8())
}

#[derive(Debug, Default, Clone)]
pub struct ImageCache {
    images: HashMap<u64, Arc<RgbaImage>>,
    failed: usize,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every distinct blob.
    pub fn preload<'a>(blobs: impl IntoIterator<Item = &'a MediaBlob>) -> Self {
        let mut cache = Self::new();
        let mut seen = std::collections::HashSet::new();
        for blob in blobs {
            let key = blob.fingerprint();
            if !seen.insert(key) {
                continue;
            }
            match decode_image(blob) {
                Ok(image) => {
                    cache.images.insert(key, Arc::new(image));
                }
                Err(e) => {
                    cache.failed += 1;
                    tracing::warn!(fingerprint = key, error = %e, "Using placeholder for image");
                }
            }
        }
        tracing::debug!(
            loaded = cache.images.len(),
            failed = cache.failed,
            "Images preloaded"
        );
        cache
    }

    /// Decode every distinct image used by `timeline`.
    pub fn preload_timeline(timeline: &Timeline) -> Self {
        Self::preload(timeline.timings().iter().map(|timing| timing.image()))
    }

    pub fn get(&self, blob: &MediaBlob) -> Option<&Arc<RgbaImage>> {
        self.images.get(&blob.fingerprint())
    }

    /// Number of images decoded successfully.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Number of distinct blobs that failed to decode.
    pub fn failed_count(&self) -> usize {
        self.failed
    }
}
