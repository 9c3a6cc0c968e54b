//! Output container and codec negotiation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use mawsooah_common::error::{MawsooahError, MawsooahResult};

use crate::recorder::RecorderBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Webm,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Vp9,
    Vp8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Opus,
}

/// A container with optionally pinned codecs. Unpinned codecs are left to
/// the backend's default for the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoFormat {
    pub container: Container,
    pub video: Option<VideoCodec>,
    pub audio: Option<AudioCodec>,
}

impl VideoFormat {
    pub const MP4_H264_AAC: VideoFormat = VideoFormat {
        container: Container::Mp4,
        video: Some(VideoCodec::H264),
        audio: Some(AudioCodec::Aac),
    };
    pub const MP4: VideoFormat = VideoFormat {
        container: Container::Mp4,
        video: None,
        audio: None,
    };
    pub const WEBM_VP9_OPUS: VideoFormat = VideoFormat {
        container: Container::Webm,
        video: Some(VideoCodec::Vp9),
        audio: Some(AudioCodec::Opus),
    };
    pub const WEBM_VP8_OPUS: VideoFormat = VideoFormat {
        container: Container::Webm,
        video: Some(VideoCodec::Vp8),
        audio: Some(AudioCodec::Opus),
    };
    pub const WEBM: VideoFormat = VideoFormat {
        container: Container::Webm,
        video: None,
        audio: None,
    };

    /// Built-in preference order, most compatible first.
    pub const PREFERENCE: [VideoFormat; 5] = [
        Self::MP4_H264_AAC,
        Self::MP4,
        Self::WEBM_VP9_OPUS,
        Self::WEBM_VP8_OPUS,
        Self::WEBM,
    ];

    pub fn extension(&self) -> &'static str {
        self.container.extension()
    }

    /// MIME type including codec parameters when codecs are pinned.
    pub fn mime_type(&self) -> String {
        let codecs: Vec<&str> = [
            self.video.map(|v| match v {
                VideoCodec::H264 => "avc1",
                VideoCodec::Vp9 => "vp9",
                VideoCodec::Vp8 => "vp8",
            }),
            self.audio.map(|a| match a {
                AudioCodec::Aac => "mp4a",
                AudioCodec::Opus => "opus",
            }),
        ]
        .into_iter()
        .flatten()
        .collect();

        if codecs.is_empty() {
            self.container.mime_type().to_string()
        } else {
            format!("{};codecs={}", self.container.mime_type(), codecs.join(","))
        }
    }

    /// Parse a configured preference list. Unknown names are logged and
    /// skipped; an empty result falls back to [`VideoFormat::PREFERENCE`].
    pub fn preference_from_names(names: &[String]) -> Vec<VideoFormat> {
        let parsed: Vec<VideoFormat> = names
            .iter()
            .filter_map(|name| {
                name.parse::<VideoFormat>()
                    .map_err(|e: MawsooahError| tracing::warn!(error = %e, "Ignoring export format"))
                    .ok()
            })
            .collect();
        if parsed.is_empty() {
            Self::PREFERENCE.to_vec()
        } else {
            parsed
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.container.extension())?;
        if let Some(video) = self.video {
            let name = match video {
                VideoCodec::H264 => "h264",
                VideoCodec::Vp9 => "vp9",
                VideoCodec::Vp8 => "vp8",
            };
            write!(f, "-{name}")?;
        }
        if let Some(audio) = self.audio {
            let name = match audio {
                AudioCodec::Aac => "aac",
                AudioCodec::Opus => "opus",
            };
            write!(f, "-{name}")?;
        }
        Ok(())
    }
}

impl FromStr for VideoFormat {
    type Err = MawsooahError;

    /// Accepts the `Display` form, e.g. `mp4-h264-aac`, `webm`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::PREFERENCE
            .into_iter()
            .find(|format| format.to_string() == normalized)
            .ok_or_else(|| MawsooahError::config(format!("unknown export format: {s}")))
    }
}

/// Pick the first format in `preference` the backend can produce.
///
/// Nothing is allocated here; callers negotiate before opening any audio
/// session or recorder.
pub fn negotiate(
    preference: &[VideoFormat],
    backend: &dyn RecorderBackend,
) -> MawsooahResult<VideoFormat> {
    let chosen = preference
        .iter()
        .copied()
        .find(|format| backend.supports(format));

    match chosen {
        Some(format) => {
            tracing::info!(backend = backend.name(), %format, "Export format negotiated");
            Ok(format)
        }
        None => Err(MawsooahError::export_unsupported(format!(
            "{} backend supports none of: {}",
            backend.name(),
            preference
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::MemoryRecorderBackend;

    #[test]
    fn test_display_and_parse() {
        for format in VideoFormat::PREFERENCE {
            assert_eq!(format.to_string().parse::<VideoFormat>().unwrap(), format);
        }
        assert_eq!(VideoFormat::MP4_H264_AAC.to_string(), "mp4-h264-aac");
        assert_eq!(" WebM ".parse::<VideoFormat>().unwrap(), VideoFormat::WEBM);
        assert!("avi".parse::<VideoFormat>().is_err());
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(VideoFormat::MP4.mime_type(), "video/mp4");
        assert_eq!(
            VideoFormat::WEBM_VP9_OPUS.mime_type(),
            "video/webm;codecs=vp9,opus"
        );
    }

    #[test]
    fn test_preference_from_names() {
        let names = vec!["webm-vp8-opus".to_string(), "bogus".to_string()];
        assert_eq!(
            VideoFormat::preference_from_names(&names),
            vec![VideoFormat::WEBM_VP8_OPUS]
        );
        assert_eq!(
            VideoFormat::preference_from_names(&[]),
            VideoFormat::PREFERENCE.to_vec()
        );
    }

    #[test]
    fn test_negotiate_picks_first_supported() {
        let backend = MemoryRecorderBackend::supporting(vec![
            VideoFormat::WEBM_VP8_OPUS,
            VideoFormat::WEBM,
        ]);
        assert_eq!(
            negotiate(&VideoFormat::PREFERENCE, &backend).unwrap(),
            VideoFormat::WEBM_VP8_OPUS
        );
    }

    #[test]
    fn test_negotiate_fails_when_nothing_supported() {
        let backend = MemoryRecorderBackend::supporting(Vec::new());
        let err = negotiate(&VideoFormat::PREFERENCE, &backend).unwrap_err();
        assert!(matches!(err, MawsooahError::ExportUnsupported { .. }));
    }
}
