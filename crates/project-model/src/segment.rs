//! Segment types supplied by the segment source.
//!
//! A segment is immutable once received. Media payloads arrive either as
//! raw bytes or as the base64 text used on the upstream wire
//! (`audioBase64` / `imageBase64`); [`MediaBlob`] keeps whichever form it was
//! given and decodes lazily.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hash::Fnv1a;

/// Errors produced when unwrapping a [`MediaBlob`].
#[derive(Debug, thiserror::Error)]
pub enum MediaBlobError {
    #[error("blob is empty")]
    Empty,

    #[error("blob is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// An opaque encoded media payload.
#[derive(Clone, PartialEq, Eq)]
pub enum MediaBlob {
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Base64 text, as delivered by the upstream generation service.
    Base64(String),
}

impl MediaBlob {
    /// Wrap raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into())
    }

    /// Wrap base64 text.
    pub fn from_base64(text: impl Into<String>) -> Self {
        Self::Base64(text.into())
    }

    /// Whether the blob carries no payload at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Base64(text) => text.trim().is_empty(),
        }
    }

    /// The decoded payload bytes. Raw blobs are borrowed, base64 blobs are
    /// decoded into a fresh buffer.
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>, MediaBlobError> {
        let bytes = match self {
            Self::Bytes(bytes) => Cow::Borrowed(bytes.as_slice()),
            Self::Base64(text) => Cow::Owned(STANDARD.decode(text.trim())?),
        };
        if bytes.is_empty() {
            return Err(MediaBlobError::Empty);
        }
        Ok(bytes)
    }

    /// Stable 64-bit FNV-1a fingerprint of the blob as stored.
    ///
    /// Two blobs with the same representation share a fingerprint; this is
    /// used to deduplicate images shared by several segments.
    pub fn fingerprint(&self) -> u64 {
        let (tag, payload): (u8, &[u8]) = match self {
            Self::Bytes(bytes) => (0, bytes),
            Self::Base64(text) => (1, text.as_bytes()),
        };
        Fnv1a::new().update(&[tag]).update(payload).finish()
    }

    /// Length of the stored representation in bytes.
    pub fn stored_len(&self) -> usize {
        match self {
            Self::Bytes(bytes) => bytes.len(),
            Self::Base64(text) => text.len(),
        }
    }
}

impl Default for MediaBlob {
    fn default() -> Self {
        Self::Bytes(Vec::new())
    }
}

impl fmt::Debug for MediaBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "MediaBlob::Bytes({} bytes)", bytes.len()),
            Self::Base64(text) => write!(f, "MediaBlob::Base64({} chars)", text.len()),
        }
    }
}

impl Serialize for MediaBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bytes(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            Self::Base64(text) => serializer.serialize_str(text),
        }
    }
}

impl<'de> Deserialize<'de> for MediaBlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::Base64)
    }
}

/// One atomic unit of narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Primary transcript line, in the narration dialect.
    pub text: String,

    /// Modern Standard Arabic translation.
    #[serde(rename = "textMSA", default, skip_serializing_if = "Option::is_none")]
    pub text_msa: Option<String>,

    /// English translation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_en: Option<String>,

    /// Prompt the illustration was generated from.
    #[serde(default)]
    pub visual_prompt: String,

    /// Speech audio: headerless 16-bit little-endian mono PCM.
    #[serde(rename = "audioBase64", alias = "audio")]
    pub audio: MediaBlob,

    /// Illustration in any common still-image format.
    #[serde(rename = "imageBase64", alias = "image")]
    pub image: MediaBlob,
}

impl Segment {
    /// Create a segment with only the primary transcript.
    pub fn new(text: impl Into<String>, audio: MediaBlob, image: MediaBlob) -> Self {
        Self {
            text: text.into(),
            text_msa: None,
            text_en: None,
            visual_prompt: String::new(),
            audio,
            image,
        }
    }

    /// Attach translations.
    pub fn with_translations(mut self, msa: Option<String>, english: Option<String>) -> Self {
        self.text_msa = msa;
        self.text_en = english;
        self
    }

    /// Transcript line selected by `mode`, if present and non-blank.
    pub fn subtitle(&self, mode: SubtitleMode) -> Option<&str> {
        let text = match mode {
            SubtitleMode::Off => None,
            SubtitleMode::Original => Some(self.text.as_str()),
            SubtitleMode::Msa => self.text_msa.as_deref(),
            SubtitleMode::English => self.text_en.as_deref(),
        }?;
        let trimmed = text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Which transcript field is rendered as subtitles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleMode {
    Off,
    #[default]
    Original,
    Msa,
    English,
}

impl SubtitleMode {
    /// Menu order offered to users.
    pub const ALL: [SubtitleMode; 4] = [
        SubtitleMode::Original,
        SubtitleMode::Msa,
        SubtitleMode::English,
        SubtitleMode::Off,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Original => "original",
            Self::Msa => "msa",
            Self::English => "english",
        }
    }
}

impl fmt::Display for SubtitleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown subtitle mode name.
#[derive(Debug, thiserror::Error)]
#[error("unknown subtitle mode: {0}")]
pub struct ParseSubtitleModeError(String);

impl FromStr for SubtitleMode {
    type Err = ParseSubtitleModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "original" => Ok(Self::Original),
            "msa" => Ok(Self::Msa),
            "english" | "en" => Ok(Self::English),
            other => Err(ParseSubtitleModeError(other.to_string())),
        }
    }
}
