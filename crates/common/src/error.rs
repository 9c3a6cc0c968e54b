//! Error types shared across Mawsooah crates.

/// Top-level error type for Mawsooah operations.
#[derive(Debug, thiserror::Error)]
pub enum MawsooahError {
    /// An audio blob is empty or not valid byte data.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// No segments are available; playback and export must not start.
    #[error("Timeline is empty: no segments to play or export")]
    EmptyTimeline,

    /// No supported recording container/codec in the current runtime.
    #[error("Export not supported here: {message}")]
    ExportUnsupported { message: String },

    /// The recording session failed mid-capture.
    #[error("Export encoding error: {message}")]
    ExportEncoding { message: String },

    #[error("Export cancelled")]
    ExportCancelled,

    /// An individual image could not be loaded. Soft: callers log it and
    /// render a placeholder.
    #[error("Asset load error: {message}")]
    AssetLoad { message: String },

    #[error("Playback error: {message}")]
    Playback { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using MawsooahError.
pub type MawsooahResult<T> = Result<T, MawsooahError>;

impl MawsooahError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn export_unsupported(msg: impl Into<String>) -> Self {
        Self::ExportUnsupported {
            message: msg.into(),
        }
    }

    pub fn export_encoding(msg: impl Into<String>) -> Self {
        Self::ExportEncoding {
            message: msg.into(),
        }
    }

    pub fn asset_load(msg: impl Into<String>) -> Self {
        Self::AssetLoad {
            message: msg.into(),
        }
    }

    pub fn playback(msg: impl Into<String>) -> Self {
        Self::Playback {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether the failure concerns non-essential data that callers are
    /// expected to recover from locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AssetLoad { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            MawsooahError::decode("empty blob").to_string(),
            "Decode error: empty blob"
        );
        assert!(MawsooahError::EmptyTimeline
            .to_string()
            .contains("no segments"));
        assert!(MawsooahError::export_unsupported("no codecs")
            .to_string()
            .starts_with("Export not supported here"));
    }

    #[test]
    fn test_only_asset_errors_are_recoverable() {
        assert!(MawsooahError::asset_load("bad png").is_recoverable());
        assert!(!MawsooahError::decode("bad pcm").is_recoverable());
        assert!(!MawsooahError::export_encoding("pipe closed").is_recoverable());
    }
}
