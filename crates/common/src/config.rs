//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Live playback settings.
    #[serde(default)]
    pub playback: PlaybackDefaults,

    /// Video export settings.
    #[serde(default)]
    pub export: ExportDefaults,

    /// Subtitle rendering settings.
    #[serde(default)]
    pub subtitles: SubtitleDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default playback parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackDefaults {
    /// Sample rate of the decoded speech audio.
    pub sample_rate: u32,

    /// Display refresh rate driving `tick()` in the live loop.
    pub display_fps: u32,

    /// Subtitle track selected when a session opens
    /// (`off`, `original`, `msa`, `english`).
    pub subtitle_mode: String,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDefaults {
    /// Output width in pixels.
    pub width: u32,

    /// Output height in pixels.
    pub height: u32,

    /// Output frame rate.
    pub fps: u32,

    /// Prefix of exported file names (`<prefix>-<topic>.<ext>`).
    pub file_prefix: String,

    /// Directory exported videos are written to.
    pub output_dir: PathBuf,

    /// ffmpeg binary used by the ffmpeg recorder.
    pub ffmpeg_path: PathBuf,

    /// Video bitrate in kbps (0 = encoder default).
    pub video_bitrate_kbps: u32,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,

    /// Container/codec ids in preference order. Empty = built-in order.
    #[serde(default)]
    pub format_preference: Vec<String>,
}

/// Subtitle rendering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleDefaults {
    /// TrueType/OpenType font used for burned-in subtitles.
    pub font_path: Option<PathBuf>,

    /// Font size as a fraction of the frame height.
    pub font_scale: f32,

    /// Opacity of the band behind the text [0.0, 1.0].
    pub band_opacity: f32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "mawsooah=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            display_fps: 60,
            subtitle_mode: "original".to_string(),
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            file_prefix: "mawsooah".to_string(),
            output_dir: dirs_default_exports(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            video_bitrate_kbps: 0,
            audio_bitrate_kbps: 128,
            format_preference: Vec::new(),
        }
    }
}

impl Default for SubtitleDefaults {
    fn default() -> Self {
        Self {
            font_path: None,
            font_scale: 0.045,
            band_opacity: 0.5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("mawsooah").join("config.json")
}

/// Default export directory.
fn dirs_default_exports() -> PathBuf {
    let base = std::env::var("XDG_VIDEOS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join("Videos")
        });
    base.join("mawsooah")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_upstream_formats() {
        let config = AppConfig::default();
        assert_eq!(config.playback.sample_rate, 24_000);
        assert_eq!(config.playback.subtitle_mode, "original");
        assert_eq!((config.export.width, config.export.height), (1280, 720));
        assert_eq!(config.export.fps, 30);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.export.fps = 24;
        config.subtitles.font_path = Some(PathBuf::from("/fonts/Amiri.ttf"));
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.export.fps, 24);
        assert_eq!(
            loaded.subtitles.font_path.as_deref(),
            Some(Path::new("/fonts/Amiri.ttf"))
        );
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.export.fps, ExportDefaults::default().fps);
    }

    #[test]
    fn test_partial_file_fills_missing_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"logging":{"level":"debug","json":true,"file":null}}"#)
            .unwrap();

        let loaded = AppConfig::load_from(&path);
        assert!(loaded.logging.json);
        assert_eq!(loaded.playback.display_fps, 60);
    }
}
