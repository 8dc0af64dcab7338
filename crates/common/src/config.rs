//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory for transient files such as the script preview log.
    pub cache_dir: PathBuf,

    /// External tool locations.
    pub tools: ToolPaths,

    /// Range render and display timing.
    pub render: RenderTiming,

    /// Profile catalog settings.
    pub profiles: ProfileConfig,

    /// External-script renderer settings.
    pub script: ScriptConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Paths (or bare names resolved through `PATH`) of the external tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub gmic: PathBuf,
}

/// Timing knobs for the range writer and the display consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderTiming {
    /// Interval between progress callbacks while a range render runs.
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for the encoder to flush after the last frame.
    pub settle_timeout_ms: u64,

    /// Maximum redraw rate of the display consumer.
    pub display_fps_cap: u32,
}

/// Profile catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Name of the profile clips are opened with before matching.
    pub default_profile: String,

    /// Profiles appended to the built-in catalog.
    pub extra: Vec<ProfileDefinition>,
}

/// Serialized form of a user-defined profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate_num: u32,
    pub frame_rate_den: u32,
    #[serde(default = "one")]
    pub sample_aspect_num: u32,
    #[serde(default = "one")]
    pub sample_aspect_den: u32,
    pub display_aspect_num: u32,
    pub display_aspect_den: u32,
    #[serde(default = "yes")]
    pub progressive: bool,
}

fn one() -> u32 {
    1
}

fn yes() -> bool {
    true
}

/// Order in which the script renderer visits frames in a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOrder {
    /// Sort by the number embedded in each file name.
    #[default]
    Numeric,
    /// Keep whatever order the directory listing returns.
    Listing,
}

/// External-script renderer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// File name (inside `cache_dir`) receiving the first frame's tool output.
    pub log_file_name: String,

    /// Frame visiting order.
    pub frame_order: FrameOrder,

    /// Minimum digit count of output frame numbers.
    pub number_width: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "clipframe=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: dirs_default_cache(),
            tools: ToolPaths::default(),
            render: RenderTiming::default(),
            profiles: ProfileConfig::default(),
            script: ScriptConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            gmic: PathBuf::from("gmic"),
        }
    }
}

impl Default for RenderTiming {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            settle_timeout_ms: 2000,
            display_fps_cap: 60,
        }
    }
}

impl RenderTiming {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            default_profile: "atsc_1080p_25".to_string(),
            extra: Vec::new(),
        }
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            log_file_name: "log_gmic_preview".to_string(),
            frame_order: FrameOrder::Numeric,
            number_width: 3,
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
    pub fn load_from(config_path: &std::path::Path) -> Self {
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
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Location of the script renderer's first-frame log.
    pub fn script_log_path(&self) -> PathBuf {
        self.cache_dir.join(&self.script.log_file_name)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    base.join("clipframe").join("config.json")
}

/// Default cache directory.
fn dirs_default_cache() -> PathBuf {
    let base = std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".cache"));
    base.join("clipframe")
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_render_cadence() {
        let config = AppConfig::default();
        assert_eq!(config.render.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.render.settle_timeout(), Duration::from_secs(2));
        assert_eq!(config.script.number_width, 3);
        assert!(config.script_log_path().ends_with("log_gmic_preview"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{ "render": { "poll_interval_ms": 10 }, "script": { "frame_order": "listing" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.render.poll_interval_ms, 10);
        assert_eq!(config.render.settle_timeout_ms, 2000);
        assert_eq!(config.script.frame_order, FrameOrder::Listing);
        assert_eq!(config.profiles.default_profile, "atsc_1080p_25");
    }

    #[test]
    fn test_save_and_load_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.tools.gmic = PathBuf::from("/opt/gmic/bin/gmic");
        config.profiles.extra.push(ProfileDefinition {
            name: "square_480".to_string(),
            description: "Square 480".to_string(),
            width: 480,
            height: 480,
            frame_rate_num: 30,
            frame_rate_den: 1,
            sample_aspect_num: 1,
            sample_aspect_den: 1,
            display_aspect_num: 1,
            display_aspect_den: 1,
            progressive: true,
        });
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.tools.gmic, PathBuf::from("/opt/gmic/bin/gmic"));
        assert_eq!(loaded.profiles.extra, config.profiles.extra);
    }

    #[test]
    fn test_unparseable_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.render.poll_interval_ms, 50);
    }
}
