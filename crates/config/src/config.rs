//! Core settings structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory name used under the platform configuration directory
pub const APP_DIR_NAME: &str = "rtmp-restream";

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading or writing the settings file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// TOML serialization error
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to access settings file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse settings: {}", e),
            ConfigError::Serialize(e) => write!(f, "Failed to serialize settings: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        ConfigError::Serialize(e)
    }
}

/// Encoder executable location
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EncoderConfig {
    /// Explicit ffmpeg path (resolved from vendor dirs and PATH if None)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,
}

/// Encoding parameters passed to every launched encoder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingConfig {
    /// Video bitrate in kbps (default 2500)
    #[serde(default = "default_video_bitrate_kbps")]
    pub video_bitrate_kbps: u32,
    /// Audio bitrate in kbps (default 128)
    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,
    /// Audio sample rate in Hz (default 44100)
    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,
}

fn default_video_bitrate_kbps() -> u32 {
    2500
}

fn default_audio_bitrate_kbps() -> u32 {
    128
}

fn default_audio_sample_rate() -> u32 {
    44100
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            video_bitrate_kbps: default_video_bitrate_kbps(),
            audio_bitrate_kbps: default_audio_bitrate_kbps(),
            audio_sample_rate: default_audio_sample_rate(),
        }
    }
}

/// Persisted playlist and its advance policy
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PlaylistConfig {
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Wrap to the first entry after the last one finishes
    #[serde(default)]
    pub loop_playlist: bool,
}

/// Streaming destination
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StreamConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

/// Shutdown timing for the session supervisor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupervisorConfig {
    /// Wait after a graceful terminate before killing (default 5000)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Bounded wait for output readers after the child exits (default 500)
    #[serde(default = "default_reader_join_ms")]
    pub reader_join_ms: u64,
}

fn default_grace_period_ms() -> u64 {
    5000
}

fn default_reader_join_ms() -> u64 {
    500
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            reader_join_ms: default_reader_join_ms(),
        }
    }
}

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// Platform configuration directory for this application
///
/// Falls back to `~/.config` when the platform directory is unknown.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Default settings file path inside [`default_config_dir`]
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.toml")
}

/// Default saved playlist path inside [`default_config_dir`]
pub fn default_playlist_path() -> PathBuf {
    default_config_dir().join("playlist.json")
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl Settings {
    /// Load settings from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse settings from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        Ok(settings)
    }

    /// Render settings as a TOML string
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write settings to a TOML file, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Apply environment variable overrides to the settings
    ///
    /// Overrides the following values if environment variables are set:
    /// - RESTREAM_FFMPEG_PATH -> encoder.ffmpeg_path
    /// - RESTREAM_VIDEO_BITRATE_KBPS -> encoding.video_bitrate_kbps
    /// - RESTREAM_AUDIO_BITRATE_KBPS -> encoding.audio_bitrate_kbps
    /// - RESTREAM_AUDIO_SAMPLE_RATE -> encoding.audio_sample_rate
    /// - RESTREAM_LOOP -> playlist.loop_playlist
    /// - RESTREAM_DESTINATION -> stream.destination
    /// - RESTREAM_GRACE_PERIOD_MS -> supervisor.grace_period_ms
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("RESTREAM_FFMPEG_PATH") {
            if !val.trim().is_empty() {
                self.encoder.ffmpeg_path = Some(PathBuf::from(val.trim()));
            }
        }

        if let Ok(val) = env::var("RESTREAM_VIDEO_BITRATE_KBPS") {
            if let Ok(kbps) = val.parse::<u32>() {
                self.encoding.video_bitrate_kbps = kbps;
            }
        }

        if let Ok(val) = env::var("RESTREAM_AUDIO_BITRATE_KBPS") {
            if let Ok(kbps) = val.parse::<u32>() {
                self.encoding.audio_bitrate_kbps = kbps;
            }
        }

        if let Ok(val) = env::var("RESTREAM_AUDIO_SAMPLE_RATE") {
            if let Ok(rate) = val.parse::<u32>() {
                self.encoding.audio_sample_rate = rate;
            }
        }

        // Accept "true", "1", "yes" as true; "false", "0", "no" as false
        if let Ok(val) = env::var("RESTREAM_LOOP") {
            if let Some(flag) = parse_bool(&val) {
                self.playlist.loop_playlist = flag;
            }
        }

        if let Ok(val) = env::var("RESTREAM_DESTINATION") {
            if !val.trim().is_empty() {
                self.stream.destination = Some(val.trim().to_string());
            }
        }

        if let Ok(val) = env::var("RESTREAM_GRACE_PERIOD_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.supervisor.grace_period_ms = ms;
            }
        }
    }

    /// Load settings from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut settings = Self::load_from_file(path)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Like [`Settings::load`], but a missing file yields defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            let mut settings = Self::default();
            settings.apply_env_overrides();
            return Ok(settings);
        }
        Self::load(path)
    }
}
