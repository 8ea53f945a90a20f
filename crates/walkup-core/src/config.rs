use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Where songs, the roster and the batch sheet live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding downloaded audio. Defaults to `<data_dir>/songs`.
    #[serde(default = "default_songs_dir")]
    pub songs_dir: PathBuf,
    #[serde(default = "default_registry_file")]
    pub registry_file: PathBuf,
    /// Operator settings (volume), JSON.
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
    /// Spreadsheet used by batch import when none is given explicitly.
    #[serde(default = "default_batch_csv")]
    pub batch_csv: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Extra search term appended to every query.
    #[serde(default = "default_query_bias")]
    pub query_bias: String,
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
    /// Explicit yt-dlp binary; searched for when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yt_dlp_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

impl PlaybackConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            songs_dir: default_songs_dir(),
            registry_file: default_registry_file(),
            settings_file: default_settings_file(),
            batch_csv: default_batch_csv(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            query_bias: default_query_bias(),
            audio_format: default_audio_format(),
            yt_dlp_path: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

fn default_songs_dir() -> PathBuf {
    platform::data_dir().join("songs")
}

fn default_registry_file() -> PathBuf {
    platform::data_dir().join("players.json")
}

fn default_settings_file() -> PathBuf {
    platform::data_dir().join("config.json")
}

fn default_batch_csv() -> PathBuf {
    platform::data_dir().join("data").join("batters.csv")
}

fn default_query_bias() -> String {
    "audio".to_string()
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

fn default_poll_interval_ms() -> u64 {
    20
}

fn default_max_poll_attempts() -> u32 {
    50
}

impl Config {
    /// Load from the default location, writing defaults on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
