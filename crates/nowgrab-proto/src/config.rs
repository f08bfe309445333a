use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// YouTube Data API key. `YOUTUBE_API_KEY` takes precedence when set.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// How many times a search is attempted before the item is given up on.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Explicit yt-dlp binary. Empty means discover it.
    #[serde(default)]
    pub yt_dlp_path: PathBuf,
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Explicit poller binary. Empty means look beside the executable, then PATH.
    #[serde(default)]
    pub binary: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive failed polls before the poller reports a fatal error.
    #[serde(default = "default_max_source_failures")]
    pub max_source_failures: u32,
}

/// User-configurable paths for downloads and session data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory fetched files are written to. Defaults to `~/Music/nowgrab`.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            max_results: default_max_results(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: PathBuf::new(),
            audio_format: default_audio_format(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::new(),
            poll_interval_ms: default_poll_interval_ms(),
            max_source_failures: default_max_source_failures(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_max_results() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_source_failures() -> u32 {
    5
}

fn default_output_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nowgrab")
}

impl SearchConfig {
    /// The API key to use, preferring the environment over the file.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var("YOUTUBE_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| Some(self.api_key.clone()).filter(|k| !k.is_empty()))
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from an explicit path, writing defaults there on first run.
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
