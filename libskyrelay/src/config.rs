//! Configuration management for Skyrelay

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub bluesky: BlueskyConfig,
    pub source: SourceConfig,
    pub poll: PollConfig,
    pub completion: CompletionConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueskyConfig {
    /// PDS base URL (e.g., "https://bsky.social")
    pub pds: String,
    /// JSON session file, rewritten on every refresh
    pub auth_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub top_n: usize,
    /// Humantime duration between poll cycles ("1m", "90s", ...)
    pub interval: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default)]
    pub on_error: FailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout: String,
}

/// What the poll loop does when a single item fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and move on to the next item
    #[default]
    Isolate,
    /// Stop the run on the first failure
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "isolate" => Ok(FailurePolicy::Isolate),
            "abort" => Ok(FailurePolicy::Abort),
            _ => Err(format!(
                "Invalid failure policy: '{}'. Valid options: isolate, abort",
                s
            )),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Isolate => write!(f, "isolate"),
            FailurePolicy::Abort => write!(f, "abort"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Config::default_config().database
    }
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Config::default_config().bluesky
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Config::default_config().source
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Config::default_config().completion
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Config::default_config().http
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing config file is not an error; the built-in defaults are used.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", config_path);
            return Ok(Self::default_config());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/skyrelay/hnbot.db".to_string(),
            },
            bluesky: BlueskyConfig {
                pds: "https://bsky.social".to_string(),
                auth_file: "~/.config/skyrelay/bsky.auth".to_string(),
            },
            source: SourceConfig {
                base_url: "https://hacker-news.firebaseio.com".to_string(),
                top_n: 10,
                interval: "1m".to_string(),
            },
            poll: PollConfig {
                on_error: FailurePolicy::Isolate,
            },
            completion: CompletionConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                temperature: 0.5,
                max_tokens: 40,
            },
            http: HttpConfig {
                timeout: "30s".to_string(),
            },
        }
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.source.top_n == 0 {
            return Err(ConfigError::InvalidValue {
                field: "source.top_n".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        self.poll_interval()?;
        self.http_timeout()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        parse_duration_field("source.interval", &self.source.interval)
    }

    pub fn http_timeout(&self) -> Result<Duration> {
        parse_duration_field("http.timeout", &self.http.timeout)
    }
}

impl DatabaseConfig {
    pub fn expand_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl BlueskyConfig {
    pub fn expand_auth_file(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.auth_file).to_string())
    }
}

fn parse_duration_field(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

/// Config file path: `$SKYRELAY_CONFIG`, else `<config dir>/skyrelay/config.toml`
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SKYRELAY_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("skyrelay").join("config.toml"))
}
