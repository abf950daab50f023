//! Layered configuration for the coordination service.
//!
//! Settings are resolved file → environment → CLI, each layer overriding the
//! last. The on-disk format is TOML; every field has a default so a missing
//! file, or a file that only sets one section, still produces a usable
//! configuration.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 7432
//! database_path = ".spellbook/coordination.db"
//!
//! [sse]
//! poll_interval_secs = 2
//!
//! [retry]
//! base_secs = 30
//! multiplier = 2
//! max_retries = 2
//!
//! [retention]
//! days = 7
//!
//! [logging]
//! format = "pretty"
//! level = "info"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7432
}
fn default_database_path() -> String {
    ".spellbook/coordination.db".to_string()
}
fn default_poll_interval_secs() -> u64 {
    2
}
fn default_retry_base_secs() -> u64 {
    30
}
fn default_retry_multiplier() -> u32 {
    2
}
fn default_max_retries() -> u32 {
    2
}
fn default_retention_days() -> i64 {
    7
}

/// Bind address and persistence settings for the coordination server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_path: default_database_path(),
        }
    }
}

/// Event-stream polling cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseSection {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for SseSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// Exponential backoff constants consulted by the retry classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_retry_base_secs")]
    pub base_secs: u64,
    #[serde(default = "default_retry_multiplier")]
    pub multiplier: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            base_secs: default_retry_base_secs(),
            multiplier: default_retry_multiplier(),
            max_retries: default_max_retries(),
        }
    }
}

/// Horizon for `cleanup_old_swarms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSection {
    #[serde(default = "default_retention_days")]
    pub days: i64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

/// The complete `coordination.toml` structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinationToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub sse: SseSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub retention: RetentionSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl CoordinationToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse coordination.toml")
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize coordination.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment variable overrides (`SPELLBOOK_COORD_*`) on top of the file layer.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("SPELLBOOK_COORD_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SPELLBOOK_COORD_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(path) = std::env::var("SPELLBOOK_COORD_DB_PATH") {
            self.server.database_path = path;
        }
        if let Ok(format) = std::env::var("SPELLBOOK_COORD_LOG_FORMAT") {
            if let Ok(format) = format.parse() {
                self.logging.format = format;
            }
        }
    }

    /// Validate the configuration, returning human-readable warnings. Never refuses to start;
    /// an operator reads these and fixes the file if they care.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; the OS will choose a random port".to_string());
        }
        if self.sse.poll_interval_secs == 0 {
            warnings.push("sse.poll_interval_secs is 0; this will busy-loop the event stream".to_string());
        }
        if self.retry.max_retries == 0 {
            warnings.push("retry.max_retries is 0; recoverable errors will never be retried".to_string());
        }
        if self.retry.multiplier == 0 {
            warnings.push("retry.multiplier is 0; backoff delay will collapse to the base delay once".to_string());
        }
        if self.retention.days <= 0 {
            warnings.push("retention.days is not positive; cleanup_old_swarms would delete everything".to_string());
        }

        warnings
    }
}

/// Fully-resolved configuration used to construct the server and worker helper.
#[derive(Debug, Clone)]
pub struct Config {
    pub toml: CoordinationToml,
    pub config_path: Option<PathBuf>,
}

impl Config {
    /// Load the layered configuration: defaults, then `config_path` if given and present,
    /// then environment variables. CLI flags are applied by the caller afterward via
    /// the individual `*_override` setters on the returned `CoordinationToml`.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut toml = match &config_path {
            Some(path) => CoordinationToml::load_or_default(path)?,
            None => CoordinationToml::default(),
        };
        toml.apply_env();

        Ok(Self { toml, config_path })
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.toml.server.database_path)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.toml.server.host, self.toml.server.port)
    }
}
