//! Configuration system
//!
//! Provides configuration management with:
//! - Runtime defaults
//! - Config file loading (optional, TOML)
//! - Environment variable overrides
//! - Validation
//!
//! CLI flags are applied by the binary after [`Config::load`] and before
//! [`Config::validate`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CONFIG_FILE_NAME: &str = "agent-session-monitor.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
    pub monitor: MonitorConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Live access log; rotated siblings are `<log_path>.N`.
    pub log_path: PathBuf,
    /// Directory holding one JSON file per session.
    pub output_dir: PathBuf,
    /// Offset ledger. Defaults to `<output_dir>/.state.json`.
    pub state_file: Option<PathBuf>,
    pub log_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub refresh_interval_secs: u64,
    pub max_rotated_files: usize,
    pub progress_every: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Top-level log field holding the JSON-encoded usage payload.
    pub payload_field: String,
    pub missing_session: MissingSessionPolicy,
    pub default_session_id: String,
}

/// What to do with a usage payload that carries no `session_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingSessionPolicy {
    /// Drop the record.
    Reject,
    /// Attribute the record to `ingest.default_session_id`.
    Bucket,
}

impl std::str::FromStr for MissingSessionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "bucket" => Ok(Self::Bucket),
            other => Err(anyhow::anyhow!(
                "Unknown missing-session policy '{}', expected 'reject' or 'bucket'",
                other
            )),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            paths: PathsConfig::default(),
            monitor: MonitorConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "WARN".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/var/log/higress/access.log"),
            output_dir: PathBuf::from("./sessions"),
            state_file: None,
            log_directory: PathBuf::from("logs"),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 1,
            max_rotated_files: 100,
            progress_every: 1000,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            payload_field: "ai_log".to_string(),
            missing_session: MissingSessionPolicy::Reject,
            default_session_id: "default".to_string(),
        }
    }
}

impl PathsConfig {
    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join(".state.json"))
    }
}

impl Config {
    /// Load configuration from defaults, the first config file found, and environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => Self::discover_file()?.unwrap_or_default(),
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    fn discover_file() -> Result<Option<Self>> {
        let config_paths = [
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from(format!(".{}", CONFIG_FILE_NAME)),
            dirs::config_dir()
                .map(|d| d.join("agent-session-monitor").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.is_file() {
                info!(config_file = %path.display(), "Loading configuration from file");
                return Self::load_from_file(path).map(Some);
            }
        }

        Ok(None)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        if let Ok(val) = env::var("SESSION_MONITOR_LOG_PATH") {
            self.paths.log_path = PathBuf::from(val);
        }
        if let Ok(val) = env::var("SESSION_MONITOR_OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("SESSION_MONITOR_STATE_FILE") {
            self.paths.state_file = Some(PathBuf::from(val));
        }

        if let Ok(val) = env::var("SESSION_MONITOR_REFRESH_SECS") {
            self.monitor.refresh_interval_secs = val
                .parse()
                .context("Invalid SESSION_MONITOR_REFRESH_SECS")?;
        }
        if let Ok(val) = env::var("SESSION_MONITOR_MAX_ROTATED") {
            self.monitor.max_rotated_files = val
                .parse()
                .context("Invalid SESSION_MONITOR_MAX_ROTATED")?;
        }
        if let Ok(val) = env::var("SESSION_MONITOR_MISSING_SESSION") {
            self.ingest.missing_session = val
                .parse()
                .context("Invalid SESSION_MONITOR_MISSING_SESSION")?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.monitor.refresh_interval_secs == 0 {
            return Err(anyhow::anyhow!("Refresh interval must be at least 1 second"));
        }

        if self.monitor.max_rotated_files > 10_000 {
            warn!(
                max_rotated_files = self.monitor.max_rotated_files,
                "Very large rotation scan bound"
            );
        }

        if self.monitor.progress_every == 0 {
            return Err(anyhow::anyhow!("Progress interval must be greater than 0"));
        }

        if self.ingest.payload_field.is_empty() {
            return Err(anyhow::anyhow!("Payload field name cannot be empty"));
        }

        if self.ingest.missing_session == MissingSessionPolicy::Bucket
            && self.ingest.default_session_id.trim().is_empty()
        {
            return Err(anyhow::anyhow!(
                "A default session id is required when bucketing records without session_id"
            ));
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => return Err(anyhow::anyhow!("Unknown log format '{}'", other)),
        }

        match self.logging.output.as_str() {
            "console" | "file" | "both" => {}
            other => return Err(anyhow::anyhow!("Unknown log output '{}'", other)),
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");
        Ok(())
    }
}
