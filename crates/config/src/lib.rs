//! Configuration loading, validation, and management for SQLPilot.
//!
//! Loads configuration from `~/.sqlpilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.sqlpilot/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Text-generation backend settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Agent loop budgets and early stopping
    #[serde(default)]
    pub agent: AgentConfig,

    /// Live output classification
    #[serde(default)]
    pub stream: StreamConfig,

    /// The database the SQL tools talk to
    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_inference_url")]
    pub inference_server_url: String,

    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,

    /// Extra stop sequences on top of the prompt format's own
    #[serde(default = "default_stop_sequences")]
    pub stop_sequences: Vec<String>,

    /// Stream tokens to the user while generating
    #[serde(default = "default_true")]
    pub streaming: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_inference_url() -> String {
    "http://localhost:8080".into()
}
fn default_max_new_tokens() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.1
}
fn default_repetition_penalty() -> f32 {
    1.03
}
fn default_stop_sequences() -> Vec<String> {
    vec!["</s>".into()]
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            inference_server_url: default_inference_url(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            repetition_penalty: default_repetition_penalty(),
            stop_sequences: default_stop_sequences(),
            streaming: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// What to do when a run exhausts its budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarlyStoppingMethod {
    /// Return a fixed "stopped" message.
    #[default]
    Force,
    /// Ask the model for one last answer.
    Generate,
}

impl std::str::FromStr for EarlyStoppingMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "force" => Ok(Self::Force),
            "generate" => Ok(Self::Generate),
            other => Err(ConfigError::ValidationError(format!(
                "early_stopping_method must be \"force\" or \"generate\", got \"{other}\""
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Wall-clock budget for one run; unlimited when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wall_clock_secs: Option<f64>,

    #[serde(default)]
    pub early_stopping_method: EarlyStoppingMethod,

    /// Row limit suggested to the model in the instructions
    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

fn default_max_iterations() -> u32 {
    15
}
fn default_top_k() -> u32 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_wall_clock_secs: None,
            early_stopping_method: EarlyStoppingMethod::Force,
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Fragment sequence that opens the visible segment
    #[serde(default = "default_boundary_tokens")]
    pub boundary_tokens: Vec<String>,

    /// Fragment that marks the whole generation as internal
    #[serde(default = "default_suppress_token")]
    pub suppress_token: Option<String>,

    /// Compare fragments after trimming whitespace
    #[serde(default = "default_true")]
    pub strip_tokens: bool,

    /// Also show the boundary fragments themselves
    #[serde(default)]
    pub include_boundary: bool,
}

fn default_boundary_tokens() -> Vec<String> {
    vec!["Thought".into(), ":".into()]
}
fn default_suppress_token() -> Option<String> {
    Some("Action".into())
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            boundary_tokens: default_boundary_tokens(),
            suppress_token: default_suppress_token(),
            strip_tokens: true,
            include_boundary: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Sample rows included with each table schema
    #[serde(default = "default_sample_rows")]
    pub sample_rows: u32,

    /// SQL dialect named in the instructions
    #[serde(default = "default_dialect")]
    pub dialect: String,
}

fn default_database_url() -> String {
    "sqlite://warehouse.db".into()
}
fn default_sample_rows() -> u32 {
    3
}
fn default_dialect() -> String {
    "SQLite".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            sample_rows: default_sample_rows(),
            dialect: default_dialect(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Environment variables override file values:
    /// - `SQLPILOT_INFERENCE_URL`
    /// - `SQLPILOT_DATABASE_URL`
    /// - `SQLPILOT_MAX_ITERATIONS`
    /// - `SQLPILOT_EARLY_STOPPING` (`force` or `generate`)
    /// - `SQLPILOT_LOG_LEVEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup function.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SQLPILOT_INFERENCE_URL") {
            self.generation.inference_server_url = url;
        }
        if let Some(url) = lookup("SQLPILOT_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(raw) = lookup("SQLPILOT_MAX_ITERATIONS") {
            self.agent.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "SQLPILOT_MAX_ITERATIONS must be a positive integer, got \"{raw}\""
                ))
            })?;
        }
        if let Some(raw) = lookup("SQLPILOT_EARLY_STOPPING") {
            self.agent.early_stopping_method = raw.parse()?;
        }
        if let Some(level) = lookup("SQLPILOT_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sqlpilot")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if let Some(secs) = self.agent.max_wall_clock_secs
            && !(secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok())
        {
            return Err(ConfigError::ValidationError(
                "agent.max_wall_clock_secs must be a positive number of seconds that fits a duration".into(),
            ));
        }

        if self.generation.temperature < 0.0 || self.generation.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.generation.inference_server_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "generation.inference_server_url must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML (for `sqlpilot config`).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            generation: GenerationConfig::default(),
            agent: AgentConfig::default(),
            stream: StreamConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
