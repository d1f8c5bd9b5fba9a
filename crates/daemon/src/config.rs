//! Configuration management for the FileBridge daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/filebridge/config.toml`.
//!
//! Configuration is read once at startup. Nothing in the daemon reloads it while
//! running; components receive the values they need when they are built.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_file_size must be greater than 0, got {0}")]
    InvalidMaxFileSize(u64),

    #[error("token_validity_minutes must be between 1 and 10080, got {0}")]
    InvalidTokenValidity(u64),

    #[error("allowed_extensions must not be empty (use [\"*\"] to allow everything)")]
    EmptyAllowedExtensions,

    #[error("log level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("retention_days must be greater than 0, got {0}")]
    InvalidRetentionDays(usize),

    #[error("shutdown_grace_secs must be at most 300, got {0}")]
    InvalidShutdownGrace(u64),

    #[error("token_sweep_interval_secs must be greater than 0, got {0}")]
    InvalidSweepInterval(u64),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for token validity: one week.
const MAX_TOKEN_VALIDITY_MINUTES: u64 = 7 * 24 * 60;

/// Headroom added on top of the encoded file size when bounding request lines.
const FRAME_OVERHEAD_BYTES: usize = 64 * 1024;

/// Main configuration structure for the FileBridge daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// File surface exposed to clients.
    pub service: ServiceConfig,

    /// Authentication settings.
    pub security: SecurityConfig,

    /// Log output settings.
    pub logging: LoggingConfig,

    /// Local socket settings.
    pub ipc: IpcConfig,
}

/// File surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory that every file operation is confined to.
    pub root_folder: PathBuf,

    /// Maximum size in bytes of a file written through `CreateFile`.
    pub max_file_size: u64,

    /// Permitted file extensions, without the leading dot. `"*"` allows all.
    pub allowed_extensions: Vec<String>,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Lifetime of an issued token, in minutes.
    pub token_validity_minutes: u64,

    /// Whether file commands must carry a valid token.
    pub require_authentication: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily-rotated log files. Logs only go to stderr when unset.
    pub directory: Option<PathBuf>,

    /// Number of daily log files to keep.
    pub retention_days: usize,

    /// Logging level (trace, debug, info, warn, error).
    pub level: String,
}

/// IPC configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IpcConfig {
    /// Socket path override. Defaults to [`crate::ipc::get_socket_path`].
    pub socket_path: Option<PathBuf>,

    /// Seconds open connections get to finish after shutdown is requested.
    pub shutdown_grace_secs: u64,

    /// How often expired tokens are swept, in seconds.
    pub token_sweep_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root_folder: default_root_folder(),
            max_file_size: 100 * 1024 * 1024, // 100MB
            allowed_extensions: vec![protocol::WILDCARD_EXTENSION.to_string()],
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_validity_minutes: 60,
            require_authentication: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            retention_days: 30,
            level: "info".to_string(),
        }
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            shutdown_grace_secs: 5,
            token_sweep_interval_secs: 300, // 5 minutes
        }
    }
}

impl SecurityConfig {
    /// Token lifetime as a duration.
    pub fn token_validity(&self) -> Duration {
        Duration::from_secs(self.token_validity_minutes * 60)
    }
}

impl IpcConfig {
    /// Grace period for open connections at shutdown.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Interval between expired-token sweeps.
    pub fn token_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.token_sweep_interval_secs)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filebridge")
        .join("config.toml")
}

/// Returns the default root folder.
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filebridge")
        .join("root")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - FILEBRIDGE_ROOT: Override the root folder
    /// - FILEBRIDGE_SOCKET: Override the socket path
    /// - FILEBRIDGE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("FILEBRIDGE_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding root_folder from environment: {}", root);
                self.service.root_folder = PathBuf::from(root);
            }
        }

        if let Ok(socket) = std::env::var("FILEBRIDGE_SOCKET") {
            if !socket.is_empty() {
                tracing::info!("Overriding socket_path from environment: {}", socket);
                self.ipc.socket_path = Some(PathBuf::from(socket));
            }
        }

        if let Ok(level) = std::env::var("FILEBRIDGE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log level from environment: {}", level);
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.max_file_size == 0 {
            return Err(ConfigError::InvalidMaxFileSize(self.service.max_file_size));
        }

        let validity = self.security.token_validity_minutes;
        if validity == 0 || validity > MAX_TOKEN_VALIDITY_MINUTES {
            return Err(ConfigError::InvalidTokenValidity(validity));
        }

        if self
            .service
            .allowed_extensions
            .iter()
            .all(|ext| ext.trim().is_empty())
        {
            return Err(ConfigError::EmptyAllowedExtensions);
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        if self.logging.retention_days == 0 {
            return Err(ConfigError::InvalidRetentionDays(self.logging.retention_days));
        }

        if self.ipc.shutdown_grace_secs > 300 {
            return Err(ConfigError::InvalidShutdownGrace(self.ipc.shutdown_grace_secs));
        }

        if self.ipc.token_sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidSweepInterval(
                self.ipc.token_sweep_interval_secs,
            ));
        }

        Ok(())
    }

    /// The socket path the daemon listens on.
    pub fn socket_path(&self) -> PathBuf {
        self.ipc
            .socket_path
            .clone()
            .unwrap_or_else(crate::ipc::get_socket_path)
    }

    /// Longest request line the daemon accepts, in bytes.
    ///
    /// A `CreateFile` request carries its content as base64, which is 4/3 the
    /// size of the file, plus the JSON envelope.
    pub fn max_request_len(&self) -> usize {
        let encoded = self.service.max_file_size.saturating_mul(4).div_ceil(3);
        usize::try_from(encoded)
            .unwrap_or(usize::MAX)
            .saturating_add(FRAME_OVERHEAD_BYTES)
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
