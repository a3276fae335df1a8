#![deny(unsafe_code)]

//! Configuration loading and validation for arcs.
//!
//! Loads TOML configuration files and validates them against expected schemas.
//! Provides the [`AppConfig`] type as the central configuration structure. The
//! server receives an explicit [`AppConfig`] value; nothing in the workspace
//! reads process-wide configuration state.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Where config source manifests are loaded from.
    #[serde(default)]
    pub manifests: ManifestConfig,

    /// Settings applied to every content fetch.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the HTTP listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port the server binds to.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

/// Manifest discovery configuration.
///
/// `path` names either a single manifest file or a flat directory whose
/// non-directory entries are all treated as manifests.
///
/// ## TOML Example
///
/// ```toml
/// [manifests]
/// path = "/etc/arcs/mappings.d"
/// strict = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// File or directory holding the manifests.
    #[serde(default = "default_manifest_path")]
    pub path: String,

    /// Abort startup when any manifest record is rejected, instead of
    /// logging it and serving the records that did parse.
    #[serde(default)]
    pub strict: bool,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: default_manifest_path(),
            strict: false,
        }
    }
}

fn default_manifest_path() -> String {
    "mappings.yaml".to_string()
}

/// Settings for fetching config content over http(s).
///
/// ## TOML Example
///
/// ```toml
/// [fetch]
/// user_agent = "arcs-homelab"
///
/// [fetch.headers]
/// Authorization = "Bearer 0123"
/// ```
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Overrides the default `arcs/<version>` user agent.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Static headers attached to every http(s) fetch.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen_port == 0 {
            return Err(ConfigError::Validation(
                "server.listen_port must be non-zero".to_string(),
            ));
        }
        if self.server.listen_addr.is_empty() {
            return Err(ConfigError::Validation(
                "server.listen_addr must not be empty".to_string(),
            ));
        }
        if self.manifests.path.is_empty() {
            return Err(ConfigError::Validation(
                "manifests.path must not be empty".to_string(),
            ));
        }
        if let Some(agent) = &self.fetch.user_agent
            && agent.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "fetch.user_agent must not be blank when set".to_string(),
            ));
        }
        for name in self.fetch.headers.keys() {
            if name.is_empty() {
                return Err(ConfigError::Validation(
                    "fetch.headers keys must not be empty".to_string(),
                ));
            }
        }
        if self.logging.level.is_empty() {
            return Err(ConfigError::Validation(
                "logging.level must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The `addr:port` pair the server binds to.
    pub fn listen_socket(&self) -> String {
        format!("{}:{}", self.server.listen_addr, self.server.listen_port)
    }
}
