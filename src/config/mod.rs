//! Configuration module for fileferry
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion, `APP_*` overrides and validation.
//!
//! The configuration is built once at startup and shared read-only afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Environment variable overriding `server.port`
pub const ENV_PORT: &str = "APP_PORT";
/// Environment variable overriding `storage.upload_dir`
pub const ENV_UPLOAD_DIR: &str = "APP_UPLOAD_DIR";
/// Environment variable overriding `storage.download_dir`
pub const ENV_DOWNLOAD_DIR: &str = "APP_DOWNLOAD_DIR";

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
pub(crate) fn expand_env_vars<F>(s: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match lookup(var_name.as_str()) {
            Some(val) => val,
            None => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file, then apply `APP_*` overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Build configuration from defaults plus `APP_*` overrides only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `APP_PORT`, `APP_UPLOAD_DIR` and `APP_DOWNLOAD_DIR` overrides.
    ///
    /// Empty values are ignored, matching an unset variable.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "{} is not a valid port: '{}'",
                    ENV_PORT, port
                ))
            })?;
        }
        if let Some(dir) = lookup(ENV_UPLOAD_DIR) {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_DOWNLOAD_DIR) {
            self.storage.download_dir = PathBuf::from(dir);
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Server host cannot be empty".into(),
            ));
        }

        if self.storage.upload_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "Upload directory cannot be empty".into(),
            ));
        }

        if self.storage.download_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "Download directory cannot be empty".into(),
            ));
        }

        if self.metrics.enabled && self.server.port != 0 && self.metrics.port == self.server.port {
            return Err(ConfigError::ValidationError(format!(
                "Metrics port {} collides with server port",
                self.metrics.port
            )));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level '{}': must be one of trace, debug, info, warn, error",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// Listening address in `host:port` form
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

/// Storage layout configuration
///
/// Uploads land under `upload_dir`, downloads are resolved under
/// `download_dir`. Point both at the same directory to download what was
/// uploaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Serve `/files/in/` and `/files/out/` read-only views of the roots
    #[serde(default = "default_mirrors")]
    pub mirrors: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            download_dir: default_download_dir(),
            mirrors: default_mirrors(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("local-storage")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("base-storage")
}

fn default_mirrors() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}
