//! Configuration loader with environment variable expansion

use super::{expand_env_vars, Config, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file using the process environment
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Load configuration from a file, resolving variables through `lookup`
    pub fn load_with<P, F>(path: P, lookup: F) -> Result<Config, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let content = std::fs::read_to_string(path)?;
        Self::parse_with(&content, lookup)
    }

    /// Parse YAML content, expand `${VAR}` placeholders, apply overrides and validate
    pub fn parse_with<F>(content: &str, lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = expand_env_vars(content, &lookup);
        // An empty document deserializes to unit, not to a mapping.
        let mut config: Config = if expanded.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&expanded)?
        };
        config.apply_env_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }
}
