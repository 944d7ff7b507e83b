use super::types::RawConfig;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{path}': {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("no rules configured")]
    NoRules,
}

/// Reads and parses a TOML configuration file into unvalidated rule records.
///
/// Validation beyond "is this well-formed TOML with the required top-level
/// keys" is deferred to the pattern compiler and the runner, matching the
/// upstream daemon's split between loading and rule initialization.
pub fn load_config(path: &Path) -> Result<RawConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let config: RawConfig = toml::from_str(&text).map_err(|e| ConfigError::Toml {
        path: path.display().to_string(),
        source: e,
    })?;

    if !matches!(config.backend.as_str(), "ipset" | "nft" | "test") {
        return Err(ConfigError::UnknownBackend(config.backend.clone()));
    }

    if config.rules.is_empty() {
        return Err(ConfigError::NoRules);
    }

    Ok(config)
}
