//! Configuration loading from JSON files and strings.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::schema::GatewayConfig;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "INFERENCE_GATEWAY_CONFIG";

/// File looked up in the working directory when no path is given.
const DEFAULT_CONFIG_NAME: &str = "inference-gateway.json";

/// Upper bound on the size of a configuration file.
const MAX_CONFIG_BYTES: u64 = 1024 * 1024;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// JSON parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl GatewayConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: Self =
            serde_json::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and the
    /// errors of [`GatewayConfig::from_json_str`] otherwise.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let metadata = fs::metadata(path)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        if metadata.len() > MAX_CONFIG_BYTES {
            return Err(ConfigError::Invalid(
                "config file exceeds size limit".to_owned(),
            ));
        }
        let bytes =
            fs::read(path).map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_owned()))?;
        debug!(path = %path.display(), "loading gateway config");
        Self::from_json_str(content)
    }

    /// Loads the configuration from `path`, falling back to the file named by
    /// [`CONFIG_ENV_VAR`] and then to `inference-gateway.json`.
    ///
    /// # Errors
    ///
    /// See [`GatewayConfig::from_path`].
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let resolved = resolve_path(path, env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
        Self::from_path(&resolved)
    }

    /// Loads the configuration named by [`CONFIG_ENV_VAR`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the variable is unset, and the
    /// errors of [`GatewayConfig::from_path`] otherwise.
    pub fn from_env() -> ConfigResult<Self> {
        let path = env::var_os(CONFIG_ENV_VAR)
            .ok_or_else(|| ConfigError::Invalid(format!("{CONFIG_ENV_VAR} is not set")))?;
        Self::from_path(Path::new(&path))
    }
}

fn resolve_path(explicit: Option<&Path>, from_env: Option<PathBuf>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or(from_env)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_NAME))
}
