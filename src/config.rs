use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

use crate::locking::LockSettings;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Feature store configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the YAML feature mapping; no feature types are mapped without it
    pub mapping_file: Option<String>,

    /// Lock expiry applied when a lock request names none
    #[validate(range(
        min = 1,
        max = 86400,
        message = "Default lock expiry must be between 1 second and 1 day"
    ))]
    pub default_lock_expiry_secs: u64,

    /// Longest expiry a lock request may ask for; longer requests are clamped
    #[validate(range(
        min = 1,
        max = 604800,
        message = "Maximum lock expiry must be between 1 second and 7 days"
    ))]
    pub max_lock_expiry_secs: u64,

    /// Number of table name characters used as alias prefix
    #[validate(range(min = 1, max = 16, message = "Alias prefix length must be between 1 and 16"))]
    pub alias_prefix_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mapping_file: None,
            default_lock_expiry_secs: 300,
            max_lock_expiry_secs: 86400,
            alias_prefix_len: 4,
        }
    }
}

impl StoreConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            mapping_file: optional_env_var("FEATURESTORE_MAPPING_FILE")?,
            default_lock_expiry_secs: parse_env_var("FEATURESTORE_LOCK_EXPIRY_SECS", "300")?,
            max_lock_expiry_secs: parse_env_var("FEATURESTORE_MAX_LOCK_EXPIRY_SECS", "86400")?,
            alias_prefix_len: parse_env_var("FEATURESTORE_ALIAS_PREFIX_LEN", "4")?,
        };

        config.check()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.check()?;
        Ok(config)
    }

    /// Field validation plus the cross-field expiry bound
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.max_lock_expiry_secs < self.default_lock_expiry_secs {
            return Err(ConfigError::Invalid(format!(
                "max_lock_expiry_secs ({}) is below default_lock_expiry_secs ({})",
                self.max_lock_expiry_secs, self.default_lock_expiry_secs
            )));
        }
        Ok(())
    }

    pub fn lock_settings(&self) -> LockSettings {
        LockSettings {
            default_expiry: Duration::from_secs(self.default_lock_expiry_secs),
            max_expiry: Duration::from_secs(self.max_lock_expiry_secs),
        }
    }
}

/// Read an optional environment variable; a set but non-Unicode value is an error
fn optional_env_var(key: &str) -> Result<Option<String>, ConfigError> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
