//! TOML-based configuration for qmodel.
//!
//! Supports a config file (qmodel.toml) with environment variable expansion
//! in path values.
//!
//! Example configuration:
//! ```toml
//! [compute]
//! parallelism = 8
//! aggregate_ccdf = true
//!
//! [cache]
//! digest_keys = true
//!
//! [logging]
//! level = "debug"
//!
//! [data]
//! rows = "${QMODEL_DATA}/metrics.json"
//! model = "./model.json"
//! id_column = "id"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::ComputeOptions;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// How distributions are computed.
    pub compute: ComputeSettings,

    /// Result cache configuration.
    pub cache: CacheSettings,

    /// Log output.
    pub logging: LoggingSettings,

    /// Default inputs.
    pub data: DataSettings,
}

/// Compute configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ComputeSettings {
    /// Number of row ranges per distribution. Defaults to the number of
    /// available cores.
    pub parallelism: Option<usize>,

    /// Also compute a CCDF for aggregate nodes.
    pub aggregate_ccdf: bool,
}

/// Cache configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Key node caches by a SHA256 digest of the structural fingerprint.
    pub digest_keys: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset (e.g. "info", "qmodel=debug").
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Default input locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataSettings {
    /// JSON array of data rows (supports ${ENV_VAR} expansion).
    pub rows: Option<String>,

    /// Model description file (supports ${ENV_VAR} expansion).
    pub model: Option<String>,

    /// Row field holding the entity id.
    pub id_column: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            rows: None,
            model: None,
            id_column: "id".to_string(),
        }
    }
}

impl DataSettings {
    /// The rows path with environment variables expanded.
    pub fn resolved_rows(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.rows
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }

    /// The model path with environment variables expanded.
    pub fn resolved_model(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.model
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QMODEL_CONFIG`
    /// 2. `./qmodel.toml`
    /// 3. `~/.config/qmodel/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        // Check environment variable first
        if let Ok(path) = env::var("QMODEL_CONFIG") {
            return Self::from_file(&path);
        }

        // Check local directory
        let local_config = PathBuf::from("qmodel.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        // Check user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("qmodel").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        // Return defaults if no config file found
        Ok(Settings::default())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.compute.parallelism == Some(0) {
            return Err(SettingsError::InvalidConfig(
                "compute.parallelism must be at least 1".to_string(),
            ));
        }
        if self.data.id_column.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "data.id_column must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The options a [`Model`](crate::model::Model) computes with.
    pub fn compute_options(&self) -> ComputeOptions {
        let defaults = ComputeOptions::default();
        ComputeOptions {
            parallelism: self.compute.parallelism.unwrap_or(defaults.parallelism),
            aggregate_ccdf: self.compute.aggregate_ccdf,
            digest_keys: self.cache.digest_keys,
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            // $VAR ends at the first non-alphanumeric, non-underscore char
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
