//! Configuration module for qmodel.
//!
//! Handles the settings file and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, CacheSettings, ComputeSettings, DataSettings, LoggingSettings, Settings,
    SettingsError,
};
