//! Configuration management for the dialog switch
//!
//! Supports loading configuration from:
//! - One or more YAML role documents (`DIALOG_SWITCH_CONFIG`, comma-separated)
//! - Environment variables (`DIALOG_SWITCH__` prefix, `__` separator)
//!
//! Each role (`nlg`, `nlu`) lists its sources, its group defaults and its
//! refresh interval. Documents are merged; they must agree on the network
//! parameters.

pub mod settings;

pub use settings::{
    config_paths_from_env, load_settings, ChooserConfig, ExtractionSettings, NlgConfig,
    NlgDefaults, NluConfig, ObservabilityConfig, RuntimeEnvironment, ServerConfig, Settings,
    SourceEntry, CONFIG_PATHS_VAR, ENV_PREFIX,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Duplicate {role} source name: {name}")]
    DuplicateSource { role: String, name: String },

    #[error("Configuration documents disagree on {field}: {first} vs {second}")]
    NetworkMismatch {
        field: String,
        first: String,
        second: String,
    },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
