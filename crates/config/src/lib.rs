//! Configuration for the taxlens engine
//!
//! Layered settings (defaults, optional config file, `TAXLENS__` env vars),
//! centralized constants, and tracing setup.

pub mod constants;
pub mod settings;
pub mod telemetry;

pub use settings::{
    load_settings, InferenceSettings, LearningSettings, ObservabilitySettings, RetrievalSettings,
    RoutingSettings, RuntimeEnvironment, Settings,
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

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
