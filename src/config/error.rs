//! Configuration errors

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a source configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file or referenced certificate/key file does not exist
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// File, environment variable or value could not be parsed
    #[error("Error parsing configuration: {0}")]
    ParseError(String),

    /// Option has an unusable value
    #[error("Invalid value for '{0}': {1}")]
    InvalidValue(String, String),

    /// Option needed by another option is missing
    #[error("Missing required configuration value: {0}")]
    MissingRequiredValue(String),

    /// Options contradict each other, e.g. a TLS transport without TLS settings
    #[error("Invalid combination of configuration options: {0}")]
    InvalidCombination(String),
}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<::config::ConfigError> for ConfigError {
    fn from(err: ::config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for crate::common::SyslogError {
    fn from(err: ConfigError) -> Self {
        crate::common::SyslogError::Config(err.to_string())
    }
}
