//! Configuration module
//!
//! This module handles source configuration, including loading from
//! different sources (files, environment variables, command line arguments)
//! and validating the configuration.

pub mod defaults;
pub mod error;
mod loader;
pub mod types;
mod validator;

pub use self::error::ConfigError;
pub use self::loader::{log_config, ConfigLoader, ConfigOverrides};
pub use self::types::{FramingPolicy, PeerVerify, SourceConfig, TlsConfig, TransportKind};
pub use self::validator::ConfigValidator;

pub use defaults::{ENV_PREFIX, ENV_SEPARATOR};
