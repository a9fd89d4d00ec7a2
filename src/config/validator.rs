//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use std::path::Path;

use crate::common::check_file_exists;
use crate::config::error::{ConfigError, Result};
use crate::config::types::{PeerVerify, SourceConfig, TransportKind};

/// Configuration validator trait
pub trait ConfigValidator {
    /// Reject configurations the source cannot run with
    fn validate(&self) -> Result<()>;

    /// Check configuration for warnings
    fn check_warnings(&self) -> Vec<String>;
}

impl ConfigValidator for SourceConfig {
    fn validate(&self) -> Result<()> {
        validate_transport_settings(self)?;
        validate_limits(self)?;
        Ok(())
    }

    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match self.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => {
                warnings.push(format!("Invalid log level '{}', using default 'info'", level));
            }
        }

        if let Some(ref tls) = self.tls {
            if self.transport == TransportKind::Tcp || self.transport == TransportKind::ProxiedTcp {
                warnings.push(format!(
                    "TLS settings are ignored by the '{}' transport",
                    self.transport
                ));
            }

            if tls.peer_verify == PeerVerify::None && tls.ca_file.is_some() {
                warnings.push("ca_file is set but peer_verify is 'none'".to_string());
            }
        }

        if self.max_message_size < 480 {
            warnings.push(format!(
                "max_message_size of {} is below the 480 bytes every syslog receiver must accept",
                self.max_message_size
            ));
        }

        warnings
    }
}

/// Validate the transport and TLS combination
fn validate_transport_settings(config: &SourceConfig) -> Result<()> {
    let tls = match config.tls {
        Some(ref tls) => tls,
        None if config.transport.requires_tls() => {
            return Err(ConfigError::InvalidCombination(format!(
                "transport '{}' requires a tls block with key_file and cert_file",
                config.transport
            )));
        }
        None => return Ok(()),
    };

    validate_file_exists(&tls.key_file)?;
    validate_file_exists(&tls.cert_file)?;

    if tls.peer_verify.requires_trust() && tls.ca_file.is_none() {
        return Err(ConfigError::InvalidCombination(format!(
            "peer_verify '{}' requires ca_file",
            tls.peer_verify
        )));
    }

    if let Some(ref ca) = tls.ca_file {
        validate_file_exists(ca)?;
    }

    Ok(())
}

/// Validate numeric limits
fn validate_limits(config: &SourceConfig) -> Result<()> {
    if config.max_message_size == 0 {
        return Err(ConfigError::InvalidValue(
            "max_message_size".to_string(),
            "Maximum message size must be greater than 0".to_string(),
        ));
    }

    if config.initial_data_timeout == 0 {
        return Err(ConfigError::InvalidValue(
            "initial_data_timeout".to_string(),
            "Initial data timeout must be greater than 0".to_string(),
        ));
    }

    if config.handshake_timeout == 0 {
        return Err(ConfigError::InvalidValue(
            "handshake_timeout".to_string(),
            "Handshake timeout must be greater than 0".to_string(),
        ));
    }

    if config.max_connections == 0 {
        return Err(ConfigError::InvalidValue(
            "max_connections".to_string(),
            "Maximum connections must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_file_exists(path: &Path) -> Result<()> {
    check_file_exists(path).map_err(|_| ConfigError::FileNotFound(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::TlsConfig;

    #[test]
    fn test_default_is_valid() {
        let config = SourceConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.check_warnings().is_empty());
    }

    #[test]
    fn test_tls_transport_needs_tls_block() {
        let config = SourceConfig {
            transport: TransportKind::ProxiedTls,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCombination(_))));
    }

    #[test]
    fn test_trusted_verify_needs_ca() {
        // Cargo.toml stands in for key and certificate; only existence is checked here
        let config = SourceConfig {
            transport: TransportKind::Tls,
            tls: Some(TlsConfig::new("Cargo.toml", "Cargo.toml").with_peer_verify(PeerVerify::RequiredTrusted)),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCombination(_))));

        let config = SourceConfig {
            transport: TransportKind::Tls,
            tls: Some(TlsConfig::new("Cargo.toml", "Cargo.toml").with_peer_verify(PeerVerify::OptionalUntrusted)),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_key_file() {
        let config = SourceConfig {
            tls: Some(TlsConfig::new("missing.key", "Cargo.toml").with_peer_verify(PeerVerify::None)),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let config = SourceConfig {
            max_message_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SourceConfig {
            handshake_timeout: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_warnings() {
        let config = SourceConfig {
            transport: TransportKind::Tcp,
            tls: Some(TlsConfig::new("k", "c").with_peer_verify(PeerVerify::None).with_ca_file("ca")),
            log_level: "verbose".to_string(),
            max_message_size: 100,
            ..Default::default()
        };
        assert_eq!(config.check_warnings().len(), 4);
    }
}
