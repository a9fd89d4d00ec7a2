//! Configuration loading functionality
//!
//! Configuration is layered, lowest priority first:
//! 1. Default values (serde `default` attributes)
//! 2. JSON configuration file
//! 3. Environment variables prefixed with `SYSLOG_AUTODETECT_`
//! 4. Command-line overrides

use std::path::{Path, PathBuf};

use log::debug;
use ::config::{Config, Environment, File, FileFormat};

use super::defaults;
use super::error::{ConfigError, Result};
use super::types::{FramingPolicy, PeerVerify, SourceConfig, TlsConfig, TransportKind};

/// Trait for loading configuration from different sources
pub trait ConfigLoader: Sized {
    /// Load configuration from a file, without environment variables
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self>;

    /// Load configuration from an optional file layered under environment variables
    fn load(path: Option<&Path>) -> Result<Self>;
}

fn environment() -> Environment {
    // SYSLOG_AUTODETECT_TLS__PEER_VERIFY -> tls.peer_verify
    Environment::with_prefix(defaults::ENV_PREFIX)
        .prefix_separator("_")
        .separator(defaults::ENV_SEPARATOR)
        .try_parsing(true)
}

fn file_source(path: &Path) -> Result<File<::config::FileSourceFile, FileFormat>> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    Ok(File::from(path).format(FileFormat::Json))
}

impl ConfigLoader for SourceConfig {
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = Config::builder()
            .add_source(file_source(path)?)
            .build()?
            .try_deserialize::<Self>()?;

        debug!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(file_source(path)?);
            debug!("Loading configuration from {}", path.display());
        }

        let config = builder
            .add_source(environment())
            .build()?
            .try_deserialize::<Self>()?;

        Ok(config)
    }
}

/// Command-line overrides, applied on top of file and environment values
///
/// Every field is optional; `None` keeps the loaded value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<String>,
    pub transport: Option<TransportKind>,
    pub framing: Option<FramingPolicy>,
    pub tls_key: Option<PathBuf>,
    pub tls_cert: Option<PathBuf>,
    pub tls_ca: Option<PathBuf>,
    pub peer_verify: Option<PeerVerify>,
    pub max_message_size: Option<usize>,
    pub output: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl SourceConfig {
    /// Apply command-line overrides
    ///
    /// A key or certificate override creates the TLS block if the loaded
    /// configuration had none; both must then be present.
    pub fn apply_overrides(mut self, overrides: ConfigOverrides) -> Result<Self> {
        if let Some(listen) = overrides.listen {
            self.listen = crate::common::parse_socket_addr(&listen)
                .map_err(|e| ConfigError::InvalidValue("listen".to_string(), e.to_string()))?;
        }
        if let Some(transport) = overrides.transport {
            self.transport = transport;
        }
        if let Some(framing) = overrides.framing {
            self.framing = framing;
        }
        if let Some(size) = overrides.max_message_size {
            self.max_message_size = size;
        }
        if let Some(output) = overrides.output {
            self.output = output;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }

        let touches_tls = overrides.tls_key.is_some()
            || overrides.tls_cert.is_some()
            || overrides.tls_ca.is_some()
            || overrides.peer_verify.is_some();

        if touches_tls {
            let mut tls = match self.tls.take() {
                Some(tls) => tls,
                None => {
                    let key = overrides.tls_key.clone().ok_or_else(|| {
                        ConfigError::MissingRequiredValue("tls.key_file".to_string())
                    })?;
                    let cert = overrides.tls_cert.clone().ok_or_else(|| {
                        ConfigError::MissingRequiredValue("tls.cert_file".to_string())
                    })?;
                    TlsConfig::new(key, cert)
                }
            };

            if let Some(key) = overrides.tls_key {
                tls.key_file = key;
            }
            if let Some(cert) = overrides.tls_cert {
                tls.cert_file = cert;
            }
            if let Some(ca) = overrides.tls_ca {
                tls.ca_file = Some(ca);
            }
            if let Some(peer_verify) = overrides.peer_verify {
                tls.peer_verify = peer_verify;
            }
            self.tls = Some(tls);
        }

        Ok(self)
    }
}

/// Log the effective configuration
pub fn log_config(config: &SourceConfig) {
    use log::info;

    if !log::log_enabled!(log::Level::Info) {
        return;
    }

    info!("=== Source Configuration ===");
    info!("  Listen address: {}", config.listen);
    info!("  Transport: {}", config.transport);
    info!("  Framing: {}", config.framing);
    match config.tls {
        Some(ref tls) => {
            info!("  TLS key: {}", tls.key_file.display());
            info!("  TLS certificate: {}", tls.cert_file.display());
            if let Some(ref ca) = tls.ca_file {
                info!("  TLS CA bundle: {}", ca.display());
            }
            info!("  Peer verify: {}", tls.peer_verify);
        }
        None => info!("  TLS: disabled"),
    }
    info!("  Max message size: {} bytes", config.max_message_size);
    info!("  Initial data timeout: {} seconds", config.initial_data_timeout);
    info!("  Handshake timeout: {} seconds", config.handshake_timeout);
    info!("  Max connections: {}", config.max_connections);
    info!("  Output: {}", config.output.display());
    info!("============================");
}
