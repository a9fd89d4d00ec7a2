//! Configuration types
//!
//! This module contains the main configuration types used throughout the application.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::defaults;
use super::error::ConfigError;
use crate::common::parse_socket_addr;

/// Normalize an enum option value: case-insensitive, `_` and `-` equivalent,
/// surrounding quotes ignored (`transport("auto")` style values).
fn normalize(s: &str) -> String {
    s.trim().trim_matches('"').to_lowercase().replace('_', "-")
}

/// Implements case-insensitive deserialization through `FromStr`
macro_rules! deserialize_from_str {
    ($ty:ty) => {
        impl<'de> Deserialize<'de> for $ty {
            #[inline]
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                <$ty>::from_str(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Wire convention accepted by the source
///
/// Selects which detection stages run on each connection and whether they
/// are optional or mandatory.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Plain TCP
    Tcp,
    /// TLS on every connection
    Tls,
    /// Sniff PROXY header, TLS and framing per connection
    Auto,
    /// PROXY header on the raw socket, then plain TCP
    ProxiedTcp,
    /// TLS, with the PROXY header sent inside the TLS session
    ProxiedTls,
    /// PROXY header on the raw socket, then TLS over the rest of the connection
    ProxiedTlsPassthrough,
}

impl TransportKind {
    /// Whether this transport can only work with a TLS configuration
    pub fn requires_tls(&self) -> bool {
        matches!(self, Self::Tls | Self::ProxiedTls | Self::ProxiedTlsPassthrough)
    }
}

impl Default for TransportKind {
    #[inline]
    fn default() -> Self {
        defaults::transport()
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Tls => write!(f, "tls"),
            Self::Auto => write!(f, "auto"),
            Self::ProxiedTcp => write!(f, "proxied-tcp"),
            Self::ProxiedTls => write!(f, "proxied-tls"),
            Self::ProxiedTlsPassthrough => write!(f, "proxied-tls-passthrough"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "tcp" => Ok(Self::Tcp),
            "tls" => Ok(Self::Tls),
            "auto" => Ok(Self::Auto),
            "proxied-tcp" => Ok(Self::ProxiedTcp),
            "proxied-tls" => Ok(Self::ProxiedTls),
            "proxied-tls-passthrough" => Ok(Self::ProxiedTlsPassthrough),
            _ => Err(ConfigError::InvalidValue(
                "transport".to_string(),
                format!("{}. Valid values are: tcp, tls, auto, proxied-tcp, proxied-tls, proxied-tls-passthrough", s),
            )),
        }
    }
}

deserialize_from_str!(TransportKind);

/// How message boundaries are found in the decoded stream
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FramingPolicy {
    /// Sniff octet-counted vs. newline framing at every message boundary
    Auto,
    /// Sniff the first message, then keep that mode for the connection
    AutoOnce,
    /// Always octet-counted (`<length> <message>`)
    OctetCounted,
    /// Always newline-delimited
    NonTransparent,
}

impl Default for FramingPolicy {
    #[inline]
    fn default() -> Self {
        defaults::framing()
    }
}

impl fmt::Display for FramingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::AutoOnce => write!(f, "auto-once"),
            Self::OctetCounted => write!(f, "octet-counted"),
            Self::NonTransparent => write!(f, "non-transparent"),
        }
    }
}

impl FromStr for FramingPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "auto" => Ok(Self::Auto),
            "auto-once" => Ok(Self::AutoOnce),
            "octet-counted" | "framed" => Ok(Self::OctetCounted),
            "non-transparent" | "legacy" => Ok(Self::NonTransparent),
            _ => Err(ConfigError::InvalidValue(
                "framing".to_string(),
                format!("{}. Valid values are: auto, auto-once, octet-counted, non-transparent", s),
            )),
        }
    }
}

deserialize_from_str!(FramingPolicy);

/// Client certificate verification policy
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PeerVerify {
    /// No client certificate is requested
    None,
    /// A certificate is requested; any certificate is accepted
    OptionalUntrusted,
    /// A certificate is requested; if presented it must be trusted
    OptionalTrusted,
    /// A certificate must be presented; trust is not checked
    RequiredUntrusted,
    /// A trusted certificate chain must be presented
    RequiredTrusted,
}

impl PeerVerify {
    /// Whether the peer must present a certificate
    pub fn requires_certificate(&self) -> bool {
        matches!(self, Self::RequiredUntrusted | Self::RequiredTrusted)
    }

    /// Whether a presented certificate must chain to a trusted CA
    pub fn requires_trust(&self) -> bool {
        matches!(self, Self::OptionalTrusted | Self::RequiredTrusted)
    }
}

impl Default for PeerVerify {
    #[inline]
    fn default() -> Self {
        defaults::peer_verify()
    }
}

impl fmt::Display for PeerVerify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::OptionalUntrusted => write!(f, "optional-untrusted"),
            Self::OptionalTrusted => write!(f, "optional-trusted"),
            Self::RequiredUntrusted => write!(f, "required-untrusted"),
            Self::RequiredTrusted => write!(f, "required-trusted"),
        }
    }
}

impl FromStr for PeerVerify {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "none" => Ok(Self::None),
            "optional-untrusted" => Ok(Self::OptionalUntrusted),
            "optional-trusted" => Ok(Self::OptionalTrusted),
            "required-untrusted" => Ok(Self::RequiredUntrusted),
            "required-trusted" => Ok(Self::RequiredTrusted),
            _ => Err(ConfigError::InvalidValue(
                "peer_verify".to_string(),
                format!(
                    "{}. Valid values are: none, optional-untrusted, optional-trusted, required-untrusted, required-trusted",
                    s
                ),
            )),
        }
    }
}

deserialize_from_str!(PeerVerify);

/// Custom deserializer for socket addresses
fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_socket_addr(&s).map_err(serde::de::Error::custom)
}

/// TLS settings of the source
///
/// Loaded once at startup and shared read-only by every connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM private key
    pub key_file: PathBuf,

    /// PEM server certificate
    pub cert_file: PathBuf,

    /// PEM bundle of CAs trusted for client certificates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,

    /// Client certificate verification policy
    #[serde(default = "defaults::peer_verify")]
    pub peer_verify: PeerVerify,
}

impl TlsConfig {
    /// Create TLS settings with the default peer verification policy
    pub fn new(key_file: impl Into<PathBuf>, cert_file: impl Into<PathBuf>) -> Self {
        Self {
            key_file: key_file.into(),
            cert_file: cert_file.into(),
            ca_file: None,
            peer_verify: defaults::peer_verify(),
        }
    }

    /// Set the peer verification policy
    pub fn with_peer_verify(mut self, peer_verify: PeerVerify) -> Self {
        self.peer_verify = peer_verify;
        self
    }

    /// Set the trusted CA bundle
    pub fn with_ca_file(mut self, ca_file: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(ca_file.into());
        self
    }
}

/// Syslog source configuration
///
/// Contains all options of one listening source. Supports loading from
/// configuration files, environment variables and command-line arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourceConfig {
    // --- Network settings ---

    /// Listen address
    #[serde(default = "defaults::listen", deserialize_with = "deserialize_socket_addr")]
    pub listen: SocketAddr,

    /// Wire convention (tcp, tls, auto, proxied-tcp, proxied-tls, proxied-tls-passthrough)
    #[serde(default)]
    pub transport: TransportKind,

    /// Framing policy (auto, auto-once, octet-counted, non-transparent)
    #[serde(default)]
    pub framing: FramingPolicy,

    /// TLS settings; required by the TLS transports, enables TLS sniffing for `auto`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    // --- Limits ---

    /// Largest accepted message in bytes
    #[serde(default = "defaults::max_message_size")]
    pub max_message_size: usize,

    /// Seconds to wait for the bytes each detection stage needs
    #[serde(default = "defaults::initial_data_timeout")]
    pub initial_data_timeout: u64,

    /// Seconds allowed for the TLS handshake
    #[serde(default = "defaults::handshake_timeout")]
    pub handshake_timeout: u64,

    /// Maximum number of concurrent connections
    #[serde(default = "defaults::max_connections")]
    pub max_connections: usize,

    /// Seconds live connections get to finish at shutdown
    #[serde(default = "defaults::shutdown_timeout")]
    pub shutdown_timeout: u64,

    // --- General settings ---

    /// File decoded messages are appended to
    #[serde(default = "defaults::output")]
    pub output: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

impl Default for SourceConfig {
    /// Create a default configuration using centralized defaults
    #[inline]
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            transport: defaults::transport(),
            framing: defaults::framing(),
            tls: None,
            max_message_size: defaults::max_message_size(),
            initial_data_timeout: defaults::initial_data_timeout(),
            handshake_timeout: defaults::handshake_timeout(),
            max_connections: defaults::max_connections(),
            shutdown_timeout: defaults::shutdown_timeout(),
            output: defaults::output(),
            log_level: defaults::log_level(),
        }
    }
}
