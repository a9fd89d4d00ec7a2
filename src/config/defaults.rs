//! Default configuration values
//!
//! This module provides default values for configuration options.
//! It is the single source of truth for defaults used by serde, the CLI
//! and `SourceConfig::default()`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use super::types::{FramingPolicy, PeerVerify, TransportKind};

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "SYSLOG_AUTODETECT";

/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Default listen port (RFC 6587 syslog over TCP)
pub const LISTEN_PORT: u16 = 601;

/// Default output file name
pub const OUTPUT_FILE: &str = "output.log";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default listen address
pub fn listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), LISTEN_PORT)
}

/// Default transport
pub fn transport() -> TransportKind {
    TransportKind::Auto
}

/// Default framing policy
pub fn framing() -> FramingPolicy {
    FramingPolicy::Auto
}

/// Default peer verification policy
pub fn peer_verify() -> PeerVerify {
    PeerVerify::RequiredTrusted
}

/// Default maximum message size (64KiB)
pub fn max_message_size() -> usize {
    65536
}

/// Default time to wait for the first bytes of each detection stage, in seconds
pub fn initial_data_timeout() -> u64 {
    10
}

/// Default TLS handshake timeout in seconds
pub fn handshake_timeout() -> u64 {
    10
}

/// Default maximum number of concurrent connections
pub fn max_connections() -> usize {
    1024
}

/// Default grace period for live connections at shutdown, in seconds
pub fn shutdown_timeout() -> u64 {
    5
}

/// Default output file
pub fn output() -> PathBuf {
    PathBuf::from(OUTPUT_FILE)
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}
