//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.
//! Every detection-stage error is local to one connection: the handler logs it,
//! closes that connection and keeps the listener running.

use thiserror::Error;
use std::io;

/// Syslog auto-detect error type
#[derive(Error, Debug)]
pub enum SyslogError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// OpenSSL error
    #[error("OpenSSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certificate error
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// PROXY protocol header is truncated, has a bad signature or inconsistent lengths
    #[error("Malformed PROXY protocol header: {0}")]
    MalformedProxyHeader(String),

    /// PROXY protocol v2 signature with a version other than 2
    #[error("Unsupported PROXY protocol version: {0}")]
    UnsupportedProxyVersion(u8),

    /// TLS handshake failed or the peer certificate was rejected
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),

    /// Stream ended before an octet-counted frame was complete
    #[error("Truncated frame: expected {expected} bytes, received {received}")]
    TruncatedFrame {
        /// Declared frame length
        expected: usize,
        /// Payload bytes available at end of stream
        received: usize,
    },

    /// Octet-counted frame larger than the configured maximum message size
    #[error("Frame of {length} bytes exceeds max_message_size ({max})")]
    OversizedFrame {
        /// Declared frame length
        length: usize,
        /// Configured limit
        max: usize,
    },

    /// Bytes at a message boundary are not a valid frame header
    #[error("Invalid frame header: {0}")]
    InvalidFrameHeader(String),

    /// Detection stage did not complete in time
    #[error("Timed out {0}")]
    Timeout(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `SyslogError`.
pub type Result<T> = std::result::Result<T, SyslogError>;

impl SyslogError {
    /// Whether this error came from malformed peer input rather than local I/O
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedProxyHeader(_)
                | Self::UnsupportedProxyVersion(_)
                | Self::HandshakeFailed(_)
                | Self::TruncatedFrame { .. }
                | Self::OversizedFrame { .. }
                | Self::InvalidFrameHeader(_)
        )
    }
}
