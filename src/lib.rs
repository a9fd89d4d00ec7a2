//! Syslog Autodetect: syslog TCP source with transport auto-detection
//!
//! Accepts syslog over TCP and works out, per connection, which wire
//! conventions the peer uses:
//!
//! - an optional HAProxy PROXY protocol header (v1 text or v2 binary),
//!   either on the raw socket or as the first bytes inside TLS
//! - an optional TLS session, with a configurable peer verification policy
//! - RFC 6587 octet-counted framing or newline-terminated legacy framing,
//!   decided again for every message
//!
//! # Example
//!
//! ```no_run
//! use syslog_autodetect::config::{SourceConfig, TransportKind};
//! use syslog_autodetect::output::{FileSink, DEFAULT_CHANNEL_CAPACITY};
//! use syslog_autodetect::{Result, SyslogSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SourceConfig {
//!         transport: TransportKind::Auto,
//!         ..Default::default()
//!     };
//!
//!     let (sink, writer) = FileSink::open(&config.output, DEFAULT_CHANNEL_CAPACITY).await?;
//!     let source = SyslogSource::bind(config, None, sink).await?;
//!     let handle = source.start();
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await?;
//!     let _ = writer.await;
//!
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod detect;
pub mod output;
pub mod protocol;
pub mod server;
pub mod tls;
pub mod transport;

// Re-export commonly used structures and functions for convenience
pub use common::{parse_socket_addr, Result, SyslogError};
pub use detect::{ConnectionInfo, DetectionState, Detector};
pub use server::{SourceHandle, SyslogSource};
pub use tls::create_tls_acceptor;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
