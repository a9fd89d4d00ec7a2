//! Syslog source server
//!
//! Listens for connections, runs transport detection on each one and feeds
//! decoded messages to the output.

mod handler;
mod listener;
mod message;
mod stats;

pub use handler::handle_connection;
pub use listener::SyslogSource;
pub use message::{SourceHandle, SourceMessage};
pub use stats::{SourceStats, StatsSnapshot};
