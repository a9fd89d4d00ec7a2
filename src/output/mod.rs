//! Message output
//!
//! Minimal downstream for decoded messages: priority split plus an
//! append-only file writer.

mod file;
mod message;

pub use file::{FileSink, DEFAULT_CHANNEL_CAPACITY};
pub use message::{LogRecord, DEFAULT_PRIORITY};
