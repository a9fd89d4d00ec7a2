//! Common module
//!
//! This module contains shared errors and utility functions used throughout the application.

pub mod error;
pub mod fs;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use error::{SyslogError, Result};
pub use fs::check_file_exists;
pub use log::init_logger;
pub use net::{configure_stream, parse_socket_addr};
