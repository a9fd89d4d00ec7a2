//! Logging utilities
//!
//! Thin wrapper around `env_logger`. `RUST_LOG` wins over the configured level.

/// Initialize the logging system
///
/// # Parameters
///
/// * `level` - Log level used when `RUST_LOG` is not set
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialization (tests, embedding) is not an error worth reporting
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
