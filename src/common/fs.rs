//! File system helpers

use std::path::Path;

use super::error::{SyslogError, Result};

/// Check that a path exists and is a regular file
///
/// # Parameters
///
/// * `path` - File path
///
/// # Returns
///
/// `Ok(())` if the file exists, otherwise a configuration error.
pub fn check_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(SyslogError::Config(format!(
            "File does not exist: {}",
            path.display()
        )));
    }

    if !path.is_file() {
        return Err(SyslogError::Config(format!(
            "Path is not a file: {}",
            path.display()
        )));
    }

    Ok(())
}
