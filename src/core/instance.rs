//! Instance names and the instance view handed to callers

use serde::Serialize;
use std::path::PathBuf;

use super::error::{Error, Result};

/// File name of the instance list inside the instances root
pub const LIST_FILE_NAME: &str = "Instances.list";

/// Scratch file used while replacing the instance list
pub const LIST_TEMP_FILE_NAME: &str = "Instances.list.tmp";

/// Longest name most filesystems accept for a single path segment
const MAX_NAME_BYTES: usize = 255;

/// Characters that split a path into segments on this platform
#[cfg(windows)]
const PATH_SEPARATORS: &[char] = &['/', '\\'];
#[cfg(not(windows))]
const PATH_SEPARATORS: &[char] = &['/'];

/// Check that `name` can be used both as a list entry and as a directory name
/// directly under the instances root.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name cannot be empty")
    } else if name.len() > MAX_NAME_BYTES {
        Some("name is longer than 255 bytes")
    } else if name == "." || name == ".." {
        Some("'.' and '..' are reserved")
    } else if name.contains(PATH_SEPARATORS) {
        Some("name cannot contain a path separator")
    } else if name.chars().any(char::is_control) {
        Some("name cannot contain control characters")
    } else if name.trim() != name {
        Some("name cannot start or end with whitespace")
    } else if name == LIST_FILE_NAME || name == LIST_TEMP_FILE_NAME {
        Some("name is reserved for the instance list")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// A registered instance as seen from outside the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    /// Unique name, also the directory name
    pub name: String,
    /// Directory used as the instance's home
    pub root: PathBuf,
    /// Whether an application config has been imported
    pub has_config: bool,
}
