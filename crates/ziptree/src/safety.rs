//! Path checks for writing archive entries to disk.
//!
//! Stored entry names are untrusted. Before an entry is written below an
//! output directory its name must be relative and free of `..` segments
//! (zip-slip).

use crate::codec::SEPARATORS;
use crate::error::ArchiveError;
use std::path::PathBuf;

/// Validates a stored entry name and turns it into a relative platform path.
///
/// This function performs the following checks:
/// - Rejects absolute names (leading separator or drive prefix)
/// - Rejects names containing `..` segments
/// - Drops `.` and empty segments
/// - Rejects names that normalize to nothing
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use ziptree::safety::validate_entry_path;
///
/// let safe_path = validate_entry_path("dir/file.txt").unwrap();
/// assert_eq!(safe_path, Path::new("dir").join("file.txt"));
///
/// assert!(validate_entry_path("../../etc/passwd").is_err());
/// assert!(validate_entry_path("/etc/passwd").is_err());
/// ```
pub fn validate_entry_path(stored: &str) -> Result<PathBuf, ArchiveError> {
    if stored.starts_with(SEPARATORS) || has_drive_prefix(stored) {
        return Err(ArchiveError::InvalidPath(format!(
            "Absolute path not allowed: {}",
            stored
        )));
    }

    let mut normalized = PathBuf::new();
    for segment in stored.split(SEPARATORS) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(ArchiveError::InvalidPath(format!(
                    "Path contains '..' component: {}",
                    stored
                )));
            }
            part => normalized.push(part),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(ArchiveError::InvalidPath(format!(
            "Path normalizes to empty: {}",
            stored
        )));
    }

    Ok(normalized)
}

fn has_drive_prefix(stored: &str) -> bool {
    let bytes = stored.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
