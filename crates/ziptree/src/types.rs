//! Type definitions shared by the builder, the extractor and their callers.

use crate::entry::{FileInfo, FileShare};
use crate::stream::DEFAULT_COPY_BUFFER_SIZE;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;

/// Options for building an archive.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Sharing granted to other processes while a source file is open.
    /// Read sharing is always granted in addition.
    pub additional_share: FileShare,

    /// Chunk size of the stream copy loop (default: 4096 bytes)
    pub copy_buffer_size: usize,

    /// Compression method for every entry
    pub compression: Compression,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            additional_share: FileShare::NONE,
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
            compression: Compression::Deflated,
        }
    }
}

/// Compression method used for archive entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression
    Stored,

    /// Deflate with the codec's default level
    Deflated,
}

/// What a progress handler wants the copy loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyControl {
    /// Keep copying
    Continue,

    /// Stop after the chunk that was just written
    Cancel,
}

/// How a stream copy ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Every byte was copied and the count matched the declared length, if any.
    Completed,

    /// The progress handler cancelled the copy.
    Cancelled,

    /// The source ended before reaching its declared length.
    Truncated {
        /// Bytes actually copied
        copied: u64,
        /// Length the source declared
        declared: u64,
    },
}

impl CopyOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, CopyOutcome::Completed)
    }
}

/// Decision taken by an error handler when a file cannot be opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryAction {
    /// Stop the whole build
    #[default]
    Abort,

    /// Skip this file and continue with the next one
    Ignore,

    /// Try to open the file again, immediately
    Retry,
}

/// One quantum of progress while building an archive.
#[derive(Debug, Clone, Serialize)]
pub struct BuildProgress<'a> {
    /// Bytes copied so far from the file in flight
    pub current_file_bytes: u64,

    /// Bytes copied across the batch, including the file in flight
    pub total_bytes: u64,

    /// Zero-based ordinal of the file in flight (counts open attempts)
    pub file_index: usize,

    /// Archive-relative path of the file in flight
    pub current_file: &'a str,

    /// Declared size of the file in flight
    pub estimated_file_size: u64,

    /// Files known so far; grows while directories are traversed
    pub estimated_file_count: usize,
}

/// Passed to the error handler when a file cannot be opened.
#[derive(Debug)]
pub struct FileOpenFailure<'a> {
    /// Full name of the file
    pub path: &'a str,

    /// Why the open failed
    pub error: &'a io::Error,
}

/// Listing view of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    /// Full name of the file
    pub path: String,

    /// Size in bytes
    pub size: u64,

    /// Last-write time
    pub modified: DateTime<Utc>,
}

impl FileSummary {
    pub fn of(file: &dyn FileInfo) -> Self {
        Self {
            path: file.full_name().to_string(),
            size: file.len(),
            modified: file.timestamps().modified,
        }
    }
}

/// Statistics about a completed extraction to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractStats {
    /// Number of files written
    pub files_extracted: u64,

    /// Total bytes written to disk
    pub bytes_written: u64,

    /// Duration of the extraction (in seconds)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl Default for ExtractStats {
    fn default() -> Self {
        Self {
            files_extracted: 0,
            bytes_written: 0,
            duration: Duration::from_secs(0),
        }
    }
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
