//! The file and directory abstraction the builder and extractor work on.
//!
//! A file may be a physical file ([`DiskFile`](crate::disk::DiskFile)), a byte
//! buffer ([`InMemoryFile`](crate::memory::InMemoryFile)) or an entry of an
//! opened archive ([`ArchiveEntryFile`](crate::extractor::ArchiveEntryFile)).
//! Directories are either physical or synthesized in memory. Parents are held
//! weakly; children are owned by their directory.

use crate::codec::SEPARATORS;
use crate::disk::{DiskDirectory, DiskFile};
use crate::stream::ByteSource;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ffi::OsStr;
use std::fmt;
use std::fs::Metadata;
use std::io;
use std::ops::BitOr;
use std::path::Path;
use std::rc::Rc;
use std::time::SystemTime;

/// How to open a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Open an existing file
    Open,
    /// Open the file, creating it when missing
    OpenOrCreate,
    /// Create the file, truncating it when present
    Create,
    /// Create the file, failing when present
    CreateNew,
    /// Open an existing file and truncate it
    Truncate,
    /// Open or create the file and write at its end
    Append,
}

/// Requested access to an opened file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAccess {
    Read,
    Write,
    ReadWrite,
}

impl FileAccess {
    pub fn can_read(self) -> bool {
        matches!(self, FileAccess::Read | FileAccess::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, FileAccess::Write | FileAccess::ReadWrite)
    }
}

/// Access other handles may hold on a file while it is open.
///
/// The bit values match the Windows share flags; on other platforms sharing
/// is advisory and the value is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileShare(u32);

impl FileShare {
    pub const NONE: FileShare = FileShare(0);
    pub const READ: FileShare = FileShare(0x1);
    pub const WRITE: FileShare = FileShare(0x2);
    pub const DELETE: FileShare = FileShare(0x4);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: FileShare) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FileShare {
    type Output = FileShare;

    fn bitor(self, rhs: FileShare) -> FileShare {
        FileShare(self.0 | rhs.0)
    }
}

/// Creation, last-access and last-write times, all UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timestamps {
    pub created: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Timestamps {
    /// All three times set to `at`.
    pub fn uniform(at: DateTime<Utc>) -> Self {
        Self {
            created: at,
            accessed: at,
            modified: at,
        }
    }

    pub fn now() -> Self {
        Self::uniform(Utc::now())
    }

    /// Reads the times of a physical entry; unsupported ones fall back to
    /// the Unix epoch.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let or_epoch = |time: io::Result<SystemTime>| {
            DateTime::<Utc>::from(time.unwrap_or(SystemTime::UNIX_EPOCH))
        };
        Self {
            created: or_epoch(metadata.created()),
            accessed: or_epoch(metadata.accessed()),
            modified: or_epoch(metadata.modified()),
        }
    }
}

impl Default for Timestamps {
    fn default() -> Self {
        Self::uniform(DateTime::<Utc>::from(SystemTime::UNIX_EPOCH))
    }
}

/// Attributes shared by files and directories.
pub trait FileSystemInfo: fmt::Debug {
    /// Path on disk, absent for in-memory and archive entries.
    fn physical_path(&self) -> Option<&Path> {
        None
    }

    /// Identity of the entry. Not necessarily a physical path.
    fn full_name(&self) -> &str;

    /// Last segment of the full name.
    fn name(&self) -> &str;

    /// Extension of [`name`](Self::name) without the leading dot.
    fn extension(&self) -> Option<&str> {
        Path::new(self.name()).extension().and_then(OsStr::to_str)
    }

    fn exists(&self) -> bool;

    fn is_read_only(&self) -> bool;

    fn timestamps(&self) -> Timestamps;

    /// Re-reads cached metadata. A no-op for entries whose metadata is fixed.
    fn refresh(&self) {}
}

/// A file that can be put into, or read out of, an archive.
pub trait FileInfo: FileSystemInfo {
    /// Length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The directory containing this file, if any.
    fn directory(&self) -> Option<Rc<dyn DirectoryInfo>>;

    /// Opens the file's content.
    fn open(
        &self,
        mode: FileMode,
        access: FileAccess,
        share: FileShare,
    ) -> io::Result<Box<dyn ByteSource>>;
}

/// A directory whose files and subdirectories can be enumerated.
pub trait DirectoryInfo: FileSystemInfo {
    /// The parent directory; `None` for a root.
    fn parent(&self) -> Option<Rc<dyn DirectoryInfo>>;

    fn files(&self) -> io::Result<Vec<Rc<dyn FileInfo>>>;

    fn directories(&self) -> io::Result<Vec<Rc<dyn DirectoryInfo>>>;
}

/// An item of a builder's work list: either a file or a directory.
#[derive(Debug, Clone)]
pub enum FileSystemEntry {
    File(Rc<dyn FileInfo>),
    Directory(Rc<dyn DirectoryInfo>),
}

impl FileSystemEntry {
    /// Classifies a physical path once, up front.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if metadata.is_dir() {
            Ok(FileSystemEntry::Directory(Rc::new(DiskDirectory::new(path))))
        } else {
            Ok(FileSystemEntry::File(Rc::new(DiskFile::new(path))))
        }
    }

    pub fn full_name(&self) -> &str {
        match self {
            FileSystemEntry::File(file) => file.full_name(),
            FileSystemEntry::Directory(directory) => directory.full_name(),
        }
    }
}

impl From<Rc<dyn FileInfo>> for FileSystemEntry {
    fn from(file: Rc<dyn FileInfo>) -> Self {
        FileSystemEntry::File(file)
    }
}

impl From<Rc<dyn DirectoryInfo>> for FileSystemEntry {
    fn from(directory: Rc<dyn DirectoryInfo>) -> Self {
        FileSystemEntry::Directory(directory)
    }
}

/// Last segment of a full name, split on either separator.
pub(crate) fn last_segment(full_name: &str) -> &str {
    full_name.rsplit(SEPARATORS).next().unwrap_or(full_name)
}

/// Fails with `PermissionDenied` when write access is requested on a
/// read-only entry.
pub(crate) fn ensure_read_only_access(full_name: &str, access: FileAccess) -> io::Result<()> {
    if access.can_write() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("'{}' is read-only", full_name),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_share_union_keeps_read() {
        let share = FileShare::NONE | FileShare::READ;
        assert!(share.contains(FileShare::READ));
        assert!(!share.contains(FileShare::WRITE));

        let share = FileShare::WRITE | FileShare::READ;
        assert_eq!(share.bits(), 0x3);
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("file.txt"), "file.txt");
        assert_eq!(last_segment("dir/file.txt"), "file.txt");
        assert_eq!(last_segment("dir\\sub\\file.txt"), "file.txt");
        assert_eq!(last_segment("dir/"), "");
    }

    #[test]
    fn test_read_only_access() {
        assert!(ensure_read_only_access("f", FileAccess::Read).is_ok());
        let err = ensure_read_only_access("f", FileAccess::ReadWrite).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
