//! Browsing and extracting an existing ZIP archive.
//!
//! The archive is read once on construction. Its file entries become
//! [`ArchiveEntryFile`]s arranged in an in-memory directory tree; entry
//! content is decompressed only when a file is opened.

use crate::codec::{from_zip_time, path_segments, to_platform_path};
use crate::disk::DiskFile;
use crate::entry::{
    ensure_read_only_access, last_segment, DirectoryInfo, FileAccess, FileInfo, FileMode,
    FileShare, FileSystemInfo, Timestamps,
};
use crate::error::ArchiveError;
use crate::memory::{weak_parent, InMemoryDirectory};
use crate::resolver::DirectoryTreeResolver;
use crate::safety::validate_entry_path;
use crate::stream::{ByteSource, StreamCopier};
use crate::types::{CopyControl, CopyOutcome, ExtractStats};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek};
use std::path::{Path, MAIN_SEPARATOR_STR};
use std::rc::{Rc, Weak};
use std::time::Instant;
use tracing::{debug, info};
use zip::ZipArchive;

/// Reads the decompressed content of an entry by index.
trait EntrySource {
    fn read_entry(&mut self, index: usize) -> io::Result<Vec<u8>>;
}

impl<R: Read + Seek> EntrySource for ZipArchive<R> {
    fn read_entry(&mut self, index: usize) -> io::Result<Vec<u8>> {
        let mut entry = self.by_index(index).map_err(io::Error::from)?;
        let mut content = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry.read_to_end(&mut content)?;
        Ok(content)
    }
}

/// Metadata of one archive entry, collected before the tree is built.
struct EntryRecord {
    index: usize,
    name: String,
    is_dir: bool,
    size: u64,
    modified: DateTime<Utc>,
}

/// A file stored in an opened archive.
///
/// Read-only. Opening it decompresses the entry into memory; this fails
/// once the [`ArchiveExtractor`] that produced it is gone.
pub struct ArchiveEntryFile {
    archive: Weak<RefCell<dyn EntrySource>>,
    index: usize,
    stored_name: String,
    full_name: String,
    size: u64,
    modified: DateTime<Utc>,
    directory: Option<Weak<dyn DirectoryInfo>>,
}

impl ArchiveEntryFile {
    /// Position of the entry in the archive's central directory.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Name exactly as stored in the archive.
    pub fn stored_name(&self) -> &str {
        &self.stored_name
    }
}

impl fmt::Debug for ArchiveEntryFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveEntryFile")
            .field("index", &self.index)
            .field("stored_name", &self.stored_name)
            .field("size", &self.size)
            .field("modified", &self.modified)
            .finish()
    }
}

impl FileSystemInfo for ArchiveEntryFile {
    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn name(&self) -> &str {
        last_segment(&self.full_name)
    }

    fn exists(&self) -> bool {
        self.archive.strong_count() > 0
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn timestamps(&self) -> Timestamps {
        Timestamps::uniform(self.modified)
    }
}

impl FileInfo for ArchiveEntryFile {
    fn len(&self) -> u64 {
        self.size
    }

    fn directory(&self) -> Option<Rc<dyn DirectoryInfo>> {
        self.directory.as_ref().and_then(Weak::upgrade)
    }

    fn open(
        &self,
        _mode: FileMode,
        access: FileAccess,
        _share: FileShare,
    ) -> io::Result<Box<dyn ByteSource>> {
        ensure_read_only_access(&self.full_name, access)?;
        let archive = self.archive.upgrade().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, ArchiveError::Closed.to_string())
        })?;
        let mut archive = archive.try_borrow_mut().map_err(|_| {
            io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("archive is busy reading another entry than '{}'", self.full_name),
            )
        })?;
        let content = archive.read_entry(self.index)?;
        Ok(Box::new(Cursor::new(content)))
    }
}

/// Presents a ZIP archive as a flat file list and a directory tree.
///
/// # Example
///
/// ```rust,no_run
/// use std::fs::File;
/// use std::io::BufReader;
/// use ziptree::{ArchiveExtractor, DirectoryInfo, FileSystemInfo};
///
/// # fn main() -> Result<(), ziptree::ArchiveError> {
/// let extractor = ArchiveExtractor::new(BufReader::new(File::open("backup.zip")?))?;
/// for directory in extractor.root_directories() {
///     println!("{}", directory.name());
///     for file in directory.files()? {
///         println!("  {} ({} bytes)", file.name(), file.len());
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct ArchiveExtractor<R: Read + Seek + 'static> {
    archive: Rc<RefCell<ZipArchive<R>>>,
    entries: Vec<Rc<ArchiveEntryFile>>,
    files: Vec<Rc<dyn FileInfo>>,
    root: Rc<InMemoryDirectory>,
}

impl<R: Read + Seek + 'static> ArchiveExtractor<R> {
    /// Reads the archive's central directory and builds the file tree.
    ///
    /// Directory entries stored in the archive are skipped; directories are
    /// derived from file paths.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Zip`] if `reader` is not a readable archive and
    /// [`ArchiveError::InvalidPath`] if a file entry has an empty name.
    pub fn new(reader: R) -> Result<Self, ArchiveError> {
        let archive = Rc::new(RefCell::new(ZipArchive::new(reader)?));
        let records = Self::read_records(&mut archive.borrow_mut())?;

        let source: Rc<RefCell<dyn EntrySource>> = archive.clone();
        let source = Rc::downgrade(&source);
        let timestamps = Timestamps::now();
        let mut resolver = DirectoryTreeResolver::new(timestamps);
        let mut entries = Vec::new();
        let mut files = Vec::new();

        for record in records.into_iter().filter(|record| !record.is_dir) {
            let full_name = to_platform_path(&path_segments(&record.name));
            let file = resolver.resolve_file_with_path(&record.name, |_, directory| {
                let entry = Rc::new(ArchiveEntryFile {
                    archive: Weak::clone(&source),
                    index: record.index,
                    stored_name: record.name.clone(),
                    full_name,
                    size: record.size,
                    modified: record.modified,
                    directory: directory.map(weak_parent),
                });
                entries.push(Rc::clone(&entry));
                Ok(entry as Rc<dyn FileInfo>)
            })?;
            files.push(file);
        }

        let root = InMemoryDirectory::new(MAIN_SEPARATOR_STR, None, timestamps)?;
        for directory in resolver.root_directories() {
            root.push_directory(Rc::clone(directory));
        }
        for file in files.iter().filter(|file| file.directory().is_none()) {
            root.push_file(Rc::clone(file));
        }

        debug!(
            files = files.len(),
            directories = resolver.root_directories().len(),
            "Opened archive"
        );

        Ok(Self {
            archive,
            entries,
            files,
            root,
        })
    }

    fn read_records(archive: &mut ZipArchive<R>) -> Result<Vec<EntryRecord>, ArchiveError> {
        let mut records = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index(index)?;
            let modified: Option<zip::DateTime> = entry.last_modified().into();
            records.push(EntryRecord {
                index,
                name: entry.name().to_string(),
                is_dir: entry.is_dir(),
                size: entry.size(),
                modified: from_zip_time(modified),
            });
        }
        Ok(records)
    }

    /// Every file in the archive, in archive order.
    pub fn files(&self) -> &[Rc<dyn FileInfo>] {
        &self.files
    }

    /// Every file in the archive with its concrete type.
    pub fn entries(&self) -> &[Rc<ArchiveEntryFile>] {
        &self.entries
    }

    /// Top-level directories of the archive.
    pub fn root_directories(&self) -> Vec<Rc<dyn DirectoryInfo>> {
        self.root
            .subdirectories()
            .into_iter()
            .map(|directory| directory as Rc<dyn DirectoryInfo>)
            .collect()
    }

    /// A synthetic root directory holding the top-level directories and
    /// files.
    pub fn as_directory(&self) -> Rc<dyn DirectoryInfo> {
        self.root.clone()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Writes every file below `output_dir`, restoring last-write times.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::InvalidPath`] for entry names that are
    /// absolute or contain `..`. Nothing is written for the offending entry
    /// or any entry after it.
    pub fn extract_to(&self, output_dir: impl AsRef<Path>) -> Result<ExtractStats, ArchiveError> {
        let start = Instant::now();
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir)?;

        let copier = StreamCopier::default();
        let mut stats = ExtractStats::default();

        for entry in &self.entries {
            let target = output_dir.join(validate_entry_path(entry.stored_name())?);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut source = entry.open(FileMode::Open, FileAccess::Read, FileShare::READ)?;
            let mut output = File::create(&target)?;
            let outcome = copier.copy(&mut source, &mut output, Some(entry.len()), &mut |_| {
                CopyControl::Continue
            })?;
            if let CopyOutcome::Truncated { copied, declared } = outcome {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "'{}' ended after {} of {} bytes",
                        entry.stored_name(),
                        copied,
                        declared
                    ),
                )
                .into());
            }
            drop(output);

            DiskFile::new(&target).set_last_write_time_utc(entry.modified)?;
            debug!(file = entry.stored_name(), target = %target.display(), "Extracted file");

            stats.files_extracted += 1;
            stats.bytes_written += entry.len();
        }

        stats.duration = start.elapsed();
        info!(
            files = stats.files_extracted,
            bytes = stats.bytes_written,
            output = %output_dir.display(),
            "Extraction complete"
        );
        Ok(stats)
    }

    /// Releases the archive and returns the reader it was opened on.
    ///
    /// Files obtained from this extractor can no longer be opened afterwards.
    pub fn into_inner(self) -> Result<R, ArchiveError> {
        let Self { archive, .. } = self;
        let archive = Rc::try_unwrap(archive).map_err(|_| ArchiveError::Closed)?;
        Ok(archive.into_inner().into_inner())
    }
}

impl<R: Read + Seek + 'static> fmt::Debug for ArchiveExtractor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveExtractor")
            .field("files", &self.files.len())
            .field("root", &self.root.full_name())
            .finish()
    }
}
