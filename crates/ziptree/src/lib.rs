//! # ziptree
//!
//! Builds ZIP archives from files on disk, in-memory buffers and whole
//! directory trees, and reads them back as a navigable tree of files.
//!
//! Building reports progress after every copied chunk and lets the caller
//! decide, per file that cannot be opened, whether to retry it, skip it or
//! abort the build.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use ziptree::{
//!     open_archive, ArchiveBuilder, BuildProgress, CopyControl, DiskDirectory, FileOpenFailure,
//!     FileSystemInfo, RecoveryAction,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = ArchiveBuilder::new();
//! builder.add_directory(Rc::new(DiskDirectory::new("documents")));
//!
//! let mut on_progress = |progress: &BuildProgress<'_>| {
//!     println!("{} ({} bytes so far)", progress.current_file, progress.total_bytes);
//!     CopyControl::Continue
//! };
//! let mut on_error = |failure: &FileOpenFailure<'_>| {
//!     eprintln!("Skipping {}: {}", failure.path, failure.error);
//!     RecoveryAction::Ignore
//! };
//! builder.build_with("documents.zip", &mut on_progress, Some(&mut on_error))?;
//!
//! let extractor = open_archive("documents.zip")?;
//! for file in extractor.files() {
//!     println!("{}", file.full_name());
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod codec;
pub mod disk;
pub mod entry;
pub mod error;
pub mod extractor;
pub mod fs;
pub mod memory;
pub mod resolver;
pub mod safety;
pub mod stream;
pub mod types;

// Re-export main types
pub use builder::ArchiveBuilder;
pub use disk::{DiskDirectory, DiskFile};
pub use entry::{
    DirectoryInfo, FileAccess, FileInfo, FileMode, FileShare, FileSystemEntry, FileSystemInfo,
    Timestamps,
};
pub use error::{AbortError, AbortKind, ArchiveError};
pub use extractor::{ArchiveEntryFile, ArchiveExtractor};
pub use fs::{FileSystem, OsFileSystem};
pub use memory::{InMemoryDirectory, InMemoryFile};
pub use resolver::DirectoryTreeResolver;
pub use stream::{ByteSource, NonSeekable, StreamCopier, TemporaryFile, DEFAULT_COPY_BUFFER_SIZE};
pub use types::{
    BuildOptions, BuildProgress, Compression, CopyControl, CopyOutcome, ExtractStats,
    FileOpenFailure, FileSummary, RecoveryAction,
};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Type alias for build progress callbacks.
///
/// Called after every chunk copied into the archive. Returning
/// [`CopyControl::Cancel`] stops the build with a cancellation
/// [`AbortError`].
pub type ProgressCallback<'a> = dyn FnMut(&BuildProgress<'_>) -> CopyControl + 'a;

/// Type alias for file-open error callbacks.
///
/// Called when a file cannot be opened; the returned [`RecoveryAction`]
/// decides whether the build retries, skips the file or aborts.
pub type ErrorCallback<'a> = dyn FnMut(&FileOpenFailure<'_>) -> RecoveryAction + 'a;

/// Open an archive file for browsing.
///
/// # Errors
///
/// Returns an error if:
/// - The file doesn't exist or cannot be read
/// - The file is not a ZIP archive
/// - An entry has an empty name
pub fn open_archive(path: impl AsRef<Path>) -> Result<ArchiveExtractor<BufReader<File>>, ArchiveError> {
    let file = File::open(path)?;
    ArchiveExtractor::new(BufReader::new(file))
}
