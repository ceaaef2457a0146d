//! Writes a batch of files and directory trees into one ZIP archive.

use crate::codec::{entry_options, path_segments, to_archive_path};
use crate::entry::{DirectoryInfo, FileAccess, FileInfo, FileMode, FileShare, FileSystemEntry};
use crate::error::{AbortError, ArchiveError};
use crate::stream::{ByteSource, StreamCopier};
use crate::types::{
    BuildOptions, BuildProgress, Compression, CopyControl, CopyOutcome, FileOpenFailure,
    RecoveryAction,
};
use crate::{ErrorCallback, ProgressCallback};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::mem;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info, warn};
use zip::ZipWriter;

/// Collects files and directories, then writes them into an archive.
///
/// The builder is reusable: every [`build`](Self::build) consumes the work
/// list and resets the counters, whether it succeeds or not.
///
/// # Example
///
/// ```rust,no_run
/// use std::rc::Rc;
/// use ziptree::{ArchiveBuilder, DiskDirectory, DiskFile};
///
/// # fn main() -> Result<(), ziptree::ArchiveError> {
/// let mut builder = ArchiveBuilder::new();
/// builder.add_file(Rc::new(DiskFile::new("notes.txt")));
/// builder.add_directory(Rc::new(DiskDirectory::new("photos")));
/// let archive = builder.build("backup.zip")?;
/// # drop(archive);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    entries: Vec<FileSystemEntry>,
    options: BuildOptions,
    estimated_file_count: usize,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: BuildOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Queues a single file. It is stored under its name.
    pub fn add_file(&mut self, file: Rc<dyn FileInfo>) {
        self.estimated_file_count += 1;
        self.entries.push(FileSystemEntry::File(file));
    }

    /// Queues a directory tree. Its files are stored below the directory's
    /// name and are only counted once the build reaches them.
    pub fn add_directory(&mut self, directory: Rc<dyn DirectoryInfo>) {
        self.entries.push(FileSystemEntry::Directory(directory));
    }

    pub fn add(&mut self, entry: FileSystemEntry) {
        match entry {
            FileSystemEntry::File(file) => self.add_file(file),
            FileSystemEntry::Directory(directory) => self.add_directory(directory),
        }
    }

    /// Queues a file or directory on disk.
    pub fn add_path(&mut self, path: impl AsRef<Path>) -> Result<(), ArchiveError> {
        self.add(FileSystemEntry::from_path(path)?);
        Ok(())
    }

    /// Files known so far. Grows while directories are traversed.
    pub fn estimated_file_count(&self) -> usize {
        self.estimated_file_count
    }

    /// Number of queued files and directories.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the archive without progress reporting or error recovery.
    ///
    /// The first file that cannot be opened fails the build with
    /// [`ArchiveError::FileOpen`].
    pub fn build(&mut self, destination: impl AsRef<Path>) -> Result<File, ArchiveError> {
        self.build_with(destination, &mut |_| CopyControl::Continue, None)
    }

    /// Writes every queued entry into a new archive at `destination` and
    /// reopens it for reading.
    ///
    /// `on_progress` is called after every chunk and may cancel the build.
    /// `on_error` decides what happens when a file cannot be opened; without
    /// it the open failure is returned as [`ArchiveError::FileOpen`].
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::InvalidPath`] if `destination` is empty
    /// - [`ArchiveError::Aborted`] on cancellation, on
    ///   [`RecoveryAction::Abort`] or when a file fails partway through
    /// - [`ArchiveError::DirectoryRead`] if a directory cannot be enumerated
    pub fn build_with(
        &mut self,
        destination: impl AsRef<Path>,
        on_progress: &mut ProgressCallback<'_>,
        on_error: Option<&mut ErrorCallback<'_>>,
    ) -> Result<File, ArchiveError> {
        let destination = destination.as_ref();
        if destination.as_os_str().is_empty() {
            return Err(ArchiveError::InvalidPath(
                "destination path must not be empty".to_string(),
            ));
        }

        let entries = mem::take(&mut self.entries);
        info!(
            destination = %destination.display(),
            entries = entries.len(),
            "Building archive"
        );

        let result = self.write_archive(destination, entries, on_progress, on_error);
        self.estimated_file_count = 0;
        let (files, bytes) = result?;

        info!(
            destination = %destination.display(),
            files,
            bytes,
            "Archive built"
        );
        Ok(File::open(destination)?)
    }

    fn write_archive(
        &mut self,
        destination: &Path,
        entries: Vec<FileSystemEntry>,
        on_progress: &mut ProgressCallback<'_>,
        on_error: Option<&mut ErrorCallback<'_>>,
    ) -> Result<(usize, u64), ArchiveError> {
        let output = File::create(destination)?;
        let mut batch = Batch {
            writer: ZipWriter::new(BufWriter::new(output)),
            copier: StreamCopier::new(self.options.copy_buffer_size),
            compression: self.options.compression,
            share: FileShare::READ | self.options.additional_share,
            file_index: 0,
            files_written: 0,
            completed_bytes: 0,
            estimated_file_count: &mut self.estimated_file_count,
            on_progress,
            on_error,
        };

        for entry in entries {
            match entry {
                FileSystemEntry::File(file) => {
                    let archive_path = archive_path_of_file(file.as_ref());
                    batch.write_file(file.as_ref(), &archive_path)?;
                }
                FileSystemEntry::Directory(directory) => batch.write_directory(directory)?,
            }
        }

        let (files, bytes) = (batch.files_written, batch.completed_bytes);
        let mut output = batch.writer.finish()?;
        output.flush()?;
        Ok((files, bytes))
    }
}

/// An individually added file is stored under its name when it sits in a
/// directory, otherwise under its full name.
fn archive_path_of_file(file: &dyn FileInfo) -> String {
    if file.directory().is_some() {
        file.name().to_string()
    } else {
        to_archive_path(&path_segments(file.full_name()))
    }
}

fn child_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        to_archive_path(&[prefix, name])
    }
}

/// State of one build run.
struct Batch<'a, 'p, 'e> {
    writer: ZipWriter<BufWriter<File>>,
    copier: StreamCopier,
    compression: Compression,
    share: FileShare,
    file_index: usize,
    files_written: usize,
    completed_bytes: u64,
    estimated_file_count: &'a mut usize,
    on_progress: &'a mut ProgressCallback<'p>,
    on_error: Option<&'a mut ErrorCallback<'e>>,
}

impl Batch<'_, '_, '_> {
    /// Depth first; the files of a directory are written before its
    /// subdirectories are entered.
    fn write_directory(&mut self, root: Rc<dyn DirectoryInfo>) -> Result<(), ArchiveError> {
        let root_prefix = root.name().to_string();
        let mut pending = vec![(root, root_prefix)];

        while let Some((directory, prefix)) = pending.pop() {
            let files = directory
                .files()
                .map_err(|source| ArchiveError::DirectoryRead {
                    path: directory.full_name().to_string(),
                    source,
                })?;
            *self.estimated_file_count += files.len();
            debug!(
                directory = directory.full_name(),
                files = files.len(),
                "Entering directory"
            );

            for file in &files {
                self.write_file(file.as_ref(), &child_path(&prefix, file.name()))?;
            }

            let subdirectories =
                directory
                    .directories()
                    .map_err(|source| ArchiveError::DirectoryRead {
                        path: directory.full_name().to_string(),
                        source,
                    })?;
            for subdirectory in subdirectories.into_iter().rev() {
                let sub_prefix = child_path(&prefix, subdirectory.name());
                pending.push((subdirectory, sub_prefix));
            }
        }
        Ok(())
    }

    fn write_file(&mut self, file: &dyn FileInfo, archive_path: &str) -> Result<(), ArchiveError> {
        let file_index = self.file_index;
        self.file_index += 1;

        file.refresh();
        let Some(mut source) = self.open_source(file)? else {
            return Ok(());
        };

        // Cached attributes may predate the build
        let size = source.declared_len().unwrap_or_else(|| file.len());
        let options = entry_options(self.compression, file.timestamps().modified, size);
        self.writer.start_file(archive_path, options)?;
        debug!(file = archive_path, size, file_index, "Writing entry");

        let completed_bytes = self.completed_bytes;
        let estimated_file_count = *self.estimated_file_count;
        let on_progress = &mut *self.on_progress;
        let mut copied = 0u64;

        let outcome = self
            .copier
            .copy(&mut source, &mut self.writer, None, &mut |bytes| {
                copied = bytes;
                on_progress(&BuildProgress {
                    current_file_bytes: bytes,
                    total_bytes: completed_bytes + bytes,
                    file_index,
                    current_file: archive_path,
                    estimated_file_size: size,
                    estimated_file_count,
                })
            });

        match outcome {
            Ok(CopyOutcome::Completed) => {
                self.completed_bytes += copied;
                self.files_written += 1;
                Ok(())
            }
            Ok(CopyOutcome::Cancelled) => {
                info!(file = archive_path, "Build cancelled");
                Err(AbortError::cancelled(archive_path).into())
            }
            Ok(CopyOutcome::Truncated { copied, declared }) => {
                let cause = io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "The stream ended after {} of {} bytes.",
                        copied, declared
                    ),
                );
                Err(AbortError::copy_failed(archive_path, cause).into())
            }
            Err(cause) => Err(AbortError::copy_failed(archive_path, cause).into()),
        }
    }

    /// Opens `file`, consulting the error handler on failure.
    ///
    /// Returns `None` when the handler chose to ignore the file.
    fn open_source(&mut self, file: &dyn FileInfo) -> Result<Option<Box<dyn ByteSource>>, ArchiveError> {
        loop {
            let error = match file.open(FileMode::Open, FileAccess::Read, self.share) {
                Ok(source) => return Ok(Some(source)),
                Err(error) => error,
            };

            let Some(on_error) = self.on_error.as_deref_mut() else {
                return Err(ArchiveError::FileOpen {
                    path: file.full_name().to_string(),
                    source: error,
                });
            };

            let failure = FileOpenFailure {
                path: file.full_name(),
                error: &error,
            };
            match on_error(&failure) {
                RecoveryAction::Abort => {
                    warn!(file = file.full_name(), error = %error, "Aborting build");
                    return Err(AbortError::recovery_abort(file.full_name()).into());
                }
                RecoveryAction::Ignore => {
                    warn!(file = file.full_name(), error = %error, "Skipping file");
                    return Ok(None);
                }
                RecoveryAction::Retry => {
                    debug!(file = file.full_name(), error = %error, "Retrying open");
                }
            }
        }
    }
}
