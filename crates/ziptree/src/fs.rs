//! File-system capability used around archive building.
//!
//! Mutating operations block until their effect is visible to a subsequent
//! existence check, polling every 10 ms up to a configurable timeout.

use crate::disk::{open_options, DiskDirectory};
use crate::entry::{DirectoryInfo, FileAccess, FileInfo, FileMode, FileShare};
use crate::error::ArchiveError;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest full path produced by the file-name helpers, in characters.
pub const MAX_PATH_LENGTH: usize = 259;

/// How long mutating operations wait for their effect by default.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

const INVALID_FILE_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Operations on the physical file system.
pub trait FileSystem {
    fn open_file(
        &self,
        path: &Path,
        mode: FileMode,
        access: FileAccess,
        share: FileShare,
    ) -> io::Result<File>;

    fn file_exists(&self, path: &Path) -> bool;

    fn directory_exists(&self, path: &Path) -> bool;

    /// Creates `path` and any missing parents.
    fn create_directory(&self, path: &Path) -> io::Result<DiskDirectory>;

    fn delete_directory(&self, path: &Path, recursive: bool) -> io::Result<()>;

    /// Deletes a file and returns once it is gone.
    fn delete_file(&self, path: &Path) -> io::Result<()>;

    /// Moves a file, replacing `destination`, and returns once the source is
    /// gone and the destination exists.
    fn move_file(&self, source: &Path, destination: &Path) -> io::Result<()>;

    /// Copies a file and returns once the destination exists.
    fn copy_file(&self, source: &Path, destination: &Path, overwrite: bool) -> io::Result<()>;

    fn last_write_time(&self, path: &Path) -> io::Result<DateTime<Utc>>;

    /// Every file below `path`: the files of a directory come before those
    /// of its subdirectories. A missing directory yields no files.
    fn files_of_directory(&self, path: &Path) -> io::Result<Vec<Rc<dyn FileInfo>>>;

    /// Joins a sanitized `proposed` name onto `directory`.
    ///
    /// Characters not allowed in file names are removed and the stem is
    /// shortened so the result stays within [`MAX_PATH_LENGTH`].
    fn make_valid_file_name(
        &self,
        directory: &Path,
        proposed: &str,
    ) -> Result<PathBuf, ArchiveError> {
        ValidName::new(directory, proposed)?.with_index(0)
    }

    /// Like [`make_valid_file_name`](Self::make_valid_file_name), appending
    /// ` (1)`, ` (2)`, ... until no file exists at the result.
    fn make_unique_and_valid_file_name(
        &self,
        directory: &Path,
        proposed: &str,
    ) -> Result<PathBuf, ArchiveError> {
        let name = ValidName::new(directory, proposed)?;
        let mut index = 0;
        loop {
            let candidate = name.with_index(index)?;
            if !self.file_exists(&candidate) {
                return Ok(candidate);
            }
            index += 1;
        }
    }
}

/// The operating system's file system.
#[derive(Debug, Clone)]
pub struct OsFileSystem {
    poll_timeout: Duration,
}

impl Default for OsFileSystem {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl OsFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_timeout(poll_timeout: Duration) -> Self {
        Self { poll_timeout }
    }

    fn wait_until(&self, what: &str, path: &Path, condition: impl Fn() -> bool) -> io::Result<()> {
        let start = Instant::now();
        while !condition() {
            if start.elapsed() >= self.poll_timeout {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "{} of '{}' not visible after {:?}",
                        what,
                        path.display(),
                        self.poll_timeout
                    ),
                ));
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}

impl FileSystem for OsFileSystem {
    fn open_file(
        &self,
        path: &Path,
        mode: FileMode,
        access: FileAccess,
        share: FileShare,
    ) -> io::Result<File> {
        open_options(mode, access, share).open(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_directory(&self, path: &Path) -> io::Result<DiskDirectory> {
        fs::create_dir_all(path)?;
        Ok(DiskDirectory::new(path))
    }

    fn delete_directory(&self, path: &Path, recursive: bool) -> io::Result<()> {
        if recursive {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_dir(path)?;
        }
        self.wait_until("Deletion", path, || !path.exists())
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)?;
        self.wait_until("Deletion", path, || !path.exists())
    }

    fn move_file(&self, source: &Path, destination: &Path) -> io::Result<()> {
        if let Err(rename_error) = fs::rename(source, destination) {
            // Rename cannot cross file systems
            debug!(
                source = %source.display(),
                error = %rename_error,
                "Rename failed, copying instead"
            );
            fs::copy(source, destination).map_err(|_| rename_error)?;
            fs::remove_file(source)?;
        }
        self.wait_until("Move", destination, || {
            !source.exists() && destination.is_file()
        })
    }

    fn copy_file(&self, source: &Path, destination: &Path, overwrite: bool) -> io::Result<()> {
        if !overwrite && destination.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("'{}' already exists", destination.display()),
            ));
        }
        fs::copy(source, destination)?;
        self.wait_until("Copy", destination, || destination.is_file())
    }

    fn last_write_time(&self, path: &Path) -> io::Result<DateTime<Utc>> {
        Ok(DateTime::<Utc>::from(fs::metadata(path)?.modified()?))
    }

    fn files_of_directory(&self, path: &Path) -> io::Result<Vec<Rc<dyn FileInfo>>> {
        if !path.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut pending: Vec<Rc<dyn DirectoryInfo>> = vec![Rc::new(DiskDirectory::new(path))];
        while let Some(directory) = pending.pop() {
            files.extend(directory.files()?);
            pending.extend(directory.directories()?.into_iter().rev());
        }
        Ok(files)
    }
}

/// A sanitized name split into stem and extension, ready to be numbered.
struct ValidName {
    directory: PathBuf,
    stem: String,
    extension: String,
    room: usize,
}

impl ValidName {
    fn new(directory: &Path, proposed: &str) -> Result<Self, ArchiveError> {
        if proposed.is_empty() {
            return Err(ArchiveError::InvalidPath(
                "proposed file name must not be empty".to_string(),
            ));
        }
        let directory = std::path::absolute(directory)?;

        let (stem, extension) = match proposed.rfind('.') {
            Some(dot) => proposed.split_at(dot),
            None => (proposed, ""),
        };
        let stem: String = stem
            .chars()
            .filter(|c| !c.is_control() && !INVALID_FILE_NAME_CHARS.contains(c))
            .collect();
        let extension: String = extension
            .chars()
            .filter(|c| !c.is_control() && !INVALID_FILE_NAME_CHARS.contains(c))
            .collect();

        // Directory, one separator, then the name
        let used = directory.to_string_lossy().chars().count() + 1 + extension.chars().count();
        let room = MAX_PATH_LENGTH.saturating_sub(used);
        if room == 0 || (stem.is_empty() && extension.is_empty()) {
            return Err(ArchiveError::InvalidPath(format!(
                "no valid file name for '{}' fits below '{}'",
                proposed,
                directory.display()
            )));
        }

        Ok(Self {
            directory,
            stem,
            extension,
            room,
        })
    }

    /// Fails when the numbering suffix leaves no room for the stem.
    fn with_index(&self, index: usize) -> Result<PathBuf, ArchiveError> {
        let suffix = if index == 0 {
            String::new()
        } else {
            format!(" ({})", index)
        };
        let keep = self.room.saturating_sub(suffix.chars().count());
        if keep == 0 && !self.stem.is_empty() {
            return Err(ArchiveError::InvalidPath(format!(
                "no room for the name '{}{}' with suffix '{}' below '{}'",
                self.stem,
                self.extension,
                suffix,
                self.directory.display()
            )));
        }
        let stem: String = self.stem.chars().take(keep).collect();
        Ok(self
            .directory
            .join(format!("{}{}{}", stem, suffix, self.extension)))
    }
}
