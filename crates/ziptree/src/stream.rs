//! Chunked stream copy with progress reporting and length checks, and
//! temporary files that clean up after themselves.

use crate::entry::{FileAccess, FileMode, FileShare};
use crate::fs::{FileSystem, OsFileSystem};
use crate::types::{CopyControl, CopyOutcome};
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Chunk size used when none is configured.
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 4 * 1024;

/// A readable stream that may know its own length.
///
/// Seekable sources report their length so that a copy can detect a stream
/// yielding more, or fewer, bytes than it declared.
pub trait ByteSource: Read {
    /// Declared length of the stream, `None` when it cannot be determined.
    fn declared_len(&mut self) -> Option<u64>;

    /// Write side of the stream, for sources opened with write access.
    fn as_writer(&mut self) -> Option<&mut dyn Write> {
        None
    }
}

impl ByteSource for File {
    fn declared_len(&mut self) -> Option<u64> {
        self.metadata().ok().map(|metadata| metadata.len())
    }

    fn as_writer(&mut self) -> Option<&mut dyn Write> {
        Some(self)
    }
}

impl<T: AsRef<[u8]>> ByteSource for Cursor<T> {
    fn declared_len(&mut self) -> Option<u64> {
        Some(self.get_ref().as_ref().len() as u64)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn declared_len(&mut self) -> Option<u64> {
        (**self).declared_len()
    }

    fn as_writer(&mut self) -> Option<&mut dyn Write> {
        (**self).as_writer()
    }
}

/// Wraps a reader whose length is unknown.
#[derive(Debug)]
pub struct NonSeekable<R>(pub R);

impl<R: Read> Read for NonSeekable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> ByteSource for NonSeekable<R> {
    fn declared_len(&mut self) -> Option<u64> {
        None
    }
}

/// A read-only file that is deleted once the reader is dropped.
///
/// [`persist`](Self::persist) moves the file to its final place instead.
#[derive(Debug)]
pub struct TemporaryFile<F: FileSystem = OsFileSystem> {
    file: Option<File>,
    path: PathBuf,
    file_system: F,
    delete_on_drop: bool,
}

impl<F: FileSystem> TemporaryFile<F> {
    /// Takes over an opened `file` living at `path`.
    pub fn new(file: File, path: impl Into<PathBuf>, file_system: F) -> Self {
        Self {
            file: Some(file),
            path: path.into(),
            file_system,
            delete_on_drop: true,
        }
    }

    /// Opens the file at `path` for reading.
    pub fn open(path: impl Into<PathBuf>, file_system: F) -> io::Result<Self> {
        let path = path.into();
        let file = file_system.open_file(
            &path,
            FileMode::Open,
            FileAccess::Read,
            FileShare::READ | FileShare::DELETE,
        )?;
        Ok(Self::new(file, path, file_system))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the file and moves it to `destination`; it is no longer
    /// deleted. On failure the file is deleted as usual.
    pub fn persist(mut self, destination: impl AsRef<Path>) -> io::Result<()> {
        drop(self.file.take());
        self.file_system.move_file(&self.path, destination.as_ref())?;
        self.delete_on_drop = false;
        Ok(())
    }
}

impl<F: FileSystem> Read for TemporaryFile<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.read(buf),
            None => Ok(0),
        }
    }
}

impl<F: FileSystem> ByteSource for TemporaryFile<F> {
    fn declared_len(&mut self) -> Option<u64> {
        self.file.as_mut().and_then(|file| file.declared_len())
    }
}

impl<F: FileSystem> Drop for TemporaryFile<F> {
    fn drop(&mut self) {
        if !self.delete_on_drop {
            return;
        }
        // Closed first; open files cannot be deleted everywhere
        drop(self.file.take());
        match self.file_system.delete_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Deleted temporary file"),
            Err(error) => warn!(
                path = %self.path.display(),
                error = %error,
                "Could not delete temporary file"
            ),
        }
    }
}

/// Copies streams in fixed-size chunks, reporting progress after each one.
#[derive(Debug, Clone)]
pub struct StreamCopier {
    buffer_size: usize,
}

impl Default for StreamCopier {
    fn default() -> Self {
        Self::new(DEFAULT_COPY_BUFFER_SIZE)
    }
}

impl StreamCopier {
    /// A zero buffer size is raised to one byte.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Copies `source` into `destination`.
    ///
    /// After every non-empty chunk is written, `on_progress` receives the
    /// number of bytes transferred so far and may cancel the copy.
    ///
    /// # Returns
    ///
    /// - `Completed` when the source was drained and matched its declared length
    /// - `Cancelled` when `on_progress` asked to stop; the destination holds a prefix
    /// - `Truncated` when a source with a declared length ended early
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if more than `max_length` bytes arrive, or if
    /// the source yields more bytes than its declared length. Read and write
    /// failures are passed through.
    pub fn copy<R, W>(
        &self,
        source: &mut R,
        destination: &mut W,
        max_length: Option<u64>,
        on_progress: &mut dyn FnMut(u64) -> CopyControl,
    ) -> io::Result<CopyOutcome>
    where
        R: ByteSource + ?Sized,
        W: Write + ?Sized,
    {
        let mut buffer = vec![0u8; self.buffer_size];
        let mut transferred: u64 = 0;

        loop {
            let read = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            destination.write_all(&buffer[..read])?;
            transferred += read as u64;

            if let Some(max) = max_length {
                if transferred > max {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "The stream returned more data ({} bytes) than the specified maximum ({} bytes).",
                            transferred, max
                        ),
                    ));
                }
            }

            if on_progress(transferred) == CopyControl::Cancel {
                return Ok(CopyOutcome::Cancelled);
            }
        }

        match source.declared_len() {
            Some(declared) if transferred > declared => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "The stream returned more data than the stream length ({} bytes) specified.",
                    declared
                ),
            )),
            Some(declared) if transferred < declared => Ok(CopyOutcome::Truncated {
                copied: transferred,
                declared,
            }),
            _ => Ok(CopyOutcome::Completed),
        }
    }
}
