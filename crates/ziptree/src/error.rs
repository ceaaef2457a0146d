//! Error types for archive building and browsing.

use std::fmt;
use std::io;
use thiserror::Error;

/// Main error type for archive operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// An I/O error outside of the per-file recovery protocol.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The ZIP codec rejected the archive or an entry.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A file could not be opened and no error handler was registered.
    #[error("Cannot open '{path}': {source}")]
    FileOpen {
        /// Full name of the file that failed to open
        path: String,
        /// The underlying open failure
        #[source]
        source: io::Error,
    },

    /// The children of a directory could not be enumerated.
    #[error("Cannot read directory '{path}': {source}")]
    DirectoryRead {
        /// Full name of the directory
        path: String,
        #[source]
        source: io::Error,
    },

    /// A path was empty or could not be split into segments.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The build was aborted by the caller or by a mid-copy failure.
    #[error(transparent)]
    Aborted(#[from] AbortError),

    /// The archive was closed before the operation could run.
    #[error("Archive has been closed")]
    Closed,
}

impl ArchiveError {
    /// Returns the abort signal if this error terminated a build.
    pub fn as_abort(&self) -> Option<&AbortError> {
        match self {
            ArchiveError::Aborted(abort) => Some(abort),
            _ => None,
        }
    }
}

/// Why a build was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortKind {
    /// The progress handler asked to cancel.
    Cancelled,
    /// The error handler chose [`RecoveryAction::Abort`](crate::RecoveryAction::Abort).
    RecoveryAbort,
    /// Reading an already opened file failed partway through.
    CopyFailed,
}

/// Abort signal raised out of [`ArchiveBuilder::build`](crate::ArchiveBuilder::build).
///
/// A cancellation carries no cause. A mid-copy failure names the offending
/// file and keeps the I/O error in its source chain, so callers tell the two
/// apart with [`AbortError::cause`] rather than by message text.
#[derive(Debug)]
pub struct AbortError {
    kind: AbortKind,
    path: Option<String>,
    cause: Option<io::Error>,
}

impl AbortError {
    pub(crate) fn cancelled(path: &str) -> Self {
        Self {
            kind: AbortKind::Cancelled,
            path: Some(path.to_string()),
            cause: None,
        }
    }

    pub(crate) fn recovery_abort(path: &str) -> Self {
        Self {
            kind: AbortKind::RecoveryAbort,
            path: Some(path.to_string()),
            cause: None,
        }
    }

    pub(crate) fn copy_failed(path: &str, cause: io::Error) -> Self {
        Self {
            kind: AbortKind::CopyFailed,
            path: Some(path.to_string()),
            cause: Some(cause),
        }
    }

    pub fn kind(&self) -> AbortKind {
        self.kind
    }

    /// The file being processed when the build stopped.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The I/O failure behind the abort, absent for cancellations.
    pub fn cause(&self) -> Option<&io::Error> {
        self.cause.as_ref()
    }

    pub fn is_cancellation(&self) -> bool {
        self.cause.is_none()
    }
}

impl fmt::Display for AbortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.kind {
            AbortKind::Cancelled => "Archive build cancelled",
            AbortKind::RecoveryAbort => "Archive build aborted",
            AbortKind::CopyFailed => "Archive build failed while copying",
        };
        match &self.path {
            Some(path) => write!(f, "{} at '{}'", reason, path),
            None => f.write_str(reason),
        }
    }
}

impl std::error::Error for AbortError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
