//! Error types for file operations.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that abort a file operation.
///
/// Every variant except [`OpError::Cancelled`] carries the path that
/// caused the failure so the caller can report it.
#[derive(Debug, Error)]
pub enum OpError {
    /// The operation observed its cancellation flag.
    #[error("Operation cancelled")]
    Cancelled,

    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A directory was asked to be copied or moved inside itself.
    #[error("Cannot copy or move a directory into itself: {path}")]
    IntoItself { path: PathBuf },

    /// No free name could be generated in a directory.
    #[error("No free name left for {path}")]
    NameExhausted { path: PathBuf },

    /// A worker thread panicked before reporting an outcome.
    #[error("Worker panicked: {message}")]
    Panicked { path: PathBuf, message: String },

    /// A trash-level failure (missing info file, unknown trash, ...).
    #[error("{message}")]
    Trash { path: PathBuf, message: String },
}

impl OpError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// The offending path, if the error has one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Cancelled => None,
            Self::PermissionDenied { path }
            | Self::NotFound { path }
            | Self::Io { path, .. }
            | Self::IntoItself { path }
            | Self::NameExhausted { path }
            | Self::Panicked { path, .. }
            | Self::Trash { path, .. } => Some(path),
        }
    }

    /// Whether this is the cooperative cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result alias used across the engine.
pub type Result<T, E = OpError> = std::result::Result<T, E>;

/// Extension for attaching a path to raw `io::Result`s.
pub trait IoResultExt<T> {
    /// Map the error into an [`OpError`] blamed on `path`.
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|e| OpError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_error_io_classifies_kind() {
        let err = OpError::io(
            "/test/path",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, OpError::PermissionDenied { .. }));

        let err = OpError::io("/test/path", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, OpError::NotFound { .. }));

        let err = OpError::io("/test/path", io::Error::other("disk full"));
        assert!(matches!(err, OpError::Io { .. }));
    }

    #[test]
    fn test_every_failure_carries_a_path() {
        assert!(OpError::Cancelled.path().is_none());
        let err = OpError::IntoItself {
            path: PathBuf::from("/a"),
        };
        assert_eq!(err.path(), Some(Path::new("/a")));
    }

    #[test]
    fn test_at_attaches_path() {
        let res: io::Result<()> = Err(io::Error::new(io::ErrorKind::NotFound, "x"));
        let err = res.at(Path::new("/missing")).unwrap_err();
        assert_eq!(err.path(), Some(Path::new("/missing")));
    }
}
