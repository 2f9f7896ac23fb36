//! Error types for trash operations.

use std::io;
use std::path::{Path, PathBuf};

use shelf_core::OpError;
use thiserror::Error;

/// Errors that can occur while sending, restoring or purging trash entries.
#[derive(Debug, Error)]
pub enum TrashError {
    /// No trash directory serves the volume holding the path.
    #[error("No trash available for {path}")]
    NoTrash { path: PathBuf },

    /// The path has no matching info file in any known trash.
    #[error("Not in the trash: {path}")]
    NotTrashed { path: PathBuf },

    /// The path already lives inside a trash directory.
    #[error("Already in the trash: {path}")]
    InsideTrash { path: PathBuf },

    /// Restoring would replace an entry at the original location.
    #[error("Cannot restore, something already exists at {path}")]
    Occupied { path: PathBuf },

    /// An info file exists but cannot be understood.
    #[error("Invalid trash info file {path}: {reason}")]
    InvalidInfo { path: PathBuf, reason: String },

    /// The host-side trash command failed.
    #[error("Host trash failed for {path}: {message}")]
    Proxy { path: PathBuf, message: String },

    /// The home trash location could not be resolved.
    #[error("Cannot determine the home trash directory")]
    NoHome,

    /// A filesystem failure.
    #[error(transparent)]
    Op(#[from] OpError),
}

impl TrashError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Op(OpError::io(path, source))
    }

    /// The offending path, if the error has one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NoTrash { path }
            | Self::NotTrashed { path }
            | Self::InsideTrash { path }
            | Self::Occupied { path }
            | Self::InvalidInfo { path, .. }
            | Self::Proxy { path, .. } => Some(path),
            Self::NoHome => None,
            Self::Op(err) => err.path(),
        }
    }
}

impl From<TrashError> for OpError {
    fn from(err: TrashError) -> Self {
        match err {
            TrashError::Op(err) => err,
            other => OpError::Trash {
                path: other.path().map(Path::to_path_buf).unwrap_or_default(),
                message: other.to_string(),
            },
        }
    }
}

/// Result alias for trash operations.
pub type Result<T, E = TrashError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_errors_become_trash_op_errors() {
        let err: OpError = TrashError::NotTrashed {
            path: PathBuf::from("/t/files/a"),
        }
        .into();
        assert!(matches!(err, OpError::Trash { .. }));
        assert_eq!(err.path(), Some(Path::new("/t/files/a")));
        assert!(err.to_string().contains("Not in the trash"));
    }

    #[test]
    fn test_io_errors_pass_through() {
        let err: OpError = TrashError::io(
            "/denied",
            io::Error::new(io::ErrorKind::PermissionDenied, "no"),
        )
        .into();
        assert!(matches!(err, OpError::PermissionDenied { .. }));
    }
}
