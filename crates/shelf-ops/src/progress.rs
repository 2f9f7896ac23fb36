//! Progress payloads for file operations.

use std::path::PathBuf;

use serde::Serialize;

/// Byte-level progress of a copy or cross-device move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferProgress {
    /// Destination file currently being written.
    pub path: PathBuf,
    /// Work units completed before this file.
    pub completed: usize,
    /// Total work units of the operation.
    pub total: usize,
    /// Bytes of the current file written and synced.
    pub bytes_copied: u64,
    /// Size of the current file.
    pub bytes_total: u64,
}

impl TransferProgress {
    /// Overall progress as a fraction (0.0 to 1.0).
    pub fn fraction(&self) -> f64 {
        shelf_core::fraction(self.completed, self.total)
    }

    /// Progress of the current file as a percentage (0.0 to 100.0).
    pub fn file_percentage(&self) -> f64 {
        if self.bytes_total > 0 {
            (self.bytes_copied as f64 / self.bytes_total as f64) * 100.0
        } else {
            100.0
        }
    }
}

/// Update emitted by copy and move operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransferUpdate {
    /// A synced block of the current file.
    Progress(TransferProgress),
    /// A top-level entry reached its destination.
    Placed {
        path: PathBuf,
        /// Whether an existing entry was replaced, so no new row is needed.
        overwritten: bool,
        completed: usize,
        total: usize,
    },
}

impl TransferUpdate {
    /// Overall progress as a fraction (0.0 to 1.0).
    pub fn fraction(&self) -> f64 {
        match self {
            Self::Progress(progress) => progress.fraction(),
            Self::Placed {
                completed, total, ..
            } => shelf_core::fraction(*completed, *total),
        }
    }
}

/// Update emitted by operations that remove one entry per step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalUpdate<R> {
    /// The entry just handled.
    pub path: PathBuf,
    /// The caller's row, present only for originally selected entries.
    pub row: Option<R>,
    pub completed: usize,
    pub total: usize,
}

impl<R> RemovalUpdate<R> {
    /// Overall progress as a fraction (0.0 to 1.0).
    pub fn fraction(&self) -> f64 {
        shelf_core::fraction(self.completed, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_fractions() {
        let progress = TransferProgress {
            path: PathBuf::from("/d/a"),
            completed: 1,
            total: 4,
            bytes_copied: 512,
            bytes_total: 1024,
        };
        assert_eq!(progress.fraction(), 0.25);
        assert_eq!(progress.file_percentage(), 50.0);

        let placed = TransferUpdate::Placed {
            path: PathBuf::from("/d/a"),
            overwritten: false,
            completed: 4,
            total: 4,
        };
        assert_eq!(placed.fraction(), 1.0);
    }

    #[test]
    fn test_empty_file_is_complete() {
        let progress = TransferProgress {
            path: PathBuf::from("/d/empty"),
            completed: 0,
            total: 1,
            bytes_copied: 0,
            bytes_total: 0,
        };
        assert_eq!(progress.file_percentage(), 100.0);
    }
}
