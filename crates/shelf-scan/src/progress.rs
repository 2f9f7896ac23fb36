//! Enumeration progress payloads.

use std::path::PathBuf;

use compact_str::CompactString;
use serde::Serialize;

/// One listed child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchEntry {
    /// Name to display.
    pub name: CompactString,
    /// Location to operate on.
    pub path: PathBuf,
    /// Whether the entry is a directory (symlinks are not followed).
    pub is_dir: bool,
}

/// A batch of children emitted by one enumeration step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchUpdate {
    /// The directory (or virtual location) being listed.
    pub directory: PathBuf,
    /// Entries found by this step.
    pub entries: Vec<BatchEntry>,
    /// Children examined so far, including filtered ones.
    pub completed: usize,
    /// Children in the listing.
    pub total: usize,
}

impl BatchUpdate {
    /// Fraction of the listing processed so far.
    pub fn fraction(&self) -> f64 {
        shelf_core::fraction(self.completed, self.total)
    }

    /// Whether this batch covers the end of the listing.
    pub fn is_last(&self) -> bool {
        self.completed >= self.total
    }
}
