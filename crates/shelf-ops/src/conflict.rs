//! Overwrite pre-flight for copy and move.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shelf_core::entry_name;
use shelf_core::paths::{canonical, canonical_entry, is_real_dir, lexists, same_entry};

/// An existing destination a paste would replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The source path being pasted.
    pub source: PathBuf,
    /// The destination path where the conflict exists.
    pub destination: PathBuf,
    /// The kind of conflict.
    pub kind: ConflictKind,
}

impl Conflict {
    /// Create a new conflict.
    pub fn new(source: PathBuf, destination: PathBuf, kind: ConflictKind) -> Self {
        Self {
            source,
            destination,
            kind,
        }
    }
}

/// The kind of conflict encountered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    /// A file (or link) already exists at the destination.
    FileExists,
    /// A directory already exists at the destination.
    DirectoryExists,
    /// A directory would be pasted inside itself.
    SourceIsAncestor,
}

impl ConflictKind {
    /// Whether confirming the paste resolves this conflict. Pasting a
    /// directory into itself always fails.
    pub fn is_overwrite(self) -> bool {
        matches!(self, Self::FileExists | Self::DirectoryExists)
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileExists => write!(f, "File already exists"),
            Self::DirectoryExists => write!(f, "Directory already exists"),
            Self::SourceIsAncestor => write!(f, "Cannot copy/move a directory into itself"),
        }
    }
}

/// Destinations a paste of `sources` into `destination` would replace.
///
/// A source already inside `destination` is pasted beside itself under a
/// fresh name, so it never conflicts. Paths are compared after resolving
/// symlinks and `..`, the same way the operations themselves do.
pub fn find_conflicts<'a, I>(sources: I, destination: &Path) -> Vec<Conflict>
where
    I: IntoIterator<Item = &'a Path>,
{
    let resolved = canonical(destination).unwrap_or_else(|_| destination.to_path_buf());
    let destination = resolved.as_path();
    let mut conflicts = Vec::new();
    for source in sources {
        let source = canonical_entry(source).unwrap_or_else(|_| source.to_path_buf());
        let source = source.as_path();
        let target = destination.join(entry_name(source));

        if is_real_dir(source) && destination.starts_with(source) {
            conflicts.push(Conflict::new(
                source.to_path_buf(),
                target,
                ConflictKind::SourceIsAncestor,
            ));
            continue;
        }
        if source.parent() == Some(destination)
            || same_entry(source, &target)
            || !lexists(&target)
        {
            continue;
        }

        let kind = if is_real_dir(&target) {
            ConflictKind::DirectoryExists
        } else {
            ConflictKind::FileExists
        };
        conflicts.push(Conflict::new(source.to_path_buf(), target, kind));
    }
    conflicts
}
