//! Selections submitted to engine operations.

use std::path::{Path, PathBuf};

/// One selected source path and the caller's opaque row reference.
///
/// The engine never looks inside `row`; it only hands it back in events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionEntry<R> {
    pub path: PathBuf,
    pub row: R,
}

impl<R> SelectionEntry<R> {
    /// Create a selection entry.
    pub fn new(path: impl Into<PathBuf>, row: R) -> Self {
        Self {
            path: path.into(),
            row,
        }
    }
}

/// An ordered list of selected entries.
pub type Selection<R> = Vec<SelectionEntry<R>>;

/// Build a selection with no row references, for callers without a view.
pub fn selection_from_paths<I, P>(paths: I) -> Selection<()>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    paths
        .into_iter()
        .map(|path| SelectionEntry::new(path, ()))
        .collect()
}

/// Base name of a selected path, falling back to the whole path for roots.
pub fn entry_name(path: &Path) -> &std::ffi::OsStr {
    path.file_name().unwrap_or(path.as_os_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_from_paths_keeps_order() {
        let selection = selection_from_paths(["/b", "/a"]);
        assert_eq!(selection[0].path, PathBuf::from("/b"));
        assert_eq!(selection[1].path, PathBuf::from("/a"));
    }

    #[test]
    fn test_entry_name() {
        assert_eq!(entry_name(Path::new("/home/u/doc.txt")), "doc.txt");
        assert_eq!(entry_name(Path::new("/")), "/");
    }
}
