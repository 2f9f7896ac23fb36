//! Freedesktop-compatible trash for shelf.
//!
//! A home trash plus one `.Trash-<uid>` directory per writable mounted
//! volume. Entries keep their content under `files/` and a `.trashinfo`
//! metadata file under `info/`.

mod backend;
mod dir;
mod error;
mod index;
mod info;
mod trash;
mod volume;

use std::ffi::OsStr;

pub use backend::TrashBackend;
pub use dir::{home_trash_path, TrashDir, TrashKind};
pub use error::{Result, TrashError};
pub use index::TrashIndex;
pub use info::{TrashInfo, DELETION_DATE_FORMAT, INFO_EXTENSION, INFO_SECTION};
pub use trash::{Trash, TrashEntry};
pub use volume::{is_writable, parse_mount_table, ProcMounts, StaticVolumes, Volume, VolumeMonitor};

/// Location string naming the virtual trash view.
pub const TRASH_URI: &str = "trash:///";

/// Whether `location` names the virtual trash view rather than a directory.
pub fn is_trash_root(location: impl AsRef<OsStr>) -> bool {
    let location = location.as_ref();
    location == TRASH_URI || location == "Trash"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_trash_root() {
        assert!(is_trash_root("trash:///"));
        assert!(is_trash_root("Trash"));
        assert!(!is_trash_root("/home/me/Trash"));
        assert!(!is_trash_root(""));
    }
}
