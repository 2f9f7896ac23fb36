//! Mapping from mount point to the trash directory serving it.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::debug;

use crate::dir::TrashDir;
use crate::volume::VolumeMonitor;

/// Ordered mount point -> trash directory map.
#[derive(Debug, Clone, Default)]
pub struct TrashIndex {
    dirs: IndexMap<PathBuf, TrashDir>,
}

impl TrashIndex {
    /// Build the index for `uid` from the monitor's current volumes.
    ///
    /// Every writable volume gets a `.Trash-<uid>` root, except for the
    /// superuser. The home trash is inserted last so it owns the mount
    /// point it lives on.
    pub fn build(home: &TrashDir, monitor: &dyn VolumeMonitor, uid: u32) -> Self {
        let mut dirs = IndexMap::new();

        if uid != 0 {
            for volume in monitor.volumes() {
                if !volume.writable {
                    debug!(mount = %volume.mount_point.display(), "skipping read-only volume");
                    continue;
                }
                let trash = TrashDir::device(&volume.mount_point, uid);
                dirs.insert(volume.mount_point, trash);
            }
        }

        match monitor.mount_point_of(home.root()) {
            Ok(mount) => {
                dirs.insert(mount, home.clone());
            }
            Err(e) => {
                debug!(root = %home.root().display(), error = %e, "home trash mount unknown");
            }
        }

        Self { dirs }
    }

    /// Trash serving the volume mounted at `mount`.
    pub fn get(&self, mount: &Path) -> Option<&TrashDir> {
        self.dirs.get(mount)
    }

    /// Innermost trash root containing `path`.
    pub fn containing(&self, path: &Path) -> Option<&TrashDir> {
        self.dirs
            .values()
            .filter(|dir| dir.contains(path))
            .max_by_key(|dir| dir.root().components().count())
    }

    /// Every known trash directory, in insertion order.
    pub fn dirs(&self) -> impl Iterator<Item = &TrashDir> {
        self.dirs.values()
    }

    /// Every known trash root path.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.dirs.values().map(|d| d.root().to_path_buf()).collect()
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}
