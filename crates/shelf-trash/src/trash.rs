//! The multi-volume trash: discovery, send, list, restore and purge.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard};

use chrono::NaiveDateTime;
use serde::Serialize;
use shelf_core::paths::{self, NameStyle};
use shelf_core::transfer::{remove_path, Transfer};
use shelf_core::{entry_name, CancellationToken, EngineConfig, IoResultExt, OpError};
use tracing::{debug, info};

use crate::backend::{host_trash, TrashBackend};
use crate::dir::{home_trash_path, TrashDir};
use crate::error::{Result, TrashError};
use crate::index::TrashIndex;
use crate::info::TrashInfo;
use crate::volume::{is_writable, VolumeMonitor};

/// Attempts at claiming a name before giving up on a racing writer.
const CLAIM_ATTEMPTS: usize = 8;

/// A listed trash entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrashEntry {
    /// Content location under `files/`.
    pub path: PathBuf,
    /// Matching info file location.
    pub info_path: PathBuf,
    /// Absolute original location, when the info file is readable.
    pub original: Option<PathBuf>,
    /// When the entry was trashed, when the info file is readable.
    pub deletion_date: Option<NaiveDateTime>,
}

impl TrashEntry {
    /// The name to show for this entry: the original file name when known.
    pub fn display_name(&self) -> String {
        self.original
            .as_deref()
            .and_then(Path::file_name)
            .or_else(|| self.path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// The set of trash directories available to the current user.
pub struct Trash {
    home: TrashDir,
    uid: u32,
    backend: TrashBackend,
    min_block_size: usize,
    monitor: Box<dyn VolumeMonitor>,
    index: RwLock<TrashIndex>,
}

impl Trash {
    /// A trash with its home root at `home_root`, using the direct backend
    /// and the effective user id.
    pub fn new(home_root: impl Into<PathBuf>, monitor: Box<dyn VolumeMonitor>) -> Self {
        let trash = Self {
            home: TrashDir::home(home_root),
            uid: current_uid(),
            backend: TrashBackend::Direct,
            min_block_size: shelf_core::DEFAULT_MIN_BLOCK_SIZE,
            monitor,
            index: RwLock::new(TrashIndex::default()),
        };
        trash.rebuild();
        trash
    }

    /// A trash configured from `config`.
    pub fn from_config(config: &EngineConfig, monitor: Box<dyn VolumeMonitor>) -> Result<Self> {
        let mut trash = Self::new(home_trash_path(config)?, monitor);
        trash.backend = TrashBackend::for_sandbox(config.sandboxed);
        trash.min_block_size = config.min_block_size.max(1);
        Ok(trash)
    }

    /// Use `uid` for device trash roots.
    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self.rebuild();
        self
    }

    /// Use a different send backend.
    pub fn with_backend(mut self, backend: TrashBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn backend(&self) -> TrashBackend {
        self.backend
    }

    /// The home trash directory.
    pub fn home(&self) -> &TrashDir {
        &self.home
    }

    /// Re-read the mounted volumes. Call on volume attach or detach.
    pub fn rebuild(&self) {
        let index = TrashIndex::build(&self.home, self.monitor.as_ref(), self.uid);
        info!(roots = index.len(), "trash index rebuilt");
        *self.index.write().unwrap_or_else(|e| e.into_inner()) = index;
    }

    fn index(&self) -> RwLockReadGuard<'_, TrashIndex> {
        self.index.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Every known trash root.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.index().roots()
    }

    /// Whether `path` is inside any known trash root.
    pub fn in_trash(&self, path: &Path) -> bool {
        self.index().containing(path).is_some()
    }

    /// Whether a trash serves the volume holding `dir`.
    pub fn has_trash(&self, dir: &Path) -> bool {
        self.monitor
            .mount_point_of(dir)
            .is_ok_and(|mount| self.index().get(&mount).is_some())
    }

    /// The trash directory that would receive `path`.
    pub fn trash_for(&self, path: &Path) -> Result<TrashDir> {
        let mount = self.monitor.mount_point_of(path).at(path)?;
        self.index()
            .get(&mount)
            .cloned()
            .ok_or_else(|| TrashError::NoTrash {
                path: path.to_path_buf(),
            })
    }

    /// Send `path` using the configured backend.
    ///
    /// Returns the content location for the direct backend. The host proxy
    /// does not report where the entry went.
    pub fn put(&self, path: &Path) -> Result<Option<PathBuf>> {
        match self.backend {
            TrashBackend::Direct => self.send(path).map(Some),
            TrashBackend::HostProxy => host_trash(&paths::absolute(path)?).map(|()| None),
        }
    }

    /// Move `path` into the trash of its volume and return the content
    /// location.
    ///
    /// The info file is written and synced before the content moves; if the
    /// move fails the info file is removed again.
    pub fn send(&self, path: &Path) -> Result<PathBuf> {
        let path = paths::absolute(path)?;
        if !paths::lexists(&path) {
            return Err(OpError::NotFound { path }.into());
        }
        if self.in_trash(&path) {
            return Err(TrashError::InsideTrash { path });
        }
        if self.index().dirs().any(|dir| dir.root().starts_with(&path)) {
            return Err(OpError::IntoItself { path }.into());
        }
        let Some(parent) = path.parent() else {
            return Err(TrashError::NoTrash { path });
        };
        if !is_writable(parent) {
            return Err(OpError::PermissionDenied { path }.into());
        }

        let trash = self.trash_for(&path)?;
        trash.ensure_layout()?;

        let info = TrashInfo::now(trash.encode_original(&path));
        let name = self.claim_name(&trash, &path, &info)?;
        let info_path = trash.info_path(&name);
        let dest = trash.content_path(&name);

        let cancel = CancellationToken::new();
        if let Err(err) = Transfer::new(self.min_block_size, &cancel).relocate(&path, &dest) {
            let _ = fs::remove_file(&info_path);
            return Err(err.into());
        }

        debug!(path = %path.display(), dest = %dest.display(), "trashed");
        Ok(dest)
    }

    /// Pick a free name and commit its info file.
    fn claim_name(&self, trash: &TrashDir, path: &Path, info: &TrashInfo) -> Result<OsString> {
        let base = entry_name(path);
        for _ in 0..CLAIM_ATTEMPTS {
            let name = paths::unique_name_by(base, NameStyle::Trash, |c| !trash.is_free(c))?;
            let info_path = trash.info_path(&name);
            match info.write_new(&info_path) {
                Ok(()) => return Ok(name),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(TrashError::io(info_path, e)),
            }
        }
        Err(OpError::NameExhausted {
            path: trash.content_path(base),
        }
        .into())
    }

    /// Content paths of every trashed entry across every trash root.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let dirs: Vec<TrashDir> = self.index().dirs().cloned().collect();
        let mut items = Vec::new();
        for dir in dirs {
            items.extend(dir.entries()?);
        }
        Ok(items)
    }

    /// Every trashed entry with its parsed metadata.
    pub fn entries(&self) -> Result<Vec<TrashEntry>> {
        self.list()?
            .into_iter()
            .map(|content| self.describe(&content))
            .collect()
    }

    /// Metadata for one content path. Unreadable info files leave the
    /// metadata empty.
    pub fn describe(&self, content: &Path) -> Result<TrashEntry> {
        let (trash, name) = self.locate(content)?;
        let info_path = trash.info_path(&name);
        let info = match TrashInfo::read(&info_path) {
            Ok(info) => Some(info),
            Err(err) => {
                debug!(path = %info_path.display(), error = %err, "unreadable info file");
                None
            }
        };
        Ok(TrashEntry {
            path: content.to_path_buf(),
            info_path,
            original: info.as_ref().map(|i| trash.decode_original(&i.path)),
            deletion_date: info.map(|i| i.deletion_date),
        })
    }

    /// Find the trash root and entry name of a content path.
    fn locate(&self, content: &Path) -> Result<(TrashDir, OsString)> {
        let index = self.index();
        let trash = index
            .containing(content)
            .ok_or_else(|| TrashError::NotTrashed {
                path: content.to_path_buf(),
            })?;
        let name = trash
            .entry_name(content)
            .ok_or_else(|| TrashError::NotTrashed {
                path: content.to_path_buf(),
            })?
            .to_os_string();
        Ok((trash.clone(), name))
    }

    /// Read the info file of a content path.
    fn info_of(&self, content: &Path) -> Result<(TrashDir, PathBuf, TrashInfo)> {
        let (trash, name) = self.locate(content)?;
        let info_path = trash.info_path(&name);
        if !paths::lexists(&info_path) {
            return Err(TrashError::NotTrashed {
                path: content.to_path_buf(),
            });
        }
        let info = TrashInfo::read(&info_path)?;
        Ok((trash, info_path, info))
    }

    /// Absolute original location of a content path.
    pub fn original_path(&self, content: &Path) -> Result<PathBuf> {
        let (trash, _, info) = self.info_of(content)?;
        Ok(trash.decode_original(&info.path))
    }

    /// Move a content path back to its original location and return it.
    ///
    /// Missing ancestors are recreated. An entry already at the original
    /// location is left alone and the restore fails with
    /// [`TrashError::Occupied`], keeping the trashed copy. The info file is
    /// removed last.
    pub fn restore(&self, content: &Path) -> Result<PathBuf> {
        let (trash, info_path, info) = self.info_of(content)?;
        if !paths::lexists(content) {
            return Err(TrashError::NotTrashed {
                path: content.to_path_buf(),
            });
        }

        let dest = trash.decode_original(&info.path);
        if paths::lexists(&dest) {
            return Err(TrashError::Occupied { path: dest });
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }

        let cancel = CancellationToken::new();
        Transfer::new(self.min_block_size, &cancel).relocate(content, &dest)?;
        fs::remove_file(&info_path).at(&info_path)?;

        debug!(path = %dest.display(), "restored");
        Ok(dest)
    }

    /// Permanently remove a content path and its info file.
    pub fn purge(&self, content: &Path) -> Result<()> {
        let (trash, name) = self.locate(content)?;
        let info_path = trash.info_path(&name);
        if !paths::lexists(&info_path) {
            return Err(TrashError::NotTrashed {
                path: content.to_path_buf(),
            });
        }

        if paths::lexists(content) {
            remove_path(content)?;
        }
        fs::remove_file(&info_path).at(&info_path)?;

        debug!(path = %content.display(), "purged");
        Ok(())
    }
}

#[cfg(unix)]
fn current_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

#[cfg(not(unix))]
fn current_uid() -> u32 {
    0
}
