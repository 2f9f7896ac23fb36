//! A single trash root and its `files/` + `info/` layout.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use shelf_core::paths::lexists;
use shelf_core::{EngineConfig, IoResultExt};

use crate::error::{Result, TrashError};
use crate::info::INFO_EXTENSION;

/// Which convention a trash root follows for recorded paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrashKind {
    /// The user's home trash; records absolute paths.
    Home,
    /// A per-volume trash; records paths relative to `mount`.
    Device { mount: PathBuf },
}

/// One trash root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashDir {
    root: PathBuf,
    kind: TrashKind,
}

impl TrashDir {
    /// The home trash rooted at `root`.
    pub fn home(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            kind: TrashKind::Home,
        }
    }

    /// The per-user trash of the volume mounted at `mount`.
    pub fn device(mount: impl Into<PathBuf>, uid: u32) -> Self {
        let mount = mount.into();
        Self {
            root: mount.join(format!(".Trash-{uid}")),
            kind: TrashKind::Device { mount },
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind(&self) -> &TrashKind {
        &self.kind
    }

    pub fn is_home(&self) -> bool {
        self.kind == TrashKind::Home
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    pub fn info_dir(&self) -> PathBuf {
        self.root.join("info")
    }

    /// Content location of the entry called `name`.
    pub fn content_path(&self, name: &OsStr) -> PathBuf {
        self.files_dir().join(name)
    }

    /// Info file location of the entry called `name`.
    pub fn info_path(&self, name: &OsStr) -> PathBuf {
        let mut file = name.to_os_string();
        file.push(".");
        file.push(INFO_EXTENSION);
        self.info_dir().join(file)
    }

    /// Whether neither a content entry nor an info file uses `name`.
    pub fn is_free(&self, name: &OsStr) -> bool {
        !lexists(&self.content_path(name)) && !lexists(&self.info_path(name))
    }

    /// Create `files/` and `info/` (owner-only) if they are missing.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [self.files_dir(), self.info_dir()] {
            if !dir.is_dir() {
                create_private_dir(&dir)?;
            }
        }
        Ok(())
    }

    /// Whether `path` is this root or lies inside it.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// The entry name of `content` if it sits directly in `files/`.
    pub fn entry_name<'p>(&self, content: &'p Path) -> Option<&'p OsStr> {
        if content.parent()? == self.files_dir() {
            content.file_name()
        } else {
            None
        }
    }

    /// The `Path` value to record for an absolute `original`.
    pub fn encode_original(&self, original: &Path) -> PathBuf {
        match &self.kind {
            TrashKind::Home => original.to_path_buf(),
            TrashKind::Device { mount } => original
                .strip_prefix(mount)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| original.to_path_buf()),
        }
    }

    /// Reconstruct the absolute original path from a recorded `Path` value.
    pub fn decode_original(&self, recorded: &Path) -> PathBuf {
        if recorded.is_absolute() {
            return recorded.to_path_buf();
        }
        match &self.kind {
            TrashKind::Device { mount } => mount.join(recorded),
            TrashKind::Home => Path::new("/").join(recorded),
        }
    }

    /// Content paths under `files/`, sorted by name. A root that was never
    /// used yields nothing.
    pub fn entries(&self) -> Result<Vec<PathBuf>> {
        let files = self.files_dir();
        let reader = match fs::read_dir(&files) {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TrashError::io(files, e)),
        };

        let mut names = reader
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<std::io::Result<Vec<OsString>>>()
            .at(&files)?;
        names.sort();
        Ok(names.into_iter().map(|name| files.join(name)).collect())
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .at(dir)
        .map_err(TrashError::from)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).at(dir).map_err(TrashError::from)
}

/// Resolve the home trash location.
///
/// Order: explicit config, `HOST_XDG_DATA_HOME` when sandboxed, the
/// platform data directory, then `~/.local/share`.
pub fn home_trash_path(config: &EngineConfig) -> Result<PathBuf> {
    if let Some(path) = &config.home_trash {
        return Ok(path.clone());
    }
    if config.sandboxed {
        if let Some(host) = env::var_os("HOST_XDG_DATA_HOME").filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(host).join("Trash"));
        }
    }
    if let Some(data) = dirs::data_dir() {
        return Ok(data.join("Trash"));
    }
    dirs::home_dir()
        .map(|home| home.join(".local/share/Trash"))
        .ok_or(TrashError::NoHome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_device_root_uses_uid() {
        let dir = TrashDir::device("/media/usb", 1000);
        assert_eq!(dir.root(), Path::new("/media/usb/.Trash-1000"));
        assert_eq!(dir.files_dir(), Path::new("/media/usb/.Trash-1000/files"));
        assert_eq!(
            dir.info_path(OsStr::new("a.txt")),
            Path::new("/media/usb/.Trash-1000/info/a.txt.trashinfo")
        );
    }

    #[test]
    fn test_original_path_encoding() {
        let device = TrashDir::device("/media/usb", 1000);
        let recorded = device.encode_original(Path::new("/media/usb/docs/a.txt"));
        assert_eq!(recorded, Path::new("docs/a.txt"));
        assert_eq!(device.decode_original(&recorded), Path::new("/media/usb/docs/a.txt"));

        let home = TrashDir::home("/home/me/.local/share/Trash");
        let recorded = home.encode_original(Path::new("/home/me/a.txt"));
        assert_eq!(recorded, Path::new("/home/me/a.txt"));
        assert_eq!(home.decode_original(&recorded), Path::new("/home/me/a.txt"));
    }

    #[test]
    fn test_entry_name_only_for_direct_children() {
        let dir = TrashDir::home("/t");
        assert_eq!(dir.entry_name(Path::new("/t/files/a")), Some(OsStr::new("a")));
        assert_eq!(dir.entry_name(Path::new("/t/files/a/b")), None);
        assert_eq!(dir.entry_name(Path::new("/t/info/a.trashinfo")), None);
    }

    #[test]
    fn test_ensure_layout_and_entries() {
        let temp = TempDir::new().unwrap();
        let dir = TrashDir::home(temp.path().join("Trash"));
        assert!(dir.entries().unwrap().is_empty());

        dir.ensure_layout().unwrap();
        assert!(dir.files_dir().is_dir());
        assert!(dir.info_dir().is_dir());

        fs::write(dir.files_dir().join("b"), "").unwrap();
        fs::write(dir.files_dir().join("a"), "").unwrap();
        assert_eq!(
            dir.entries().unwrap(),
            vec![dir.files_dir().join("a"), dir.files_dir().join("b")]
        );
        assert!(!dir.is_free(OsStr::new("a")));
        assert!(dir.is_free(OsStr::new("c")));
    }

    #[cfg(unix)]
    #[test]
    fn test_layout_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let dir = TrashDir::device(temp.path(), 1000);
        dir.ensure_layout().unwrap();
        let mode = fs::metadata(dir.info_dir()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    #[test]
    fn test_home_trash_config_override() {
        let config = EngineConfig::builder()
            .home_trash(Some(PathBuf::from("/custom/Trash")))
            .build()
            .unwrap();
        assert_eq!(home_trash_path(&config).unwrap(), Path::new("/custom/Trash"));
    }
}
