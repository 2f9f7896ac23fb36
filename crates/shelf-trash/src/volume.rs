//! Mounted volumes as seen by the trash.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use shelf_core::paths::find_mount_point;
use tracing::debug;

/// A mounted volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub mount_point: PathBuf,
    pub writable: bool,
}

impl Volume {
    /// Describe the volume at `mount_point`, checking write access.
    pub fn detect(mount_point: impl Into<PathBuf>) -> Self {
        let mount_point = mount_point.into();
        let writable = is_writable(&mount_point);
        Self {
            mount_point,
            writable,
        }
    }
}

/// Source of the currently mounted volumes.
pub trait VolumeMonitor: Send + Sync {
    /// Volumes currently mounted.
    fn volumes(&self) -> Vec<Volume>;

    /// Mount point of the volume holding `path`.
    fn mount_point_of(&self, path: &Path) -> io::Result<PathBuf> {
        find_mount_point(path)
    }
}

impl<T: VolumeMonitor + ?Sized> VolumeMonitor for Arc<T> {
    fn volumes(&self) -> Vec<Volume> {
        (**self).volumes()
    }

    fn mount_point_of(&self, path: &Path) -> io::Result<PathBuf> {
        (**self).mount_point_of(path)
    }
}

/// An explicit, mutable list of volumes.
///
/// Mount points are resolved by longest matching prefix, falling back to
/// the real filesystem for paths outside every listed volume.
#[derive(Debug, Default)]
pub struct StaticVolumes {
    volumes: RwLock<Vec<Volume>>,
}

impl StaticVolumes {
    /// Volumes at `mount_points`, checking write access for each.
    pub fn new<I, P>(mount_points: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            volumes: RwLock::new(mount_points.into_iter().map(Volume::detect).collect()),
        }
    }

    /// Add a volume.
    pub fn attach(&self, volume: Volume) {
        let mut volumes = self.volumes.write().unwrap_or_else(|e| e.into_inner());
        volumes.retain(|v| v.mount_point != volume.mount_point);
        volumes.push(volume);
    }

    /// Remove the volume mounted at `mount_point`.
    pub fn detach(&self, mount_point: &Path) {
        let mut volumes = self.volumes.write().unwrap_or_else(|e| e.into_inner());
        volumes.retain(|v| v.mount_point != mount_point);
    }
}

impl VolumeMonitor for StaticVolumes {
    fn volumes(&self) -> Vec<Volume> {
        self.volumes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn mount_point_of(&self, path: &Path) -> io::Result<PathBuf> {
        let volumes = self.volumes.read().unwrap_or_else(|e| e.into_inner());
        let best = volumes
            .iter()
            .filter(|v| path.starts_with(&v.mount_point))
            .max_by_key(|v| v.mount_point.components().count());
        match best {
            Some(volume) => Ok(volume.mount_point.clone()),
            None => find_mount_point(path),
        }
    }
}

/// Filesystem types that never hold user files.
const PSEUDO_FILESYSTEMS: &[&str] = &[
    "autofs",
    "binfmt_misc",
    "bpf",
    "cgroup",
    "cgroup2",
    "configfs",
    "debugfs",
    "devpts",
    "devtmpfs",
    "fusectl",
    "hugetlbfs",
    "mqueue",
    "nsfs",
    "proc",
    "pstore",
    "securityfs",
    "sysfs",
    "tracefs",
];

/// Kernel-managed trees skipped regardless of filesystem type.
const SYSTEM_PREFIXES: &[&str] = &["/proc", "/sys", "/dev", "/run"];

/// Where udisks2 mounts removable drives; kept although it sits under `/run`.
const REMOVABLE_MEDIA: &str = "/run/media";

fn is_system_mount(mount: &Path) -> bool {
    !mount.starts_with(REMOVABLE_MEDIA) && SYSTEM_PREFIXES.iter().any(|p| mount.starts_with(p))
}

/// Volumes read from the kernel mount table.
#[derive(Debug, Clone)]
pub struct ProcMounts {
    table: PathBuf,
}

impl Default for ProcMounts {
    fn default() -> Self {
        Self {
            table: PathBuf::from("/proc/self/mounts"),
        }
    }
}

impl ProcMounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from an alternative mount table file.
    pub fn with_table(table: impl Into<PathBuf>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl VolumeMonitor for ProcMounts {
    fn volumes(&self) -> Vec<Volume> {
        match fs::read_to_string(&self.table) {
            Ok(text) => parse_mount_table(&text)
                .into_iter()
                .map(Volume::detect)
                .collect(),
            Err(e) => {
                debug!(table = %self.table.display(), error = %e, "cannot read mount table");
                Vec::new()
            }
        }
    }
}

/// Mount points of user-visible filesystems in a `/proc/mounts` style table.
pub fn parse_mount_table(text: &str) -> Vec<PathBuf> {
    let mut mounts = Vec::new();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let (Some(_device), Some(mount), Some(fs_type)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if PSEUDO_FILESYSTEMS.contains(&fs_type) {
            continue;
        }
        let mount = PathBuf::from(unescape_mount(mount));
        if is_system_mount(&mount) {
            continue;
        }
        if !mounts.contains(&mount) {
            mounts.push(mount);
        }
    }
    mounts
}

/// Decode the `\ooo` octal escapes used for whitespace in mount tables.
fn unescape_mount(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Whether the current user may create entries in `dir`.
#[cfg(unix)]
pub fn is_writable(dir: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(path) = CString::new(dir.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `path` is a valid NUL-terminated string for the whole call.
    unsafe { libc::access(path.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
pub fn is_writable(dir: &Path) -> bool {
    fs::metadata(dir).is_ok_and(|m| !m.permissions().readonly())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_mount_table_skips_pseudo_filesystems() {
        let table = "\
sysfs /sys sysfs rw,nosuid 0 0
proc /proc proc rw 0 0
/dev/sda2 / ext4 rw,relatime 0 0
/dev/sdb1 /media/me/USB\\040Stick vfat rw 0 0
tmpfs /run/user/1000 tmpfs rw 0 0
/dev/sda3 /home ext4 rw 0 0
/dev/sdc1 /run/media/me/USB vfat rw,nosuid,nodev 0 0
/dev/sda4 /run/lock ext4 rw 0 0
";
        assert_eq!(
            parse_mount_table(table),
            vec![
                PathBuf::from("/"),
                PathBuf::from("/media/me/USB Stick"),
                PathBuf::from("/home"),
                PathBuf::from("/run/media/me/USB"),
            ]
        );
    }

    #[test]
    fn test_unescape_leaves_plain_backslashes() {
        assert_eq!(unescape_mount("/a\\040b"), "/a b");
        assert_eq!(unescape_mount("/a\\x"), "/a\\x");
        assert_eq!(unescape_mount("/tail\\"), "/tail\\");
    }

    #[test]
    fn test_static_volumes_longest_prefix() {
        let temp = TempDir::new().unwrap();
        let outer = temp.path().join("outer");
        let inner = outer.join("inner");
        fs::create_dir_all(&inner).unwrap();

        let volumes = StaticVolumes::new([outer.clone(), inner.clone()]);
        assert_eq!(volumes.mount_point_of(&inner.join("x")).unwrap(), inner);
        assert_eq!(volumes.mount_point_of(&outer.join("x")).unwrap(), outer);

        volumes.detach(&inner);
        assert_eq!(volumes.mount_point_of(&inner.join("x")).unwrap(), outer);
        assert_eq!(volumes.volumes().len(), 1);
    }

    #[test]
    fn test_detect_reports_writable_temp_dir() {
        let temp = TempDir::new().unwrap();
        assert!(Volume::detect(temp.path()).writable);
    }
}
