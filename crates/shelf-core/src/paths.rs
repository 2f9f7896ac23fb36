//! Path utilities: collision-free naming, bottom-up traversal and
//! filesystem-boundary detection.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use jwalk::{Parallelism, WalkDir};

use crate::error::{IoResultExt, OpError, Result};

/// Highest suffix tried before giving up on a name.
const MAX_SUFFIX: u32 = 10_000;

/// How a colliding name is suffixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStyle {
    /// `report.txt` -> `report (1).txt`, `report (2).txt`, ...
    Paste,
    /// `report.txt` -> `report.txt.1`, `report.txt.2`, ...
    Trash,
}

impl NameStyle {
    /// Build the `n`-th candidate for `name`.
    pub fn candidate(self, name: &OsStr, n: u32) -> OsString {
        match self {
            Self::Paste => {
                let path = Path::new(name);
                let stem = path.file_stem().unwrap_or(name);
                let stem = strip_counter(stem);
                let mut candidate = stem.to_os_string();
                candidate.push(format!(" ({n})"));
                if let Some(ext) = path.extension() {
                    candidate.push(".");
                    candidate.push(ext);
                }
                candidate
            }
            Self::Trash => {
                let mut candidate = name.to_os_string();
                candidate.push(format!(".{n}"));
                candidate
            }
        }
    }
}

/// Strip a trailing ` (n)` counter so repeated pastes stay flat.
fn strip_counter(stem: &OsStr) -> &OsStr {
    let Some(text) = stem.to_str() else {
        return stem;
    };
    let Some(open) = text.rfind(" (") else {
        return stem;
    };
    let counter = &text[open + 2..];
    match counter.strip_suffix(')') {
        Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            OsStr::new(&text[..open])
        }
        _ => stem,
    }
}

/// Whether anything (including a dangling symlink) exists at `path`.
pub fn lexists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Whether `path` is a real directory (not a symlink to one).
pub fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.is_dir())
}

/// Pick a name for `name` that `taken` does not reject.
///
/// Returns `name` itself when free, otherwise the first free candidate in
/// `style`. The sequence is deterministic, so the same directory state always
/// yields the same answer.
pub fn unique_name_by<F>(name: &OsStr, style: NameStyle, mut taken: F) -> Result<OsString>
where
    F: FnMut(&OsStr) -> bool,
{
    if !taken(name) {
        return Ok(name.to_os_string());
    }
    for n in 1..=MAX_SUFFIX {
        let candidate = style.candidate(name, n);
        if !taken(&candidate) {
            return Ok(candidate);
        }
    }
    Err(OpError::NameExhausted {
        path: PathBuf::from(name),
    })
}

/// Pick a name for `name` that does not exist inside `dir`.
pub fn unique_name(dir: &Path, name: &OsStr, style: NameStyle) -> Result<OsString> {
    unique_name_by(name, style, |candidate| lexists(&dir.join(candidate)))
        .map_err(|_| OpError::NameExhausted { path: dir.join(name) })
}

/// Make `path` absolute without touching the filesystem.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).at(path)
}

/// Resolve `path` through symlinks and `..`. A path that does not exist yet
/// is only made absolute.
pub fn canonical(path: &Path) -> Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == io::ErrorKind::NotFound => absolute(path),
        Err(e) => Err(OpError::io(path, e)),
    }
}

/// Like [`canonical`], but the final component is kept as named, so a
/// symlink still refers to the link itself.
pub fn canonical_entry(path: &Path) -> Result<PathBuf> {
    let path = absolute(path)?;
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => Ok(canonical(parent)?.join(name)),
        _ => canonical(&path),
    }
}

/// Whether `a` and `b` are the same filesystem entry (symlinks not
/// followed). Catches aliases that path comparison misses, such as bind
/// mounts.
#[cfg(unix)]
pub fn same_entry(a: &Path, b: &Path) -> bool {
    match (fs::symlink_metadata(a), fs::symlink_metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
pub fn same_entry(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Device id of the filesystem holding `path` (symlinks not followed).
#[cfg(unix)]
pub fn device_of(path: &Path) -> io::Result<u64> {
    fs::symlink_metadata(path).map(|m| m.dev())
}

#[cfg(not(unix))]
pub fn device_of(path: &Path) -> io::Result<u64> {
    fs::symlink_metadata(path).map(|_| 0)
}

/// Whether `a` and `b` live on different storage devices.
pub fn crosses_device(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(device_of(a)? != device_of(b)?)
}

/// Find the mount point of the filesystem holding `path`.
///
/// Walks toward the root until the device id changes. Missing trailing
/// components are resolved against their nearest existing ancestor.
pub fn find_mount_point(path: &Path) -> io::Result<PathBuf> {
    let mut current = std::path::absolute(path)?;
    while !lexists(&current) {
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    let device = device_of(&current)?;
    loop {
        let Some(parent) = current.parent() else {
            return Ok(current);
        };
        if device_of(parent)? != device {
            return Ok(current);
        }
        current = parent.to_path_buf();
    }
}

/// List every entry under `path` so that each entry precedes its parent.
///
/// A non-directory (including a symlink to a directory) yields just itself.
/// Symlinks are never followed and hidden entries are included. The first
/// traversal error aborts with the offending path.
pub fn bottom_up(path: &Path) -> Result<Vec<PathBuf>> {
    let metadata = fs::symlink_metadata(path).at(path)?;
    if !metadata.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let walker = WalkDir::new(path)
        .parallelism(Parallelism::Serial)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true);

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|err| walk_error(path, err))?;
        entries.push(entry.path());
    }

    // Depth-first pre-order reversed puts every child before its directory.
    entries.reverse();
    Ok(entries)
}

/// Count work units for `path`: one for the entry plus one per contained
/// non-directory entry.
///
/// An unreadable directory fails the count with its path, as in
/// [`bottom_up`], rather than leaving the total short.
pub fn count_units(path: &Path) -> Result<usize> {
    if !is_real_dir(path) {
        return Ok(1);
    }

    let walker = WalkDir::new(path)
        .skip_hidden(false)
        .follow_links(false)
        .min_depth(1);

    let mut contained = 0;
    for entry in walker {
        let entry = entry.map_err(|err| walk_error(path, err))?;
        if !entry.file_type().is_dir() {
            contained += 1;
        }
    }
    Ok(1 + contained)
}

fn walk_error(root: &Path, err: jwalk::Error) -> OpError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    let kind = err.io_error().map(|e| e.kind()).unwrap_or(io::ErrorKind::Other);
    OpError::io(path, io::Error::new(kind, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paste_candidates() {
        let name = OsStr::new("report.txt");
        assert_eq!(NameStyle::Paste.candidate(name, 1), "report (1).txt");
        assert_eq!(NameStyle::Paste.candidate(name, 2), "report (2).txt");
        assert_eq!(NameStyle::Paste.candidate(OsStr::new("notes"), 3), "notes (3)");
    }

    #[test]
    fn test_paste_candidate_strips_existing_counter() {
        let name = OsStr::new("report (1).txt");
        assert_eq!(NameStyle::Paste.candidate(name, 2), "report (2).txt");
        let name = OsStr::new("draft (v2)");
        assert_eq!(NameStyle::Paste.candidate(name, 1), "draft (v2) (1)");
    }

    #[test]
    fn test_trash_candidates() {
        assert_eq!(NameStyle::Trash.candidate(OsStr::new("a.txt"), 1), "a.txt.1");
        assert_eq!(NameStyle::Trash.candidate(OsStr::new("a.txt"), 12), "a.txt.12");
    }

    #[test]
    fn test_unique_name_free_name_is_kept() {
        let temp = TempDir::new().unwrap();
        let name = unique_name(temp.path(), OsStr::new("doc.txt"), NameStyle::Paste).unwrap();
        assert_eq!(name, "doc.txt");
    }

    #[test]
    fn test_unique_name_skips_taken_candidates() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("doc.txt"), "a").unwrap();
        fs::write(temp.path().join("doc (1).txt"), "b").unwrap();

        let name = unique_name(temp.path(), OsStr::new("doc.txt"), NameStyle::Paste).unwrap();
        assert_eq!(name, "doc (2).txt");
    }

    #[cfg(unix)]
    #[test]
    fn test_unique_name_counts_dangling_symlinks() {
        let temp = TempDir::new().unwrap();
        std::os::unix::fs::symlink("/nonexistent/target", temp.path().join("link")).unwrap();

        let name = unique_name(temp.path(), OsStr::new("link"), NameStyle::Trash).unwrap();
        assert_eq!(name, "link.1");
    }

    #[test]
    fn test_bottom_up_children_before_parents() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("tree");
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::write(root.join("a/b/file.txt"), "x").unwrap();
        fs::write(root.join("a/top.txt"), "y").unwrap();
        fs::write(root.join(".hidden/secret"), "z").unwrap();

        let order = bottom_up(&root).unwrap();
        assert_eq!(order.len(), 7);
        assert_eq!(order.last(), Some(&root));

        for (i, path) in order.iter().enumerate() {
            for later in &order[i + 1..] {
                assert!(
                    !(later.starts_with(path) && later != path),
                    "{} listed before its child {}",
                    path.display(),
                    later.display()
                );
            }
        }
    }

    #[test]
    fn test_bottom_up_single_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("only.txt");
        fs::write(&file, "x").unwrap();
        assert_eq!(bottom_up(&file).unwrap(), vec![file]);
    }

    #[test]
    fn test_bottom_up_missing_path_reports_it() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        let err = bottom_up(&missing).unwrap_err();
        assert_eq!(err.path(), Some(missing.as_path()));
    }

    #[test]
    fn test_count_units() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("tree");
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::write(root.join("one"), "1").unwrap();
        fs::write(root.join("sub/two"), "2").unwrap();
        fs::write(root.join("sub/deeper/three"), "3").unwrap();

        assert_eq!(count_units(&root).unwrap(), 4);
        assert_eq!(count_units(&root.join("one")).unwrap(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_count_units_reports_unreadable_directory() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let root = temp.path().join("tree");
        let locked = root.join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("hidden-from-count"), "x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let readable = fs::read_dir(&locked).is_ok();
        let result = count_units(&root);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        if readable {
            // Permission bits do not bind this user (root).
            return;
        }

        let err = result.unwrap_err();
        assert!(err.path().is_some_and(|path| path.starts_with(&root)));
    }

    #[cfg(unix)]
    #[test]
    fn test_canonical_resolves_aliases() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("d");
        fs::create_dir_all(dir.join("sub")).unwrap();
        std::os::unix::fs::symlink(&dir, temp.path().join("alias")).unwrap();
        let real = fs::canonicalize(&dir).unwrap();

        assert_eq!(canonical(&temp.path().join("alias")).unwrap(), real);
        assert_eq!(canonical(&dir.join("sub/..")).unwrap(), real);
        // The link itself is kept when it is the final component.
        assert_eq!(
            canonical_entry(&temp.path().join("alias")).unwrap(),
            fs::canonicalize(temp.path()).unwrap().join("alias")
        );
        assert_eq!(canonical(&dir.join("not-yet")).unwrap(), dir.join("not-yet"));
    }

    #[cfg(unix)]
    #[test]
    fn test_same_entry_sees_through_aliases() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("d");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("a.txt"), "x").unwrap();
        std::os::unix::fs::symlink(&dir, temp.path().join("alias")).unwrap();

        assert!(same_entry(&dir.join("a.txt"), &temp.path().join("alias/a.txt")));
        assert!(!same_entry(&dir, &temp.path().join("alias")));
        assert!(!same_entry(&dir.join("a.txt"), &dir.join("missing")));
    }

    #[test]
    fn test_find_mount_point_is_ancestor() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-yet-created/file");
        let mount = find_mount_point(&file).unwrap();
        assert!(file.starts_with(&mount));
        assert_eq!(find_mount_point(Path::new("/")).unwrap(), PathBuf::from("/"));
    }
}
