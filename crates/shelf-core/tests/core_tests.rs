use shelf_core::paths::{bottom_up, unique_name, NameStyle};
use shelf_core::transfer::{Silent, TreeObserver, Transfer};
use shelf_core::{CancellationToken, OpError};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn build_tree(root: &Path) {
    fs::create_dir_all(root.join("docs/drafts")).unwrap();
    fs::create_dir_all(root.join("empty")).unwrap();
    fs::create_dir_all(root.join(".config")).unwrap();
    fs::write(root.join("readme.md"), "# hello").unwrap();
    fs::write(root.join("docs/a.txt"), vec![7u8; 5000]).unwrap();
    fs::write(root.join("docs/drafts/b.txt"), "draft").unwrap();
    fs::write(root.join(".config/settings"), "k=v").unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink("../readme.md", root.join("docs/link")).unwrap();
}

/// Collect (relative path, kind, content-or-target) for every entry.
fn snapshot(root: &Path) -> Vec<(PathBuf, String)> {
    let mut out = Vec::new();
    let mut order = bottom_up(root).unwrap();
    order.sort();
    for path in order {
        let rel = path.strip_prefix(root).unwrap().to_path_buf();
        let meta = fs::symlink_metadata(&path).unwrap();
        let desc = if meta.file_type().is_symlink() {
            format!("link:{}", fs::read_link(&path).unwrap().display())
        } else if meta.is_dir() {
            "dir".to_string()
        } else {
            format!("file:{:?}", fs::read(&path).unwrap())
        };
        out.push((rel, desc));
    }
    out
}

#[test]
fn test_copy_tree_then_delete_original_preserves_everything() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    build_tree(&source);
    let before = snapshot(&source);

    let cancel = CancellationToken::new();
    let dest = temp.path().join("dest");
    Transfer::new(1024, &cancel)
        .copy_tree(&source, &dest, &mut Silent)
        .unwrap();

    for path in bottom_up(&source).unwrap() {
        if fs::symlink_metadata(&path).unwrap().is_dir() {
            fs::remove_dir(&path).unwrap();
        } else {
            fs::remove_file(&path).unwrap();
        }
    }
    assert!(!source.exists());
    assert_eq!(snapshot(&dest), before);
}

#[test]
fn test_bottom_up_removal_never_hits_non_empty_directory() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("deep");
    let mut current = root.clone();
    for depth in 0..8 {
        current = current.join(format!("level{depth}"));
        fs::create_dir_all(&current).unwrap();
        fs::write(current.join("file"), "x").unwrap();
        fs::create_dir_all(current.join("sibling")).unwrap();
    }

    for path in bottom_up(&root).unwrap() {
        let meta = fs::symlink_metadata(&path).unwrap();
        if meta.is_dir() {
            fs::remove_dir(&path).expect("directory should be empty when reached");
        } else {
            fs::remove_file(&path).unwrap();
        }
    }
    assert!(!root.exists());
}

#[test]
fn test_repeated_paste_names_are_distinct() {
    let temp = TempDir::new().unwrap();
    let mut names = Vec::new();
    for _ in 0..5 {
        let name = unique_name(temp.path(), OsStr::new("doc.txt"), NameStyle::Paste).unwrap();
        fs::write(temp.path().join(&name), "x").unwrap();
        names.push(name);
    }
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 5);
    assert!(temp.path().join("doc (4).txt").exists());
}

struct Counting {
    before: usize,
    after: usize,
    cancel_after: Option<usize>,
    token: CancellationToken,
}

impl TreeObserver for Counting {
    fn before_entry(&mut self, _source: &Path, _dest: &Path) -> shelf_core::Result<()> {
        self.before += 1;
        if self.token.is_cancelled() {
            return Err(OpError::Cancelled);
        }
        Ok(())
    }

    fn after_entry(&mut self, _source: &Path, _dest: &Path) {
        self.after += 1;
        if Some(self.after) == self.cancel_after {
            self.token.cancel();
        }
    }
}

#[test]
fn test_copy_tree_observer_sees_every_non_directory() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    build_tree(&source);

    let cancel = CancellationToken::new();
    let mut observer = Counting {
        before: 0,
        after: 0,
        cancel_after: None,
        token: cancel.clone(),
    };
    Transfer::new(4096, &cancel)
        .copy_tree(&source, &temp.path().join("dest"), &mut observer)
        .unwrap();

    let expected = if cfg!(unix) { 5 } else { 4 };
    assert_eq!(observer.before, expected);
    assert_eq!(observer.after, expected);
}

#[test]
fn test_copy_tree_cancellation_leaves_partial_copy() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    build_tree(&source);

    let cancel = CancellationToken::new();
    let mut observer = Counting {
        before: 0,
        after: 0,
        cancel_after: Some(1),
        token: cancel.clone(),
    };
    let dest = temp.path().join("dest");
    let result = Transfer::new(4096, &cancel).copy_tree(&source, &dest, &mut observer);

    assert!(matches!(result, Err(OpError::Cancelled)));
    assert_eq!(observer.after, 1);
    assert!(dest.exists());
}
