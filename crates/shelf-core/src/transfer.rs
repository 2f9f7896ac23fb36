//! Byte-copy primitive with adaptive block size, and the tree helpers built
//! on top of it.
//!
//! Every block is written and synced before the next one is read. The block
//! size adapts to how long the last sync cycle took, which bounds how much
//! data a crash can lose while keeping progress events roughly uniform.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{IoResultExt, OpError, Result};

/// Sync cycles faster than this double the block size.
pub const SPEED_UP_BELOW: Duration = Duration::from_millis(750);

/// Sync cycles slower than this halve the block size.
pub const SLOW_DOWN_ABOVE: Duration = Duration::from_millis(1250);

/// Upper bound on a single block.
#[cfg(target_pointer_width = "32")]
pub const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;

/// Upper bound on a single block.
#[cfg(not(target_pointer_width = "32"))]
pub const MAX_BLOCK_SIZE: usize = usize::MAX;

/// Mutable pacing state of the copy loop.
#[derive(Debug, Clone)]
pub struct BlockPacer {
    min_block_size: usize,
    block_size: usize,
    last_sync: Instant,
}

impl BlockPacer {
    /// Start pacing at `min_block_size`.
    pub fn new(min_block_size: usize) -> Self {
        let min_block_size = min_block_size.max(1);
        Self {
            min_block_size,
            block_size: min_block_size,
            last_sync: Instant::now(),
        }
    }

    /// The current (unclamped by remaining bytes) block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Size of the next block when `remaining` bytes are left.
    pub fn next_block(&self, remaining: u64) -> usize {
        self.clamp(self.block_size, remaining)
    }

    /// Record a completed sync cycle, measuring it against the previous one.
    pub fn record_sync(&mut self, remaining: u64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_sync);
        self.last_sync = now;
        self.adapt(elapsed, remaining);
    }

    /// Apply the doubling/halving policy for a cycle that took `elapsed`.
    pub fn adapt(&mut self, elapsed: Duration, remaining: u64) {
        let size = if elapsed < SPEED_UP_BELOW {
            self.block_size.saturating_mul(2)
        } else if elapsed > SLOW_DOWN_ABOVE {
            self.block_size / 2
        } else {
            self.block_size
        };
        self.block_size = self.clamp(size, remaining);
        trace!(?elapsed, block_size = self.block_size, "adapted copy block");
    }

    fn clamp(&self, size: usize, remaining: u64) -> usize {
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        size.max(self.min_block_size)
            .min(remaining)
            .min(MAX_BLOCK_SIZE)
    }
}

/// Hooks invoked while a tree is copied.
pub trait TreeObserver {
    /// Called before a non-directory entry is copied.
    fn before_entry(&mut self, _source: &Path, _dest: &Path) -> Result<()> {
        Ok(())
    }

    /// Called after every synced block of a regular file.
    fn on_bytes(&mut self, _dest: &Path, _copied: u64, _total: u64) {}

    /// Called after a non-directory entry has been copied.
    fn after_entry(&mut self, _source: &Path, _dest: &Path) {}
}

/// An observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl TreeObserver for Silent {}

/// Copy parameters shared by a whole operation.
#[derive(Debug, Clone, Copy)]
pub struct Transfer<'a> {
    min_block_size: usize,
    cancel: &'a CancellationToken,
}

impl<'a> Transfer<'a> {
    /// Create transfer parameters checking `cancel` at every checkpoint.
    pub fn new(min_block_size: usize, cancel: &'a CancellationToken) -> Self {
        Self {
            min_block_size,
            cancel,
        }
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(OpError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Copy one regular file block by block, syncing after each block.
    ///
    /// `on_progress` receives `(bytes copied, total bytes)` after each block.
    /// Mode bits are copied once the content is in place. A cancelled copy
    /// leaves its partial destination behind.
    pub fn copy_file<F>(&self, source: &Path, dest: &Path, mut on_progress: F) -> Result<u64>
    where
        F: FnMut(u64, u64),
    {
        self.checkpoint()?;

        let mut reader = File::open(source).at(source)?;
        let metadata = reader.metadata().at(source)?;
        let total = metadata.len();
        let mut writer = File::create(dest).at(dest)?;

        let mut pacer = BlockPacer::new(self.min_block_size);
        let mut buffer = Vec::new();
        let mut copied = 0u64;

        while copied < total {
            self.checkpoint()?;

            let block = pacer.next_block(total - copied);
            buffer.resize(block, 0);
            let read = read_block(&mut reader, &mut buffer).at(source)?;
            if read == 0 {
                // The source shrank underneath us.
                break;
            }

            writer.write_all(&buffer[..read]).at(dest)?;
            writer.sync_all().at(dest)?;
            copied += read as u64;

            pacer.record_sync(total.saturating_sub(copied));
            on_progress(copied, total);
        }

        if total == 0 {
            writer.sync_all().at(dest)?;
            on_progress(0, 0);
        }

        fs::set_permissions(dest, metadata.permissions()).at(dest)?;
        Ok(copied)
    }

    /// Copy a directory tree top-down.
    ///
    /// Each destination directory is created before its children, so a
    /// failure leaves an inspectable partial copy.
    pub fn copy_tree(
        &self,
        source: &Path,
        dest: &Path,
        observer: &mut dyn TreeObserver,
    ) -> Result<u64> {
        self.checkpoint()?;

        let metadata = fs::symlink_metadata(source).at(source)?;
        fs::create_dir(dest).at(dest)?;

        let mut children = fs::read_dir(source)
            .at(source)?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<io::Result<Vec<_>>>()
            .at(source)?;
        children.sort();

        let mut bytes = 0u64;
        for name in children {
            let child = source.join(&name);
            let child_dest = dest.join(&name);
            let file_type = fs::symlink_metadata(&child).at(&child)?.file_type();

            if file_type.is_dir() {
                bytes += self.copy_tree(&child, &child_dest, observer)?;
                continue;
            }

            observer.before_entry(&child, &child_dest)?;
            bytes += self.copy_entry(&child, &child_dest, observer)?;
            observer.after_entry(&child, &child_dest);
        }

        // Applied last so read-only directories still accept their children.
        fs::set_permissions(dest, metadata.permissions()).at(dest)?;
        Ok(bytes)
    }

    /// Copy any entry: symlinks are recreated, regular files go through
    /// [`Transfer::copy_file`] and directories through [`Transfer::copy_tree`].
    pub fn copy_entry(
        &self,
        source: &Path,
        dest: &Path,
        observer: &mut dyn TreeObserver,
    ) -> Result<u64> {
        let file_type = fs::symlink_metadata(source).at(source)?.file_type();
        if file_type.is_symlink() {
            copy_symlink(source, dest)?;
            Ok(0)
        } else if file_type.is_file() {
            self.copy_file(source, dest, |copied, total| {
                observer.on_bytes(dest, copied, total)
            })
        } else if file_type.is_dir() {
            self.copy_tree(source, dest, observer)
        } else {
            Err(OpError::io(
                source,
                io::Error::new(io::ErrorKind::Unsupported, "special files cannot be copied"),
            ))
        }
    }

    /// Move `source` to `dest`: rename when possible, otherwise copy and then
    /// remove the source once everything has been copied.
    pub fn relocate(&self, source: &Path, dest: &Path) -> Result<()> {
        match fs::rename(source, dest) {
            Ok(()) => Ok(()),
            Err(e) if is_cross_device(&e) => {
                self.copy_entry(source, dest, &mut Silent)?;
                remove_path(source)
            }
            Err(e) => Err(OpError::io(source, e)),
        }
    }
}

/// Fill `buffer` as far as the reader allows.
fn read_block(reader: &mut impl Read, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Recreate the symlink `source` at `dest` without following it.
#[cfg(unix)]
pub fn copy_symlink(source: &Path, dest: &Path) -> Result<()> {
    let target = fs::read_link(source).at(source)?;
    std::os::unix::fs::symlink(&target, dest).at(dest)
}

#[cfg(not(unix))]
pub fn copy_symlink(source: &Path, _dest: &Path) -> Result<()> {
    Err(OpError::io(
        source,
        io::Error::new(io::ErrorKind::Unsupported, "symlinks are not supported"),
    ))
}

/// Sync a directory so that entries created inside it are durable.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir).and_then(|d| d.sync_all()).at(dir)
}

#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Remove `path`, recursively when it is a real directory.
pub fn remove_path(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path).at(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path).at(path)
    } else {
        fs::remove_file(path).at(path)
    }
}

/// Whether a rename failed because source and destination are on different
/// devices.
#[cfg(unix)]
pub fn is_cross_device(error: &io::Error) -> bool {
    error.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
pub fn is_cross_device(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::CrossesDevices
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MIB: usize = 1024 * 1024;

    #[test]
    fn test_pacer_doubles_on_fast_sync() {
        let mut pacer = BlockPacer::new(MIB);
        pacer.adapt(Duration::from_millis(100), u64::MAX);
        assert_eq!(pacer.block_size(), 2 * MIB);
        pacer.adapt(Duration::from_millis(100), u64::MAX);
        assert_eq!(pacer.block_size(), 4 * MIB);
    }

    #[test]
    fn test_pacer_halves_on_slow_sync() {
        let mut pacer = BlockPacer::new(MIB);
        pacer.adapt(Duration::from_millis(10), u64::MAX);
        pacer.adapt(Duration::from_millis(10), u64::MAX);
        pacer.adapt(Duration::from_millis(2000), u64::MAX);
        assert_eq!(pacer.block_size(), 2 * MIB);
    }

    #[test]
    fn test_pacer_holds_inside_band() {
        let mut pacer = BlockPacer::new(MIB);
        pacer.adapt(Duration::from_millis(10), u64::MAX);
        pacer.adapt(Duration::from_millis(1000), u64::MAX);
        assert_eq!(pacer.block_size(), 2 * MIB);
    }

    #[test]
    fn test_pacer_never_drops_below_minimum() {
        let mut pacer = BlockPacer::new(MIB);
        pacer.adapt(Duration::from_secs(5), u64::MAX);
        assert_eq!(pacer.block_size(), MIB);
    }

    #[test]
    fn test_pacer_clamps_to_remaining() {
        let mut pacer = BlockPacer::new(MIB);
        assert_eq!(pacer.next_block(10), 10);
        pacer.adapt(Duration::from_millis(1), 3 * MIB as u64);
        assert_eq!(pacer.block_size(), 2 * MIB);
        pacer.adapt(Duration::from_millis(1), 3 * MIB as u64);
        assert_eq!(pacer.block_size(), 3 * MIB);
    }

    #[test]
    fn test_copy_file_reports_progress_up_to_size() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src.bin");
        let dest = temp.path().join("dst.bin");
        let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&source, &content).unwrap();

        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let copied = Transfer::new(1024, &cancel)
            .copy_file(&source, &dest, |copied, total| seen.push((copied, total)))
            .unwrap();

        assert_eq!(copied, 10_000);
        assert_eq!(fs::read(&dest).unwrap(), content);
        assert_eq!(seen.last(), Some(&(10_000, 10_000)));
        assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
        // At best 1024 + 2048 + 4096 + the remaining 2832.
        assert!(seen.len() >= 4);
    }

    #[test]
    fn test_copy_file_empty() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("empty");
        fs::write(&source, "").unwrap();

        let cancel = CancellationToken::new();
        let mut calls = 0;
        Transfer::new(1024, &cancel)
            .copy_file(&source, &temp.path().join("copy"), |_, _| calls += 1)
            .unwrap();
        assert_eq!(calls, 1);
        assert!(temp.path().join("copy").exists());
    }

    #[test]
    fn test_copy_file_observes_cancellation() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        fs::write(&source, vec![1u8; 8192]).unwrap();

        let cancel = CancellationToken::new();
        let result = Transfer::new(1024, &cancel).copy_file(
            &source,
            &temp.path().join("dst"),
            |_, _| cancel.cancel(),
        );
        assert!(matches!(result, Err(OpError::Cancelled)));
        // The partial destination is left as-is.
        assert_eq!(fs::metadata(temp.path().join("dst")).unwrap().len(), 1024);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_file_copies_mode_bits() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let source = temp.path().join("script.sh");
        fs::write(&source, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&source, fs::Permissions::from_mode(0o751)).unwrap();

        let cancel = CancellationToken::new();
        let dest = temp.path().join("copy.sh");
        Transfer::new(1024, &cancel).copy_file(&source, &dest, |_, _| {}).unwrap();

        let mode = fs::metadata(&dest).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o751);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_recreates_symlinks() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("tree");
        fs::create_dir_all(source.join("nested")).unwrap();
        fs::write(source.join("nested/data"), "payload").unwrap();
        std::os::unix::fs::symlink("nested/data", source.join("link")).unwrap();

        let cancel = CancellationToken::new();
        let dest = temp.path().join("copy");
        Transfer::new(1024, &cancel)
            .copy_tree(&source, &dest, &mut Silent)
            .unwrap();

        assert_eq!(fs::read_to_string(dest.join("nested/data")).unwrap(), "payload");
        assert!(fs::symlink_metadata(dest.join("link")).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(dest.join("link")).unwrap(), Path::new("nested/data"));
    }

    #[test]
    fn test_relocate_same_device_renames() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a");
        let dest = temp.path().join("b");
        fs::write(&source, "x").unwrap();

        let cancel = CancellationToken::new();
        Transfer::new(1024, &cancel).relocate(&source, &dest).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "x");
    }

    #[test]
    fn test_remove_path_handles_trees() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("d");
        fs::create_dir_all(dir.join("e")).unwrap();
        fs::write(dir.join("e/f"), "x").unwrap();

        remove_path(&dir).unwrap();
        assert!(!dir.exists());
    }
}
