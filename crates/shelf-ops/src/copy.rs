//! Recursive copy on a worker thread.

use std::path::{Path, PathBuf};

use shelf_core::paths::{
    self, count_units, is_real_dir, lexists, same_entry, unique_name, NameStyle,
};
use shelf_core::transfer::{remove_path, sync_dir, Transfer, TreeObserver};
use shelf_core::{
    entry_name, EngineConfig, EventReceiver, OpError, OperationKind, Result, TaskCore,
    ThreadedTask,
};
use tracing::info;

use crate::progress::{TransferProgress, TransferUpdate};

/// Counts work units and turns copy callbacks into task events.
pub(crate) struct UnitCounter<'a> {
    core: &'a TaskCore<TransferUpdate>,
    completed: usize,
    total: usize,
}

impl<'a> UnitCounter<'a> {
    pub(crate) fn new(core: &'a TaskCore<TransferUpdate>, total: usize) -> Self {
        Self {
            core,
            completed: 0,
            total,
        }
    }

    /// Account for units handled without copying.
    pub(crate) fn skip(&mut self, units: usize) {
        self.completed += units;
    }

    /// Report a finished top-level entry.
    pub(crate) fn placed(&mut self, path: PathBuf, overwritten: bool) {
        self.completed += 1;
        self.core.update(TransferUpdate::Placed {
            path,
            overwritten,
            completed: self.completed,
            total: self.total,
        });
    }
}

impl TreeObserver for UnitCounter<'_> {
    fn before_entry(&mut self, _source: &Path, dest: &Path) -> Result<()> {
        self.core.checkpoint()?;
        self.core.pre_update(dest);
        Ok(())
    }

    fn on_bytes(&mut self, dest: &Path, copied: u64, total: u64) {
        self.core.update(TransferUpdate::Progress(TransferProgress {
            path: dest.to_path_buf(),
            completed: self.completed,
            total: self.total,
            bytes_copied: copied,
            bytes_total: total,
        }));
    }

    fn after_entry(&mut self, _source: &Path, _dest: &Path) {
        self.completed += 1;
    }
}

/// Fail when `source` would end up inside itself, or when replacing `dest`
/// would remove `source`.
pub(crate) fn check_nesting(source: &Path, dest: &Path) -> Result<()> {
    if (is_real_dir(source) && dest.starts_with(source)) || source.starts_with(dest) {
        return Err(OpError::IntoItself {
            path: source.to_path_buf(),
        });
    }
    Ok(())
}

/// Resolved forms of `sources` and `destination`.
///
/// The destination is followed through symlinks and `..`; each source keeps
/// its own final component, so a selected symlink is moved as the link.
pub(crate) fn resolve(sources: &[PathBuf], destination: &Path) -> Result<(Vec<PathBuf>, PathBuf)> {
    let sources = sources
        .iter()
        .map(|s| paths::canonical_entry(s))
        .collect::<Result<Vec<_>>>()?;
    Ok((sources, paths::canonical(destination)?))
}

/// Total work units for `sources`, one count per source.
pub(crate) fn count_all(sources: &[PathBuf]) -> Result<Vec<usize>> {
    sources.iter().map(|s| count_units(s)).collect()
}

/// Start copying `sources` into the `destination` directory.
///
/// Existing destinations are replaced, except that pasting an entry into
/// its own directory (under any alias of it) picks a fresh `name (n)`
/// instead. The returned task
/// runs on its own thread; its events arrive on the receiver.
pub fn start_copy(
    sources: Vec<PathBuf>,
    destination: PathBuf,
    config: &EngineConfig,
) -> Result<(ThreadedTask, EventReceiver<TransferUpdate>)> {
    let (core, rx) = TaskCore::channel();
    let config = config.clone();
    let fallback = destination.clone();
    let task = ThreadedTask::spawn("shelf-copy", core, fallback, move |core| {
        copy_all(core, &sources, &destination, &config)
    })?;
    Ok((task, rx))
}

fn copy_all(
    core: &mut TaskCore<TransferUpdate>,
    sources: &[PathBuf],
    destination: &Path,
    config: &EngineConfig,
) -> Result<usize> {
    let (sources, destination) = resolve(sources, destination)?;
    let total: usize = count_all(&sources)?.into_iter().sum();
    core.started(Some(total));
    info!(
        kind = %OperationKind::Copy,
        items = sources.len(),
        total,
        destination = %destination.display(),
        "operation started"
    );

    let core = &*core;
    let transfer = Transfer::new(config.min_block_size, core.token());
    let mut counter = UnitCounter::new(core, total);

    for source in &sources {
        core.checkpoint()?;

        let name = entry_name(source);
        let beside_itself = source.parent() == Some(destination.as_path())
            || same_entry(source, &destination.join(name));
        let (dest, overwritten) = if beside_itself {
            let fresh = unique_name(&destination, name, NameStyle::Paste)?;
            (destination.join(fresh), false)
        } else {
            let dest = destination.join(name);
            let overwritten = lexists(&dest);
            (dest, overwritten)
        };
        check_nesting(source, &dest)?;

        core.pre_update(&dest);
        if overwritten {
            remove_path(&dest)?;
        }
        transfer.copy_entry(source, &dest, &mut counter)?;
        if config.sync_directories {
            sync_dir(&destination)?;
        }
        counter.placed(dest, overwritten);
    }

    info!(kind = %OperationKind::Copy, total, "operation finished");
    Ok(total)
}
