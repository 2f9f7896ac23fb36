//! Move on a worker thread: rename when possible, copy and remove across
//! devices.

use std::fs;
use std::path::{Path, PathBuf};

use shelf_core::paths::{crosses_device, lexists, same_entry};
use shelf_core::transfer::{is_cross_device, remove_path, sync_dir, Transfer};
use shelf_core::{
    entry_name, EngineConfig, EventReceiver, OpError, OperationKind, Result, TaskCore,
    ThreadedTask,
};
use tracing::{debug, info};

use crate::copy::{check_nesting, count_all, resolve, UnitCounter};
use crate::progress::TransferUpdate;

/// Start moving `sources` into the `destination` directory.
///
/// Existing destinations are replaced. Moving an entry onto itself, under
/// any alias of its directory, is skipped. A directory that has to be copied across devices is removed
/// only after all of it has been copied.
pub fn start_move(
    sources: Vec<PathBuf>,
    destination: PathBuf,
    config: &EngineConfig,
) -> Result<(ThreadedTask, EventReceiver<TransferUpdate>)> {
    let (core, rx) = TaskCore::channel();
    let config = config.clone();
    let fallback = destination.clone();
    let task = ThreadedTask::spawn("shelf-move", core, fallback, move |core| {
        move_all(core, &sources, &destination, &config)
    })?;
    Ok((task, rx))
}

fn move_all(
    core: &mut TaskCore<TransferUpdate>,
    sources: &[PathBuf],
    destination: &Path,
    config: &EngineConfig,
) -> Result<usize> {
    let (sources, destination) = resolve(sources, destination)?;
    let units = count_all(&sources)?;
    let total = units.iter().sum();
    core.started(Some(total));
    info!(
        kind = %OperationKind::Move,
        items = sources.len(),
        total,
        destination = %destination.display(),
        "operation started"
    );

    let core = &*core;
    let transfer = Transfer::new(config.min_block_size, core.token());
    let mut counter = UnitCounter::new(core, total);

    for (source, units) in sources.iter().zip(units) {
        core.checkpoint()?;

        let dest = destination.join(entry_name(source));
        core.pre_update(&dest);
        if dest == *source || same_entry(source, &dest) {
            counter.skip(units);
            continue;
        }
        check_nesting(source, &dest)?;

        let overwritten = lexists(&dest);
        if overwritten {
            remove_path(&dest)?;
        }

        match fs::rename(source, &dest) {
            Ok(()) => counter.skip(units - 1),
            Err(e) if is_cross_device(&e) => {
                debug!(
                    source = %source.display(),
                    cross_device = crosses_device(source, &destination).unwrap_or(true),
                    "rename not possible, copying"
                );
                transfer.copy_entry(source, &dest, &mut counter)?;
                remove_path(source)?;
            }
            Err(e) => return Err(OpError::io(source.clone(), e)),
        }

        if config.sync_directories {
            sync_dir(&destination)?;
        }
        counter.placed(dest, overwritten);
    }

    info!(kind = %OperationKind::Move, total, "operation finished");
    Ok(total)
}
