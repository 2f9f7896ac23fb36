//! Permanent deletion, one filesystem entry per scheduler step.

use std::fs;
use std::path::{Path, PathBuf};

use shelf_core::paths::{bottom_up, is_real_dir};
use shelf_core::{
    EventReceiver, EventSender, IoResultExt, OpError, OperationKind, Result, Selection, Step,
    SteppedTask, TaskCore, TaskHandle, TaskState,
};
use tracing::info;

use crate::progress::RemovalUpdate;

/// Deletes a selection leaves first.
///
/// Every selected entry is expanded bottom-up, so each directory is empty by
/// the time its turn comes. Only the last path of each expansion (the
/// selected entry itself) carries the caller's row.
pub struct DeleteTask<R> {
    core: TaskCore<RemovalUpdate<R>>,
    selection: Selection<R>,
    work: Vec<(PathBuf, Option<R>)>,
    index: usize,
}

impl<R: Clone> DeleteTask<R> {
    pub fn new(selection: Selection<R>, tx: EventSender<RemovalUpdate<R>>) -> Self {
        Self {
            core: TaskCore::new(tx),
            selection,
            work: Vec::new(),
            index: 0,
        }
    }

    /// A task together with the receiving end of its events.
    pub fn channel(selection: Selection<R>) -> (Self, EventReceiver<RemovalUpdate<R>>) {
        let (tx, rx) = shelf_core::event_channel();
        (Self::new(selection, tx), rx)
    }

    fn expand(&self) -> Result<Vec<(PathBuf, Option<R>)>> {
        let mut work = Vec::new();
        for entry in &self.selection {
            let mut paths = bottom_up(&entry.path)?;
            let top = paths.pop();
            work.extend(paths.into_iter().map(|path| (path, None)));
            if let Some(top) = top {
                work.push((top, Some(entry.row.clone())));
            }
        }
        Ok(work)
    }

    fn fail(&mut self, err: &OpError, path: &Path) -> Step {
        self.core.fail(err, path);
        Step::Done
    }
}

fn remove_entry(path: &Path) -> Result<()> {
    if is_real_dir(path) {
        fs::remove_dir(path).at(path)
    } else {
        fs::remove_file(path).at(path)
    }
}

impl<R: Clone> SteppedTask for DeleteTask<R> {
    fn start(&mut self) -> Step {
        let fallback = self
            .selection
            .first()
            .map(|entry| entry.path.clone())
            .unwrap_or_default();
        match self.expand() {
            Ok(work) => {
                self.work = work;
                info!(
                    kind = %OperationKind::Delete,
                    items = self.selection.len(),
                    total = self.work.len(),
                    "operation started"
                );
                self.core.started(Some(self.work.len()));
                Step::Continue
            }
            Err(err) => self.fail(&err, &fallback),
        }
    }

    fn step(&mut self) -> Step {
        if self.core.checkpoint().is_err() {
            self.core.stopped();
            return Step::Done;
        }

        let total = self.work.len();
        let Some((path, row)) = self.work.get(self.index).cloned() else {
            info!(kind = %OperationKind::Delete, total, "operation finished");
            self.core.finish(total);
            return Step::Done;
        };

        self.core.pre_update(&path);
        if let Err(err) = remove_entry(&path) {
            return self.fail(&err, &path);
        }
        self.index += 1;
        self.core.update(RemovalUpdate {
            path,
            row,
            completed: self.index,
            total,
        });
        Step::Continue
    }

    fn state(&self) -> TaskState {
        self.core.state()
    }

    fn handle(&self) -> TaskHandle {
        self.core.handle()
    }
}
