//! Trash send, restore and purge as stepped tasks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shelf_core::{
    EventReceiver, EventSender, OpError, OperationKind, Selection, Step, SteppedTask, TaskCore,
    TaskHandle, TaskState,
};
use shelf_trash::Trash;
use tracing::{debug, info};

use crate::progress::RemovalUpdate;

/// What a [`TrashTask`] does with each selected entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashAction {
    /// Move live entries into the trash of their volume.
    Send,
    /// Move trashed content back to where it came from.
    Restore,
    /// Permanently remove trashed content.
    Purge,
}

impl TrashAction {
    pub fn kind(self) -> OperationKind {
        match self {
            Self::Send => OperationKind::Trash,
            Self::Restore => OperationKind::Restore,
            Self::Purge => OperationKind::Purge,
        }
    }

    fn apply(self, trash: &Trash, path: &Path) -> shelf_trash::Result<()> {
        match self {
            Self::Send => trash.put(path).map(|content| {
                if let Some(content) = content {
                    debug!(path = %path.display(), content = %content.display(), "trashed");
                }
            }),
            Self::Restore => trash.restore(path).map(|_| ()),
            Self::Purge => trash.purge(path),
        }
    }
}

/// Applies a [`TrashAction`] to one selected entry per step.
///
/// Every update carries the caller's row, since each step handles exactly
/// one selected entry.
pub struct TrashTask<R> {
    core: TaskCore<RemovalUpdate<R>>,
    trash: Arc<Trash>,
    action: TrashAction,
    selection: Selection<R>,
    index: usize,
}

impl<R: Clone> TrashTask<R> {
    pub fn new(
        trash: Arc<Trash>,
        action: TrashAction,
        selection: Selection<R>,
        tx: EventSender<RemovalUpdate<R>>,
    ) -> Self {
        Self {
            core: TaskCore::new(tx),
            trash,
            action,
            selection,
            index: 0,
        }
    }

    /// A task together with the receiving end of its events.
    pub fn channel(
        trash: Arc<Trash>,
        action: TrashAction,
        selection: Selection<R>,
    ) -> (Self, EventReceiver<RemovalUpdate<R>>) {
        let (tx, rx) = shelf_core::event_channel();
        (Self::new(trash, action, selection, tx), rx)
    }

    pub fn action(&self) -> TrashAction {
        self.action
    }
}

impl<R: Clone> SteppedTask for TrashTask<R> {
    fn start(&mut self) -> Step {
        info!(
            kind = %self.action.kind(),
            total = self.selection.len(),
            "operation started"
        );
        self.core.started(Some(self.selection.len()));
        Step::Continue
    }

    fn step(&mut self) -> Step {
        if self.core.checkpoint().is_err() {
            self.core.stopped();
            return Step::Done;
        }

        let total = self.selection.len();
        let Some(entry) = self.selection.get(self.index) else {
            info!(kind = %self.action.kind(), total, "operation finished");
            self.core.finish(total);
            return Step::Done;
        };
        let path: PathBuf = entry.path.clone();
        let row = entry.row.clone();

        self.core.pre_update(&path);
        if let Err(err) = self.action.apply(&self.trash, &path) {
            self.core.fail(&OpError::from(err), &path);
            return Step::Done;
        }
        self.index += 1;
        self.core.update(RemovalUpdate {
            path,
            row: Some(row),
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
