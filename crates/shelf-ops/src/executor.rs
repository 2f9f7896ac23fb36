//! The operation controller: one entry point for every engine operation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shelf_core::{
    EngineConfig, EventReceiver, OperationKind, Result, Scheduler, Selection, TaskHandle,
    ThreadedTask,
};
use shelf_scan::{BatchUpdate, DirectoryLoader, PropertiesUpdate, PropertiesWorker, TrashLoader};
use shelf_trash::{is_trash_root, Trash};
use tracing::debug;

use crate::conflict::{find_conflicts, Conflict};
use crate::copy::start_copy;
use crate::delete::DeleteTask;
use crate::move_op::start_move;
use crate::progress::{RemovalUpdate, TransferUpdate};
use crate::trash_ops::{TrashAction, TrashTask};

/// The bulk operation currently owned by a controller.
#[derive(Debug)]
enum Active {
    Threaded(ThreadedTask),
    Stepped(TaskHandle),
}

impl Active {
    fn stop(&self) {
        match self {
            Self::Threaded(task) => task.stop(),
            Self::Stepped(handle) => handle.stop(),
        }
    }
}

/// Runs engine operations on behalf of a file-manager view.
///
/// At most one bulk operation (copy, move, delete or a trash action) is
/// active at a time; starting another stops the previous one. Directory
/// listings and the properties task are tracked separately, one of each at
/// a time.
///
/// Stepped work only advances when [`OperationController::tick`] is called,
/// so the owner must tick from its own loop.
pub struct OperationController {
    config: EngineConfig,
    trash: Arc<Trash>,
    scheduler: Scheduler,
    active: Option<(OperationKind, Active)>,
    loader: Option<TaskHandle>,
    properties: PropertiesWorker,
}

impl OperationController {
    pub fn new(config: EngineConfig, trash: Arc<Trash>) -> Self {
        Self {
            config,
            trash,
            scheduler: Scheduler::new(),
            active: None,
            loader: None,
            properties: PropertiesWorker::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn trash(&self) -> &Arc<Trash> {
        &self.trash
    }

    /// Kind of the most recently started bulk operation.
    pub fn active_kind(&self) -> Option<OperationKind> {
        self.active.as_ref().map(|(kind, _)| *kind)
    }

    /// Destinations that pasting `selection` into `destination` would
    /// replace. Callers confirm these before starting the paste.
    pub fn overwrite_conflicts<R>(
        &self,
        selection: &Selection<R>,
        destination: &Path,
    ) -> Vec<Conflict> {
        find_conflicts(selection.iter().map(|entry| entry.path.as_path()), destination)
    }

    /// Copy the selection into `destination` on a worker thread.
    pub fn copy<R>(
        &mut self,
        selection: &Selection<R>,
        destination: impl Into<PathBuf>,
    ) -> Result<EventReceiver<TransferUpdate>> {
        self.stop_active();
        let (task, rx) = start_copy(sources(selection), destination.into(), &self.config)?;
        self.active = Some((OperationKind::Copy, Active::Threaded(task)));
        Ok(rx)
    }

    /// Move the selection into `destination` on a worker thread.
    pub fn move_to<R>(
        &mut self,
        selection: &Selection<R>,
        destination: impl Into<PathBuf>,
    ) -> Result<EventReceiver<TransferUpdate>> {
        self.stop_active();
        let (task, rx) = start_move(sources(selection), destination.into(), &self.config)?;
        self.active = Some((OperationKind::Move, Active::Threaded(task)));
        Ok(rx)
    }

    /// Permanently delete the selection.
    pub fn delete<R: Clone + 'static>(
        &mut self,
        selection: Selection<R>,
    ) -> EventReceiver<RemovalUpdate<R>> {
        self.stop_active();
        let (task, rx) = DeleteTask::channel(selection);
        let handle = self.scheduler.spawn(Box::new(task));
        self.active = Some((OperationKind::Delete, Active::Stepped(handle)));
        rx
    }

    /// Move the selection into the trash.
    pub fn send_to_trash<R: Clone + 'static>(
        &mut self,
        selection: Selection<R>,
    ) -> EventReceiver<RemovalUpdate<R>> {
        self.trash_task(TrashAction::Send, selection)
    }

    /// Restore trashed content paths to their original locations.
    pub fn restore<R: Clone + 'static>(
        &mut self,
        selection: Selection<R>,
    ) -> EventReceiver<RemovalUpdate<R>> {
        self.trash_task(TrashAction::Restore, selection)
    }

    /// Permanently remove trashed content paths.
    pub fn purge<R: Clone + 'static>(
        &mut self,
        selection: Selection<R>,
    ) -> EventReceiver<RemovalUpdate<R>> {
        self.trash_task(TrashAction::Purge, selection)
    }

    fn trash_task<R: Clone + 'static>(
        &mut self,
        action: TrashAction,
        selection: Selection<R>,
    ) -> EventReceiver<RemovalUpdate<R>> {
        self.stop_active();
        let (task, rx) = TrashTask::channel(Arc::clone(&self.trash), action, selection);
        let handle = self.scheduler.spawn(Box::new(task));
        self.active = Some((action.kind(), Active::Stepped(handle)));
        rx
    }

    /// List `location`, which is either a directory or the virtual trash
    /// root. Any listing already in progress is stopped.
    pub fn load(&mut self, location: impl AsRef<Path>) -> EventReceiver<BatchUpdate> {
        let location = location.as_ref();
        if is_trash_root(location) {
            return self.load_trash();
        }
        self.stop_loader();
        let (loader, rx) = DirectoryLoader::channel(location, &self.config);
        self.loader = Some(self.scheduler.spawn(Box::new(loader)));
        rx
    }

    /// List every trashed entry across all trash roots.
    pub fn load_trash(&mut self) -> EventReceiver<BatchUpdate> {
        self.stop_loader();
        let (loader, rx) = TrashLoader::channel(Arc::clone(&self.trash));
        self.loader = Some(self.scheduler.spawn(Box::new(loader)));
        rx
    }

    /// Read the properties of `path` and count its size in the background.
    /// Inspecting another path stops the previous count.
    pub fn inspect(&mut self, path: impl Into<PathBuf>) -> Result<EventReceiver<PropertiesUpdate>> {
        self.properties.set_path(path)
    }

    /// Re-read mounted volumes after an attach or detach.
    pub fn refresh_volumes(&self) {
        self.trash.rebuild();
    }

    /// Advance every stepped task by one step. Returns how many are still
    /// queued.
    pub fn tick(&mut self) -> usize {
        self.scheduler.tick()
    }

    /// Whether any operation or listing still has work to do.
    pub fn is_busy(&self) -> bool {
        let threaded = matches!(
            &self.active,
            Some((_, Active::Threaded(task))) if !task.is_finished()
        );
        threaded || self.properties.is_busy() || !self.scheduler.is_idle()
    }

    /// Stop the active bulk operation, any listing and any size count.
    pub fn stop(&mut self) {
        self.stop_active();
        self.stop_loader();
        self.properties.stop();
    }

    fn stop_active(&mut self) {
        if let Some((kind, active)) = self.active.take() {
            debug!(%kind, "stopping previous operation");
            active.stop();
        }
    }

    fn stop_loader(&mut self) {
        if let Some(loader) = self.loader.take() {
            loader.stop();
        }
    }
}

fn sources<R>(selection: &Selection<R>) -> Vec<PathBuf> {
    selection.iter().map(|entry| entry.path.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::{drain, selection_from_paths, TaskEvent};
    use shelf_trash::{StaticVolumes, TRASH_URI};
    use std::fs;
    use tempfile::TempDir;

    fn controller(temp: &TempDir) -> OperationController {
        let trash =
            Trash::new(temp.path().join("Trash"), Box::new(StaticVolumes::default())).with_uid(1000);
        OperationController::new(EngineConfig::default(), Arc::new(trash))
    }

    #[test]
    fn test_new_operation_stops_previous() {
        let temp = TempDir::new().unwrap();
        for name in ["a", "b"] {
            fs::write(temp.path().join(name), "").unwrap();
        }
        let mut controller = controller(&temp);

        let mut first = controller.delete(selection_from_paths([temp.path().join("a")]));
        let mut second = controller.delete(selection_from_paths([temp.path().join("b")]));
        while controller.tick() > 0 {}

        assert_eq!(drain(&mut first).last(), Some(&TaskEvent::Stopped));
        assert_eq!(drain(&mut second).last(), Some(&TaskEvent::Finished { total: 1 }));
        assert!(temp.path().join("a").exists());
        assert!(!temp.path().join("b").exists());
        assert!(!controller.is_busy());
    }

    #[test]
    fn test_load_routes_trash_root() {
        let temp = TempDir::new().unwrap();
        let mut controller = controller(&temp);
        let file = temp.path().join("old.txt");
        fs::write(&file, "").unwrap();
        controller.trash().send(&file).unwrap();

        let mut rx = controller.load(TRASH_URI);
        while controller.tick() > 0 {}
        let batches: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                TaskEvent::Updated(batch) => Some(batch),
                _ => None,
            })
            .collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].directory, PathBuf::from(TRASH_URI));
        assert_eq!(batches[0].entries[0].name, "old.txt");
    }

    #[test]
    fn test_listing_runs_beside_bulk_operation() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("dir");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("x"), "").unwrap();
        let mut controller = controller(&temp);

        let mut removal = controller.delete(selection_from_paths([dir.join("x")]));
        let mut listing = controller.load(&dir);
        while controller.tick() > 0 {}

        assert_eq!(drain(&mut removal).last(), Some(&TaskEvent::Finished { total: 1 }));
        assert!(drain(&mut listing).last().is_some_and(TaskEvent::is_terminal));
    }

    #[test]
    fn test_inspect_runs_beside_bulk_operation() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("dir");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("keep"), "12345").unwrap();
        fs::write(temp.path().join("doomed"), "").unwrap();
        let mut controller = controller(&temp);

        let mut removal = controller.delete(selection_from_paths([temp.path().join("doomed")]));
        let mut properties = controller.inspect(&dir).unwrap();
        while controller.tick() > 0 {}

        let mut events = Vec::new();
        while let Some(event) = properties.blocking_recv() {
            let done = event.is_terminal();
            events.push(event);
            if done {
                break;
            }
        }
        assert_eq!(drain(&mut removal).last(), Some(&TaskEvent::Finished { total: 1 }));
        assert_eq!(events.last(), Some(&TaskEvent::Finished { total: 1 }));
        assert!(events.iter().any(|event| matches!(
            event,
            TaskEvent::Updated(PropertiesUpdate::Size(tally)) if tally.complete && tally.bytes == 5
        )));
    }
}
