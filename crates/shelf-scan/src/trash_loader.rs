//! Enumeration of the virtual trash view.

use std::path::PathBuf;
use std::sync::Arc;

use compact_str::CompactString;
use shelf_core::{
    EventReceiver, EventSender, OpError, Step, SteppedTask, TaskCore, TaskHandle, TaskState,
};
use shelf_trash::{Trash, TRASH_URI};
use tracing::info;

use crate::progress::{BatchEntry, BatchUpdate};

/// Lists every trashed entry, one per step, named after its original file.
pub struct TrashLoader {
    core: TaskCore<BatchUpdate>,
    trash: Arc<Trash>,
    items: Vec<PathBuf>,
    index: usize,
}

impl TrashLoader {
    pub fn new(trash: Arc<Trash>, tx: EventSender<BatchUpdate>) -> Self {
        Self {
            core: TaskCore::new(tx),
            trash,
            items: Vec::new(),
            index: 0,
        }
    }

    /// A loader together with the receiving end of its events.
    pub fn channel(trash: Arc<Trash>) -> (Self, EventReceiver<BatchUpdate>) {
        let (tx, rx) = shelf_core::event_channel();
        (Self::new(trash, tx), rx)
    }

    fn fail(&mut self, err: OpError) -> Step {
        self.core.fail(&err, &PathBuf::from(TRASH_URI));
        Step::Done
    }
}

impl SteppedTask for TrashLoader {
    fn start(&mut self) -> Step {
        match self.trash.list() {
            Ok(items) => {
                self.items = items;
                info!(count = self.items.len(), "listing trash");
                self.core.started(Some(self.items.len()));
                Step::Continue
            }
            Err(err) => self.fail(err.into()),
        }
    }

    fn step(&mut self) -> Step {
        if self.core.checkpoint().is_err() {
            self.core.stopped();
            return Step::Done;
        }

        let total = self.items.len();
        let Some(content) = self.items.get(self.index) else {
            self.core.finish(total);
            return Step::Done;
        };

        let entry = match self.trash.describe(content) {
            Ok(entry) => entry,
            Err(err) => return self.fail(err.into()),
        };
        self.index += 1;

        let is_dir = std::fs::symlink_metadata(&entry.path).is_ok_and(|m| m.is_dir());
        self.core.update(BatchUpdate {
            directory: PathBuf::from(TRASH_URI),
            entries: vec![BatchEntry {
                name: CompactString::from(entry.display_name()),
                path: entry.path,
                is_dir,
            }],
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

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::{drain, Scheduler, TaskEvent};
    use shelf_trash::StaticVolumes;
    use tempfile::TempDir;

    #[test]
    fn test_lists_original_names_one_per_step() {
        let temp = TempDir::new().unwrap();
        let trash = Arc::new(
            Trash::new(temp.path().join("Trash"), Box::new(StaticVolumes::default())).with_uid(1000),
        );
        let file = temp.path().join("photo.jpg");
        for _ in 0..2 {
            std::fs::write(&file, "x").unwrap();
            trash.send(&file).unwrap();
        }

        let (loader, mut rx) = TrashLoader::channel(trash);
        let mut scheduler = Scheduler::new();
        scheduler.spawn(Box::new(loader));
        scheduler.run_until_idle();

        let events = drain(&mut rx);
        assert_eq!(events[0], TaskEvent::Started { total: Some(2) });
        let batches: Vec<_> = events.iter().filter_map(TaskEvent::update).collect();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.entries.len() == 1));
        assert!(batches.iter().all(|b| b.entries[0].name == "photo.jpg"));
        assert_eq!(batches[1].entries[0].path.file_name().unwrap(), "photo.jpg.1");
        assert_eq!(batches[1].completed, 2);
        assert_eq!(events.last(), Some(&TaskEvent::Finished { total: 2 }));
    }
}
