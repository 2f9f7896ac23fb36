//! Batched directory listing as a stepped task.

use std::fs;
use std::path::{Path, PathBuf};

use compact_str::CompactString;
use shelf_core::{
    EngineConfig, EventReceiver, EventSender, IoResultExt, Result, Step, SteppedTask, TaskCore,
    TaskHandle, TaskState,
};
use tracing::info;

use crate::progress::{BatchEntry, BatchUpdate};

/// A child read from the directory, before filtering.
#[derive(Debug, Clone)]
struct Child {
    name: CompactString,
    is_dir: bool,
}

/// Lists a directory's immediate children a fixed-size batch per step.
#[derive(Debug)]
pub struct DirectoryLoader {
    core: TaskCore<BatchUpdate>,
    directory: PathBuf,
    config: EngineConfig,
    children: Vec<Child>,
    index: usize,
}

impl DirectoryLoader {
    /// A loader for `directory` posting to `tx`.
    pub fn new(directory: impl Into<PathBuf>, config: &EngineConfig, tx: EventSender<BatchUpdate>) -> Self {
        Self {
            core: TaskCore::new(tx),
            directory: directory.into(),
            config: config.clone(),
            children: Vec::new(),
            index: 0,
        }
    }

    /// A loader together with the receiving end of its events.
    pub fn channel(
        directory: impl Into<PathBuf>,
        config: &EngineConfig,
    ) -> (Self, EventReceiver<BatchUpdate>) {
        let (tx, rx) = shelf_core::event_channel();
        (Self::new(directory, config, tx), rx)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn read_children(&self) -> Result<Vec<Child>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(&self.directory).at(&self.directory)? {
            let entry = entry.at(&self.directory)?;
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            children.push(Child {
                name: CompactString::from(entry.file_name().to_string_lossy()),
                is_dir,
            });
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }
}

impl SteppedTask for DirectoryLoader {
    fn start(&mut self) -> Step {
        match self.read_children() {
            Ok(children) => {
                self.children = children;
                info!(directory = %self.directory.display(), count = self.children.len(), "listing directory");
                self.core.started(Some(self.children.len()));
                Step::Continue
            }
            Err(err) => {
                let directory = self.directory.clone();
                self.core.fail(&err, &directory);
                Step::Done
            }
        }
    }

    fn step(&mut self) -> Step {
        if self.core.checkpoint().is_err() {
            self.core.stopped();
            return Step::Done;
        }

        let total = self.children.len();
        if self.index >= total {
            self.core.finish(total);
            return Step::Done;
        }

        let end = (self.index + self.config.batch_size.max(1)).min(total);
        let entries = self.children[self.index..end]
            .iter()
            .filter(|child| !self.config.should_skip_hidden(&child.name))
            .map(|child| BatchEntry {
                path: self.directory.join(child.name.as_str()),
                name: child.name.clone(),
                is_dir: child.is_dir,
            })
            .collect();
        self.index = end;

        self.core.update(BatchUpdate {
            directory: self.directory.clone(),
            entries,
            completed: end,
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
