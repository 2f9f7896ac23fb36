//! Entry properties with a stoppable recursive size count.

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use compact_str::CompactString;
use jwalk::{Parallelism, WalkDir};
use serde::Serialize;
use shelf_core::{entry_name, EventReceiver, IoResultExt, Result, TaskCore, ThreadedTask};
use tracing::debug;

/// Entries walked between two size reports.
const REPORT_EVERY: u64 = 1000;

/// What a path refers to (symlinks not followed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl EntryKind {
    fn of(metadata: &Metadata) -> Self {
        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            Self::Symlink
        } else if file_type.is_dir() {
            Self::Directory
        } else if file_type.is_file() {
            Self::File
        } else {
            Self::Other
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "File"),
            Self::Directory => write!(f, "Folder"),
            Self::Symlink => write!(f, "Link"),
            Self::Other => write!(f, "Special file"),
        }
    }
}

/// Metadata shown for a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Properties {
    pub path: PathBuf,
    pub name: CompactString,
    /// The containing directory.
    pub location: PathBuf,
    pub kind: EntryKind,
    /// Creation time, when the filesystem records one.
    pub created: Option<DateTime<Local>>,
    pub modified: Option<DateTime<Local>>,
    pub accessed: Option<DateTime<Local>>,
}

impl Properties {
    /// Read the properties of `path` itself.
    pub fn read(path: &Path) -> Result<Self> {
        let metadata = fs::symlink_metadata(path).at(path)?;
        Ok(Self::from_metadata(path, &metadata))
    }

    fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let local = |time: std::io::Result<SystemTime>| time.ok().map(DateTime::<Local>::from);
        Self {
            path: path.to_path_buf(),
            name: CompactString::from(entry_name(path).to_string_lossy()),
            location: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            kind: EntryKind::of(metadata),
            created: local(metadata.created()),
            modified: local(metadata.modified()),
            accessed: local(metadata.accessed()),
        }
    }
}

/// Running totals of a size count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SizeTally {
    /// Bytes in regular files.
    pub bytes: u64,
    /// Non-directory entries, symlinks included.
    pub files: u64,
    /// Directories below the inspected one.
    pub directories: u64,
    /// Entries that could not be read and were left out.
    pub unreadable: u64,
    /// Whether the count covers the whole tree.
    pub complete: bool,
}

impl SizeTally {
    /// Human-readable byte count, e.g. `1.5 MiB`.
    pub fn human_size(&self) -> String {
        humansize::format_size(self.bytes, humansize::BINARY)
    }

    fn entries(&self) -> u64 {
        self.files + self.directories
    }
}

/// Progress payload of a properties task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PropertiesUpdate {
    /// Sent once, before any size is known.
    Metadata(Properties),
    /// The size counted so far; the last one has `complete` set.
    Size(SizeTally),
}

/// Start reading the properties of `path` on a worker thread.
///
/// Metadata arrives first. For a directory the size is then counted
/// recursively, reported every thousand entries, and the count stops at
/// the next entry once the task is stopped. Symlinks are never followed.
pub fn start_properties(
    path: impl Into<PathBuf>,
) -> Result<(ThreadedTask, EventReceiver<PropertiesUpdate>)> {
    let path = path.into();
    let (core, rx) = TaskCore::channel();
    let fallback = path.clone();
    let task = ThreadedTask::spawn("shelf-properties", core, fallback, move |core| {
        inspect(core, &path)
    })?;
    Ok((task, rx))
}

fn inspect(core: &mut TaskCore<PropertiesUpdate>, path: &Path) -> Result<usize> {
    core.checkpoint()?;
    let metadata = fs::symlink_metadata(path).at(path)?;
    let properties = Properties::from_metadata(path, &metadata);
    core.started(None);

    let kind = properties.kind;
    core.update(PropertiesUpdate::Metadata(properties));

    if kind != EntryKind::Directory {
        let tally = SizeTally {
            bytes: if kind == EntryKind::File { metadata.len() } else { 0 },
            files: 1,
            complete: true,
            ..SizeTally::default()
        };
        core.update(PropertiesUpdate::Size(tally));
        return Ok(1);
    }

    let tally = count_size(core, path)?;
    debug!(
        path = %path.display(),
        bytes = tally.bytes,
        entries = tally.entries(),
        unreadable = tally.unreadable,
        "size counted"
    );
    Ok(usize::try_from(tally.entries()).unwrap_or(usize::MAX))
}

fn count_size(core: &TaskCore<PropertiesUpdate>, root: &Path) -> Result<SizeTally> {
    let walker = WalkDir::new(root)
        .parallelism(Parallelism::Serial)
        .skip_hidden(false)
        .follow_links(false)
        .min_depth(1);

    let mut tally = SizeTally::default();
    for entry in walker {
        core.checkpoint()?;
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(root = %root.display(), error = %err, "skipping unreadable entry");
                tally.unreadable += 1;
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            tally.directories += 1;
        } else {
            tally.files += 1;
            if file_type.is_file() {
                match entry.metadata() {
                    Ok(metadata) => tally.bytes += metadata.len(),
                    Err(_) => tally.unreadable += 1,
                }
            }
        }

        if tally.entries() % REPORT_EVERY == 0 {
            core.update(PropertiesUpdate::Size(tally));
        }
    }

    tally.complete = true;
    core.update(PropertiesUpdate::Size(tally));
    Ok(tally)
}

/// Keeps one properties task per session, restarting it whenever the
/// inspected path changes.
#[derive(Debug, Default)]
pub struct PropertiesWorker {
    current: Option<(PathBuf, ThreadedTask)>,
}

impl PropertiesWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The path currently inspected.
    pub fn path(&self) -> Option<&Path> {
        self.current.as_ref().map(|(path, _)| path.as_path())
    }

    /// Inspect `path`, stopping the task for the previous path.
    pub fn set_path(
        &mut self,
        path: impl Into<PathBuf>,
    ) -> Result<EventReceiver<PropertiesUpdate>> {
        self.stop();
        let path = path.into();
        let (task, rx) = start_properties(path.clone())?;
        self.current = Some((path, task));
        Ok(rx)
    }

    /// Whether a size count is still running.
    pub fn is_busy(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|(_, task)| !task.is_finished())
    }

    /// Stop the running task, if any.
    pub fn stop(&mut self) {
        if let Some((path, task)) = self.current.take() {
            debug!(path = %path.display(), "stopping properties task");
            task.stop();
        }
    }
}

impl Drop for PropertiesWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
