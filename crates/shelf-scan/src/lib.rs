//! Incremental directory enumeration for shelf.
//!
//! Listings are produced by stepped tasks that emit one bounded batch per
//! scheduler turn, so very large directories render progressively and a
//! stop request is honoured between batches. Entry properties, including a
//! recursive size count, come from a threaded task.
//!
//! # Example
//!
//! ```rust,no_run
//! use shelf_core::{EngineConfig, Scheduler, TaskEvent};
//! use shelf_scan::DirectoryLoader;
//!
//! let (loader, mut rx) = DirectoryLoader::channel("/some/dir", &EngineConfig::default());
//! let mut scheduler = Scheduler::new();
//! scheduler.spawn(Box::new(loader));
//! scheduler.run_until_idle();
//!
//! while let Ok(event) = rx.try_recv() {
//!     if let TaskEvent::Updated(batch) = event {
//!         for entry in batch.entries {
//!             println!("{}", entry.name);
//!         }
//!     }
//! }
//! ```

mod loader;
mod progress;
mod properties;
mod trash_loader;

pub use loader::DirectoryLoader;
pub use progress::{BatchEntry, BatchUpdate};
pub use properties::{
    start_properties, EntryKind, Properties, PropertiesUpdate, PropertiesWorker, SizeTally,
};
pub use trash_loader::TrashLoader;
