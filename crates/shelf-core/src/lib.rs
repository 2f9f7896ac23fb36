//! Core types and primitives for shelf.
//!
//! This crate provides the pieces every engine operation is built from:
//! selections, the task event contract and scheduler, configuration,
//! error types, path utilities and the adaptive byte-copy primitive.

mod config;
mod error;
mod event;
mod selection;
mod task;

pub mod paths;
pub mod transfer;

pub use config::{
    is_sandboxed, EngineConfig, EngineConfigBuilder, DEFAULT_BATCH_SIZE, DEFAULT_MIN_BLOCK_SIZE,
};
pub use error::{IoResultExt, OpError, Result};
pub use event::{drain, event_channel, fraction, EventReceiver, EventSender, OperationKind, TaskEvent};
pub use selection::{entry_name, selection_from_paths, Selection, SelectionEntry};
pub use task::{Scheduler, Step, SteppedTask, TaskCore, TaskHandle, TaskState, ThreadedTask};

// Re-exported so downstream crates share one cancellation type.
pub use tokio_util::sync::CancellationToken;
