//! The event contract shared by every task.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// The kind of operation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Copy,
    Move,
    Delete,
    Trash,
    Restore,
    Purge,
    Load,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "Copy"),
            Self::Move => write!(f, "Move"),
            Self::Delete => write!(f, "Delete"),
            Self::Trash => write!(f, "Move to trash"),
            Self::Restore => write!(f, "Restore"),
            Self::Purge => write!(f, "Delete from trash"),
            Self::Load => write!(f, "Load"),
        }
    }
}

/// An event emitted by a task.
///
/// A task emits `Started` once, then any number of `PreUpdate`/`Updated`
/// events, then exactly one of `Finished`, `Failed` or `Stopped`.
/// Nothing follows the terminal event.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent<U> {
    /// The task began. `total` is the number of work units when known.
    Started { total: Option<usize> },
    /// Work on `path` is about to begin.
    PreUpdate { path: PathBuf },
    /// Task-specific progress payload.
    Updated(U),
    /// All work completed.
    Finished { total: usize },
    /// The task aborted on `path`.
    Failed { path: PathBuf, message: String },
    /// The task observed its cancellation flag and unwound.
    Stopped,
}

impl<U> TaskEvent<U> {
    /// Whether this event ends the task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Failed { .. } | Self::Stopped
        )
    }

    /// The progress payload, if this is an update.
    pub fn update(&self) -> Option<&U> {
        match self {
            Self::Updated(update) => Some(update),
            _ => None,
        }
    }
}

/// Sending half of a task's event queue. Safe to use from any thread.
pub type EventSender<U> = mpsc::UnboundedSender<TaskEvent<U>>;

/// Receiving half of a task's event queue, owned by the controller.
pub type EventReceiver<U> = mpsc::UnboundedReceiver<TaskEvent<U>>;

/// Create a new event queue.
pub fn event_channel<U>() -> (EventSender<U>, EventReceiver<U>) {
    mpsc::unbounded_channel()
}

/// Drain every event currently queued without blocking.
pub fn drain<U>(rx: &mut EventReceiver<U>) -> Vec<TaskEvent<U>> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Fraction of work done, guarding against an empty total.
pub fn fraction(completed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (completed as f64 / total as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(TaskEvent::<()>::Finished { total: 1 }.is_terminal());
        assert!(TaskEvent::<()>::Stopped.is_terminal());
        assert!(
            TaskEvent::<()>::Failed {
                path: PathBuf::from("/x"),
                message: "boom".into()
            }
            .is_terminal()
        );
        assert!(!TaskEvent::<()>::Started { total: None }.is_terminal());
        assert!(!TaskEvent::Updated(1u8).is_terminal());
    }

    #[test]
    fn test_fraction() {
        assert_eq!(fraction(0, 0), 0.0);
        assert_eq!(fraction(1, 4), 0.25);
        assert_eq!(fraction(5, 4), 1.0);
    }

    #[test]
    fn test_drain_collects_in_order() {
        let (tx, mut rx) = event_channel::<u8>();
        tx.send(TaskEvent::Started { total: Some(1) }).unwrap();
        tx.send(TaskEvent::Updated(7)).unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].update(), Some(&7));
    }
}
