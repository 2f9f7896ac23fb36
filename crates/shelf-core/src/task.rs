//! Task abstraction: lifecycle state, stepped tasks and threaded tasks.
//!
//! Two execution strategies share one event contract:
//!
//! - A [`SteppedTask`] performs one bounded increment per [`Scheduler::tick`]
//!   on the controller's own thread, so cancellation is observed within
//!   one step.
//! - A [`ThreadedTask`] runs a whole transfer on a dedicated OS thread and
//!   only communicates by posting [`TaskEvent`]s to the controller's queue.
//!
//! Both drive a [`TaskCore`], which guarantees that `Started` comes first and
//! that exactly one terminal event is sent.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{OpError, Result};
use crate::event::{event_channel, EventReceiver, EventSender, TaskEvent};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Stopped,
    Finished,
    Failed,
}

impl TaskState {
    /// Whether the task has emitted its terminal event.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Finished | Self::Failed)
    }
}

/// Cloneable handle used to stop a task from the controller.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    cancel: CancellationToken,
}

impl TaskHandle {
    /// Request cancellation. The task observes it at its next checkpoint.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The underlying cancellation flag.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Lifecycle bookkeeping and event emission for a single task.
#[derive(Debug)]
pub struct TaskCore<U> {
    state: TaskState,
    tx: EventSender<U>,
    handle: TaskHandle,
}

impl<U> TaskCore<U> {
    /// Create a core posting to `tx`.
    pub fn new(tx: EventSender<U>) -> Self {
        Self {
            state: TaskState::Idle,
            tx,
            handle: TaskHandle::default(),
        }
    }

    /// Create a core together with the receiving end of its queue.
    pub fn channel() -> (Self, EventReceiver<U>) {
        let (tx, rx) = event_channel();
        (Self::new(tx), rx)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// A handle that can stop this task.
    pub fn handle(&self) -> TaskHandle {
        self.handle.clone()
    }

    /// The cancellation flag checked at checkpoints.
    pub fn token(&self) -> &CancellationToken {
        self.handle.token()
    }

    /// Return `Err(OpError::Cancelled)` if a stop was requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.handle.is_stopped() {
            Err(OpError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Emit `Started` and enter the running state.
    pub fn started(&mut self, total: Option<usize>) {
        if self.state != TaskState::Idle {
            return;
        }
        self.state = TaskState::Running;
        self.send(TaskEvent::Started { total });
    }

    /// Announce work on `path`.
    pub fn pre_update(&self, path: impl Into<PathBuf>) {
        if self.state == TaskState::Running {
            self.send(TaskEvent::PreUpdate { path: path.into() });
        }
    }

    /// Emit a progress payload.
    pub fn update(&self, update: U) {
        if self.state == TaskState::Running {
            self.send(TaskEvent::Updated(update));
        }
    }

    /// Emit `Finished`.
    pub fn finish(&mut self, total: usize) {
        if self.enter_terminal(TaskState::Finished) {
            self.send(TaskEvent::Finished { total });
        }
    }

    /// Emit `Stopped`.
    pub fn stopped(&mut self) {
        if self.enter_terminal(TaskState::Stopped) {
            self.send(TaskEvent::Stopped);
        }
    }

    /// Emit `Failed`, blaming the error's path or `fallback`.
    pub fn fail(&mut self, error: &OpError, fallback: &Path) {
        if self.enter_terminal(TaskState::Failed) {
            let path = error.path().unwrap_or(fallback).to_path_buf();
            debug!(path = %path.display(), %error, "task failed");
            self.send(TaskEvent::Failed {
                path,
                message: error.to_string(),
            });
        }
    }

    /// Emit the terminal event matching `result`.
    ///
    /// Cancellation always maps to `Stopped`, never to `Failed`.
    pub fn conclude(&mut self, result: Result<usize>, fallback: &Path) {
        match result {
            Ok(total) => self.finish(total),
            Err(OpError::Cancelled) => self.stopped(),
            Err(error) => self.fail(&error, fallback),
        }
    }

    fn enter_terminal(&mut self, next: TaskState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if self.state == TaskState::Idle {
            // Honour the contract even for tasks that end before they begin.
            self.started(None);
        }
        self.state = next;
        true
    }

    fn send(&self, event: TaskEvent<U>) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

/// Outcome of one scheduler turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Re-queue the task for another turn.
    Continue,
    /// The task emitted its terminal event.
    Done,
}

/// A unit of work re-invoked in small increments by a [`Scheduler`].
pub trait SteppedTask {
    /// Emit `Started` and prepare the work list.
    fn start(&mut self) -> Step;

    /// Perform one bounded increment.
    fn step(&mut self) -> Step;

    /// Current lifecycle state.
    fn state(&self) -> TaskState;

    /// A handle that can stop this task.
    fn handle(&self) -> TaskHandle;

    /// Request cancellation; observed by the next [`SteppedTask::step`].
    fn stop(&mut self) {
        self.handle().stop();
    }
}

/// Single-threaded cooperative scheduler for stepped tasks.
///
/// Steps never overlap, so stepped tasks need no locking.
#[derive(Default)]
pub struct Scheduler {
    queue: VecDeque<Box<dyn SteppedTask>>,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `task` and queue it if it has more work.
    pub fn spawn(&mut self, mut task: Box<dyn SteppedTask>) -> TaskHandle {
        let handle = task.handle();
        if task.start() == Step::Continue {
            self.queue.push_back(task);
        }
        handle
    }

    /// Run one step of every queued task. Returns the number still queued.
    pub fn tick(&mut self) -> usize {
        for _ in 0..self.queue.len() {
            let Some(mut task) = self.queue.pop_front() else {
                break;
            };
            if task.step() == Step::Continue {
                self.queue.push_back(task);
            }
        }
        self.queue.len()
    }

    /// Tick until no task is left.
    pub fn run_until_idle(&mut self) {
        while self.tick() > 0 {}
    }

    /// Whether no task is queued.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// A task running on its own OS thread.
#[derive(Debug)]
pub struct ThreadedTask {
    handle: TaskHandle,
    thread: Option<JoinHandle<()>>,
}

impl ThreadedTask {
    /// Run `work` on a dedicated thread.
    ///
    /// `work` returns the finished unit count; the core turns the result into
    /// the terminal event. `fallback` is blamed when an error has no path,
    /// and when `work` panics.
    pub fn spawn<U, F>(name: &str, mut core: TaskCore<U>, fallback: PathBuf, work: F) -> Result<Self>
    where
        U: Send + 'static,
        F: FnOnce(&mut TaskCore<U>) -> Result<usize> + Send + 'static,
    {
        let handle = core.handle();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| work(&mut core)))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        warn!(path = %fallback.display(), %message, "worker panicked");
                        Err(OpError::Panicked {
                            path: fallback.clone(),
                            message,
                        })
                    });
                core.conclude(result, &fallback);
            })
            .map_err(|e| OpError::io(PathBuf::from(name), e))?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Request cancellation.
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// A cloneable handle that can stop this task.
    pub fn handle(&self) -> TaskHandle {
        self.handle.clone()
    }

    /// Whether the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Wait for the worker thread to exit.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
