//! File operations engine for shelf.
//!
//! Bulk copy and move run on a dedicated thread per operation; delete and
//! the trash actions remove one entry per scheduler step. Every operation
//! reports through the [`shelf_core::TaskEvent`] contract, and the
//! [`OperationController`] keeps at most one of them active.

mod conflict;
mod copy;
mod delete;
mod executor;
mod move_op;
mod progress;
mod trash_ops;

pub use conflict::{find_conflicts, Conflict, ConflictKind};
pub use copy::start_copy;
pub use delete::DeleteTask;
pub use executor::OperationController;
pub use move_op::start_move;
pub use progress::{RemovalUpdate, TransferProgress, TransferUpdate};
pub use trash_ops::{TrashAction, TrashTask};
