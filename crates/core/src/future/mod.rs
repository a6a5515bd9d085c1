//! Futures with progress, cooperative cancellation, and the runner that
//! executes work behind them.
//!
//! Every long operation in the crate (an acquisition, a stage move, a whole
//! milling run) is represented by a [`ProgressiveFuture`]. Work is started by a
//! [`TaskRunner`] on its own thread and sees its future only through a
//! [`TaskContext`].

mod control;
mod poll;
mod progressive;
mod runner;
mod types;

pub use control::RunControl;
pub use poll::{poll_until, PollOutcome, PollSettings};
pub use progressive::{Cancellable, CancelHook, ProgressObserver, ProgressiveFuture};
pub use runner::{TaskContext, TaskRunner};
pub use types::{add_duration, FutureState, ProgressUpdate, StateError, TaskError};
