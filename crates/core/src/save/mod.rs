//! Drain-barrier save queue.
//!
//! Hardware callbacks push frames through a [`SaveHandle`]; a fixed pool of
//! worker threads persists them through a [`Persistence`] implementation.
//! [`SaveQueue::drain`] is the barrier callers use before they rely on the
//! data having been handled.

mod handle;
mod progress;
mod queue;
mod store;

pub use handle::{SaveEntry, SaveError, SaveHandle};
pub use queue::SaveQueue;
pub use store::{PersistError, Persistence};
