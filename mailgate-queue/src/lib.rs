//! Durable retry queue.
//!
//! Pending items and the failed ledger live in memory and are rewritten to
//! `items.dat` and `failed_items.dat` on a timer; see [`RetryQueue::serve`].

pub mod error;
pub mod item;
mod queue;

pub use error::QueueError;
pub use item::{FailedItem, QueueItem, QueueItemId};
pub use queue::RetryQueue;
