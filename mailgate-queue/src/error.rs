//! Error types for the retry queue.

use std::io;

use thiserror::Error;

use crate::item::QueueItemId;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The pending collection has reached `max_queue_size`.
    #[error("queue is full")]
    Full,

    /// No pending item is due yet.
    #[error("no items ready for processing")]
    NoItemsReady,

    /// The item used up its retries and was moved to the failed ledger.
    #[error("max retries exceeded")]
    MaxRetriesExceeded,

    #[error("failed item with ID {0} not found")]
    NotFound(QueueItemId),

    /// The id generator ran out of ids for the current millisecond.
    #[error("Unable to allocate an item id: {0}")]
    Id(#[from] ulid::MonotonicError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

impl QueueError {
    /// Whether the caller can simply try again later.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Full | Self::NoItemsReady | Self::Id(_))
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
