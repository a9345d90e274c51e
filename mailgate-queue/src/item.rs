use core::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};
use std::time::SystemTime;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// Identifier of a queued item.
///
/// A ULID from a monotonic generator, so ids sort by creation time and stay
/// unique within the same millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueItemId(Ulid);

impl QueueItemId {
    pub const fn new(id: Ulid) -> Self {
        Self(id)
    }

    /// Milliseconds since the Unix epoch at which the id was generated.
    pub const fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl Display for QueueItemId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

impl FromStr for QueueItemId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

impl Serialize for QueueItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for QueueItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A unit of work waiting for (another) delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    /// Opaque to the queue.
    pub payload: Vec<u8>,
    pub attempts: u32,
    pub next_retry: SystemTime,
    pub created_at: SystemTime,
}

impl QueueItem {
    pub(crate) fn new(id: QueueItemId, payload: Vec<u8>, now: SystemTime) -> Self {
        Self {
            id,
            payload,
            attempts: 0,
            next_retry: now,
            created_at: now,
        }
    }

    /// Whether the item may be handed out at `now`.
    pub fn is_due(&self, now: SystemTime) -> bool {
        self.next_retry <= now
    }
}

/// An item that used up its retries, with the reason it was given up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub item: QueueItem,
    pub error: String,
    pub failed_at: SystemTime,
    /// Attempts made when the item was moved here.
    pub retries: u32,
}
