use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Settings for the durable retry queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Directory holding `items.dat` and `failed_items.dat`.
    pub storage_path: PathBuf,

    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts, e.g. `"5m"`.
    #[serde(default = "defaults::retry_interval", with = "humantime_serde")]
    pub retry_interval: Duration,

    /// How often the queue is written to disk, e.g. `"30s"`.
    #[serde(default = "defaults::persist_interval", with = "humantime_serde")]
    pub persist_interval: Duration,

    #[serde(default = "defaults::max_queue_size")]
    pub max_queue_size: usize,
}

impl QueueConfig {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            max_retries: defaults::max_retries(),
            retry_interval: defaults::retry_interval(),
            persist_interval: defaults::persist_interval(),
            max_queue_size: defaults::max_queue_size(),
        }
    }
}

mod defaults {
    use std::time::Duration;

    pub const fn max_retries() -> u32 {
        5
    }

    pub const fn retry_interval() -> Duration {
        Duration::from_secs(5 * 60)
    }

    pub const fn persist_interval() -> Duration {
        Duration::from_secs(30)
    }

    pub const fn max_queue_size() -> usize {
        1000
    }
}
