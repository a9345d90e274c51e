use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use mailgate_common::{Signal, config::QueueConfig, internal, tracing};
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::broadcast,
    time::{MissedTickBehavior, interval},
};
use ulid::Generator;

use crate::{
    error::{QueueError, Result},
    item::{FailedItem, QueueItem, QueueItemId},
};

const ITEMS_FILE: &str = "items.dat";
const FAILED_ITEMS_FILE: &str = "failed_items.dat";

struct QueueState {
    items: Vec<QueueItem>,
    failed: Vec<FailedItem>,
    ids: Generator,
}

/// A bounded, disk-backed queue of work awaiting another attempt.
///
/// Every operation, persistence included, runs under one lock. Items are in
/// exactly one of the pending collection or the failed ledger.
pub struct RetryQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
}

impl core::fmt::Debug for RetryQueue {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        fmt.debug_struct("RetryQueue")
            .field("storage_path", &self.config.storage_path)
            .field("pending", &state.items.len())
            .field("failed", &state.failed.len())
            .finish()
    }
}

impl RetryQueue {
    /// Open the queue stored under `config.storage_path`, creating the
    /// directory if needed and loading whatever was last persisted.
    ///
    /// # Errors
    /// The directory cannot be created, or an existing file cannot be read
    /// or decoded.
    pub fn open(config: QueueConfig) -> Result<Self> {
        fs::create_dir_all(&config.storage_path)?;

        let items: Vec<QueueItem> = load(&config.storage_path.join(ITEMS_FILE))?;
        let failed: Vec<FailedItem> = load(&config.storage_path.join(FAILED_ITEMS_FILE))?;

        internal!(
            level = INFO,
            "Opened retry queue at {} with {} pending and {} failed item(s)",
            config.storage_path.display(),
            items.len(),
            failed.len()
        );

        Ok(Self {
            config,
            state: Mutex::new(QueueState {
                items,
                failed,
                ids: Generator::new(),
            }),
        })
    }

    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Append a new item, due immediately.
    ///
    /// # Errors
    /// [`QueueError::Full`] when `max_queue_size` items are pending.
    pub fn enqueue(&self, payload: Vec<u8>) -> Result<QueueItemId> {
        let mut state = self.state.lock();

        if state.items.len() >= self.config.max_queue_size {
            return Err(QueueError::Full);
        }

        let id = QueueItemId::new(state.ids.generate()?);
        state
            .items
            .push(QueueItem::new(id, payload, SystemTime::now()));

        tracing::debug!(%id, pending = state.items.len(), "Enqueued item");
        Ok(id)
    }

    /// Remove and return the first pending item, in scan order, that is due.
    ///
    /// # Errors
    /// [`QueueError::NoItemsReady`] when nothing is due.
    pub fn dequeue(&self) -> Result<QueueItem> {
        let now = SystemTime::now();
        let mut state = self.state.lock();

        let position = state
            .items
            .iter()
            .position(|item| item.is_due(now))
            .ok_or(QueueError::NoItemsReady)?;

        Ok(state.items.remove(position))
    }

    /// Put an item back after a failed attempt.
    ///
    /// # Errors
    /// [`QueueError::MaxRetriesExceeded`] when the item already had
    /// `max_retries` attempts; it is then in the failed ledger.
    pub fn retry(&self, item: QueueItem) -> Result<()> {
        self.retry_with_error(item, QueueError::MaxRetriesExceeded.to_string())
    }

    /// As [`Self::retry`], recording `error` in the failed ledger if the item
    /// is given up on.
    ///
    /// # Errors
    /// [`QueueError::MaxRetriesExceeded`] when the item has no retries left.
    pub fn retry_with_error(&self, mut item: QueueItem, error: impl Into<String>) -> Result<()> {
        let now = SystemTime::now();
        let mut state = self.state.lock();

        if item.attempts >= self.config.max_retries {
            let error = error.into();
            internal!(
                level = WARN,
                "Item {} failed after {} attempt(s): {error}",
                item.id,
                item.attempts
            );

            state.failed.push(FailedItem {
                retries: item.attempts,
                item,
                error,
                failed_at: now,
            });
            return Err(QueueError::MaxRetriesExceeded);
        }

        item.attempts += 1;
        item.next_retry = now + self.config.retry_interval;
        state.items.push(item);

        Ok(())
    }

    /// Move an item straight to the failed ledger, whatever its attempts.
    pub fn fail(&self, item: QueueItem, error: impl Into<String>) {
        let error = error.into();
        internal!(level = WARN, "Item {} failed permanently: {error}", item.id);

        self.state.lock().failed.push(FailedItem {
            retries: item.attempts,
            item,
            error,
            failed_at: SystemTime::now(),
        });
    }

    pub fn failed_items(&self) -> Vec<FailedItem> {
        self.state.lock().failed.clone()
    }

    pub fn clear_failed_items(&self) {
        self.state.lock().failed.clear();
    }

    /// Move a failed item back to pending with its attempts reset, due now.
    ///
    /// # Errors
    /// [`QueueError::NotFound`] when no failed item has this id.
    pub fn requeue_failed_item(&self, id: QueueItemId) -> Result<()> {
        let mut state = self.state.lock();

        let position = state
            .failed
            .iter()
            .position(|failed| failed.item.id == id)
            .ok_or(QueueError::NotFound(id))?;

        let mut item = state.failed.remove(position).item;
        item.attempts = 0;
        item.next_retry = SystemTime::now();
        state.items.push(item);

        Ok(())
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// A snapshot of the pending items in scan order.
    pub fn pending_items(&self) -> Vec<QueueItem> {
        self.state.lock().items.clone()
    }

    /// Rewrite both files from the in-memory state.
    ///
    /// The lock is held while encoding and writing, so the files always
    /// reflect a single consistent state.
    ///
    /// # Errors
    /// Encoding or file system failures.
    pub fn persist(&self) -> Result<()> {
        let state = self.state.lock();

        fs::create_dir_all(&self.config.storage_path)?;
        store(&self.config.storage_path, ITEMS_FILE, &state.items)?;
        store(&self.config.storage_path, FAILED_ITEMS_FILE, &state.failed)?;

        tracing::debug!(
            pending = state.items.len(),
            failed = state.failed.len(),
            "Persisted retry queue"
        );
        Ok(())
    }

    /// Persist every `persist_interval` until `shutdown` fires, then once more.
    pub async fn serve(self: Arc<Self>, mut shutdown: broadcast::Receiver<Signal>) {
        let mut ticker = interval(self.config.persist_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if let Err(err) = sig {
                        tracing::debug!("Queue shutdown channel closed: {err}");
                    }
                    break;
                }
                _ = ticker.tick() => persist_in_background(&self).await,
            }
        }

        persist_in_background(&self).await;
        internal!(level = INFO, "Retry queue persisted and stopped");
    }
}

async fn persist_in_background(queue: &Arc<RetryQueue>) {
    let queue = Arc::clone(queue);

    match tokio::task::spawn_blocking(move || queue.persist()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => internal!(level = ERROR, "Failed to persist retry queue: {err}"),
        Err(err) => internal!(level = ERROR, "Retry queue persistence task failed: {err}"),
    }
}

fn load<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read(path) {
        Ok(bytes) => {
            let (value, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
            Ok(value)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(err.into()),
    }
}

/// Write through a temporary file and rename it into place.
fn store<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())?;

    let path = dir.join(name);
    let temp: PathBuf = dir.join(format!(".tmp_{name}"));

    fs::write(&temp, bytes)?;
    fs::rename(&temp, &path)?;

    Ok(())
}
