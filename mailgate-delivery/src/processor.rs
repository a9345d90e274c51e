use std::{sync::Arc, time::Duration};

use mailgate_common::{Signal, internal, tracing};
use mailgate_queue::{QueueError, QueueItem, RetryQueue};
use tokio::{
    sync::broadcast,
    time::{MissedTickBehavior, interval},
};

use crate::{envelope::QueuedMessage, relay::SmtpRelay};

/// Counts from one pass over the ready items.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSummary {
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Drains the retry queue, re-attempting delivery of every item that is due.
pub struct DeliveryProcessor {
    relay: Arc<SmtpRelay>,
    queue: Arc<RetryQueue>,
    scan_interval: Duration,
}

impl DeliveryProcessor {
    pub const fn new(relay: Arc<SmtpRelay>, queue: Arc<RetryQueue>, scan_interval: Duration) -> Self {
        Self {
            relay,
            queue,
            scan_interval,
        }
    }

    /// Attempt every item that is currently due, once.
    pub async fn process_ready(&self) -> ProcessSummary {
        let mut summary = ProcessSummary::default();

        // Items put back during this pass are due no earlier than now, so
        // only as many items as were pending at the start are attempted.
        for _ in 0..self.queue.len() {
            let item = match self.queue.dequeue() {
                Ok(item) => item,
                Err(QueueError::NoItemsReady) => break,
                Err(err) => {
                    internal!(level = ERROR, "Unable to take item from queue: {err}");
                    break;
                }
            };

            self.attempt(item, &mut summary).await;
        }

        if summary != ProcessSummary::default() {
            internal!(
                level = INFO,
                "Queue pass: {} delivered, {} retried, {} failed",
                summary.delivered,
                summary.retried,
                summary.failed
            );
        }

        summary
    }

    async fn attempt(&self, item: QueueItem, summary: &mut ProcessSummary) {
        let id = item.id;

        let result = match QueuedMessage::decode(&item.payload) {
            Ok(message) => self.relay.deliver(&message).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                internal!(level = INFO, "Delivered queued item {id}");
                summary.delivered += 1;
            }
            Err(err) if err.is_permanent() => {
                internal!(level = WARN, "Queued item {id} was rejected: {err}");
                self.queue.fail(item, err.to_string());
                summary.failed += 1;
            }
            Err(err) => match self.queue.retry_with_error(item, err.to_string()) {
                Ok(()) => {
                    tracing::debug!(%id, "Delivery attempt failed, will retry: {err}");
                    summary.retried += 1;
                }
                Err(_) => summary.failed += 1,
            },
        }
    }

    /// Run a pass every `scan_interval` until `shutdown` fires.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) {
        let mut ticker = interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        internal!(
            level = INFO,
            "Delivery processor started, scanning every {:?}",
            self.scan_interval
        );

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if let Err(err) = sig {
                        tracing::debug!("Delivery shutdown channel closed: {err}");
                    }
                    break;
                }
                _ = ticker.tick() => {
                    self.process_ready().await;
                }
            }
        }

        internal!(level = INFO, "Delivery processor stopped");
    }
}
