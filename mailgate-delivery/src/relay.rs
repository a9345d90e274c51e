use std::sync::Arc;

use async_trait::async_trait;
use mailgate_common::{
    config::{Config, RelayConfig},
    internal,
    message::Message,
    traits::Relay,
    tracing,
};
use mailgate_queue::{QueueItemId, RetryQueue};

use crate::{
    envelope::QueuedMessage, error::DeliveryError, router::Router, transaction::SmtpTransaction,
};

/// Delivers captured messages to the relay chosen by the [`Router`].
///
/// With a queue attached, messages whose delivery fails for a reason other
/// than a permanent rejection are queued for the delivery processor.
pub struct SmtpRelay {
    router: Router,
    settings: RelayConfig,
    queue: Option<Arc<RetryQueue>>,
}

impl SmtpRelay {
    pub const fn new(router: Router, settings: RelayConfig, queue: Option<Arc<RetryQueue>>) -> Self {
        Self {
            router,
            settings,
            queue,
        }
    }

    pub fn from_config(config: &Config, queue: Option<Arc<RetryQueue>>) -> Self {
        Self::new(
            Router::new(&config.domain_routing, config.default_relay.clone()),
            config.relay.clone(),
            queue,
        )
    }

    pub const fn router(&self) -> &Router {
        &self.router
    }

    pub fn queue(&self) -> Option<&Arc<RetryQueue>> {
        self.queue.as_ref()
    }

    /// Make one delivery attempt to the routed relay.
    ///
    /// # Errors
    /// Whatever stopped the transaction; see [`DeliveryError`].
    pub async fn deliver(&self, message: &QueuedMessage) -> Result<(), DeliveryError> {
        let server = self.router.route(&message.to);
        internal!(
            level = DEBUG,
            "Relaying email from {} to {} via {server}",
            message.from,
            message.to
        );

        SmtpTransaction::new(
            message,
            server,
            &self.settings.helo_name,
            self.settings.accept_invalid_certs,
        )
        .execute()
        .await
    }

    /// Queue `message` for a later attempt.
    ///
    /// # Errors
    /// Encoding failures, or the queue refusing the item (e.g. when full).
    pub fn defer(&self, message: &QueuedMessage) -> Result<Option<QueueItemId>, DeliveryError> {
        let Some(queue) = &self.queue else {
            return Ok(None);
        };

        Ok(Some(queue.enqueue(message.encode()?)?))
    }
}

#[async_trait]
impl Relay for SmtpRelay {
    async fn relay(&self, message: Message) {
        let queued = QueuedMessage::from(message);

        match self.deliver(&queued).await {
            Ok(()) => internal!(
                level = INFO,
                "Successfully relayed email from {} to {}",
                queued.from,
                queued.to
            ),
            Err(err) if err.is_permanent() => internal!(
                level = ERROR,
                "Relay for {} rejected the message: {err}",
                queued.to
            ),
            Err(err) => {
                internal!(
                    level = ERROR,
                    "Failed to relay email to {}: {err}",
                    queued.to
                );

                match self.defer(&queued) {
                    Ok(Some(id)) => internal!(level = INFO, "Queued message for {} as {id}", queued.to),
                    Ok(None) => {}
                    Err(err) => internal!(
                        level = ERROR,
                        "Unable to queue message for {}: {err}",
                        queued.to
                    ),
                }
            }
        }
    }
}
