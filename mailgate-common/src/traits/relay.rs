use std::sync::Arc;

use async_trait::async_trait;

use crate::message::Message;

/// Hand-off point between an SMTP session and the delivery path.
///
/// Sessions answer `250 OK` to DATA regardless of what happens here, so a
/// relay reports its outcome through logging (or by queueing the message for
/// a later attempt) rather than to the caller.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn relay(&self, message: Message);
}

#[async_trait]
impl<R: Relay + ?Sized> Relay for Arc<R> {
    async fn relay(&self, message: Message) {
        (**self).relay(message).await;
    }
}
