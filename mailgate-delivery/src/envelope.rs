use mailgate_common::message::Message;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// What the retry queue stores for a message awaiting another attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub from: String,
    pub to: String,
    pub data: Vec<u8>,
}

impl QueuedMessage {
    /// # Errors
    /// Bincode encoding failures.
    pub fn encode(&self) -> Result<Vec<u8>, DeliveryError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(crate::error::SystemError::from)?)
    }

    /// # Errors
    /// The payload is not a bincode-encoded `QueuedMessage`.
    pub fn decode(payload: &[u8]) -> Result<Self, DeliveryError> {
        let (message, _) = bincode::serde::decode_from_slice(payload, bincode::config::standard())
            .map_err(crate::error::SystemError::from)?;
        Ok(message)
    }
}

impl From<&Message> for QueuedMessage {
    fn from(message: &Message) -> Self {
        Self {
            from: message.from.clone(),
            to: message.to.clone(),
            data: message.data.clone(),
        }
    }
}

impl From<Message> for QueuedMessage {
    fn from(message: Message) -> Self {
        Self {
            from: message.from,
            to: message.to,
            data: message.data,
        }
    }
}
