//! Onward delivery for captured messages.
//!
//! [`SmtpRelay`] picks the downstream relay with the [`Router`] and replays the
//! envelope over SMTP. When a retry queue is attached, failed attempts are
//! queued and the [`DeliveryProcessor`] works through them on a timer.

pub mod envelope;
pub mod error;
pub mod processor;
pub mod relay;
pub mod router;
pub mod transaction;

pub use envelope::QueuedMessage;
pub use error::{DeliveryError, PermanentError, SystemError, TemporaryError};
pub use processor::{DeliveryProcessor, ProcessSummary};
pub use relay::SmtpRelay;
pub use router::Router;
pub use transaction::SmtpTransaction;
