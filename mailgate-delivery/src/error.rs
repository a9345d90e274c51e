//! Typed errors for delivery attempts.
//!
//! Failures are split the way a retry decision needs them: permanent (5xx, do
//! not try again), temporary (4xx and network trouble) and system errors.

use mailgate_queue::QueueError;
use mailgate_smtp::client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    #[error("System error: {0}")]
    System(#[from] SystemError),
}

#[derive(Debug, Error)]
pub enum PermanentError {
    /// The relay answered with a 5xx status.
    #[error("Message rejected: {0}")]
    MessageRejected(String),
}

#[derive(Debug, Error)]
pub enum TemporaryError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The greeting was not positive.
    #[error("Server busy: {0}")]
    ServerBusy(String),

    /// The relay answered with a 4xx status.
    #[error("Temporary SMTP error: {0}")]
    SmtpTemporary(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),
}

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Unable to encode queued message: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Unable to decode queued message: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }
}

impl From<QueueError> for DeliveryError {
    fn from(error: QueueError) -> Self {
        Self::System(SystemError::Queue(error))
    }
}

/// 4xx replies and network trouble are temporary, 5xx replies permanent,
/// anything else a system error.
impl From<ClientError> for DeliveryError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::SmtpError {
                command,
                code,
                message,
            } if (400..500).contains(&code) => Self::Temporary(TemporaryError::SmtpTemporary(
                format!("{command}: {code} {message}"),
            )),

            ClientError::SmtpError {
                command,
                code,
                message,
            } if (500..600).contains(&code) => Self::Permanent(PermanentError::MessageRejected(
                format!("{command}: {code} {message}"),
            )),

            ClientError::SmtpError {
                command,
                code,
                message,
            } => Self::System(SystemError::Internal(format!(
                "Unexpected SMTP response to {command}: {code} {message}"
            ))),

            ClientError::Io(e) => {
                Self::Temporary(TemporaryError::ConnectionFailed(format!("I/O error: {e}")))
            }

            ClientError::ConnectionClosed => Self::Temporary(TemporaryError::ConnectionFailed(
                "Connection closed unexpectedly".to_string(),
            )),

            ClientError::TlsError(msg) => Self::Temporary(TemporaryError::TlsHandshakeFailed(msg)),

            ClientError::ParseError(msg) => Self::System(SystemError::Internal(format!(
                "SMTP protocol parse error: {msg}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp(code: u16) -> ClientError {
        ClientError::SmtpError {
            command: "RCPT TO:<a@b>".to_string(),
            code,
            message: "reason".to_string(),
        }
    }

    #[test]
    fn smtp_codes_are_classified() {
        assert!(DeliveryError::from(smtp(451)).is_temporary());
        assert!(DeliveryError::from(smtp(550)).is_permanent());
        assert!(DeliveryError::from(smtp(250)).is_system());
    }

    #[test]
    fn network_errors_are_temporary() {
        assert!(DeliveryError::from(ClientError::ConnectionClosed).is_temporary());
        assert!(
            DeliveryError::from(ClientError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused
            )))
            .is_temporary()
        );
        assert!(DeliveryError::from(ClientError::ParseError("bad".to_string())).is_system());
    }

    #[test]
    fn message_names_the_command() {
        let err = DeliveryError::from(smtp(550));
        assert_eq!(
            err.to_string(),
            "Permanent failure: Message rejected: RCPT TO:<a@b>: 550 reason"
        );
    }
}
