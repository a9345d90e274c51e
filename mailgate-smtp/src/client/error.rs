//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

/// Errors that can occur when using the SMTP client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse an SMTP response from the server.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),

    /// The server answered a command with an unexpected status.
    #[error("SMTP error after {command}: {code} {message}")]
    SmtpError {
        command: String,
        code: u16,
        message: String,
    },

    /// TLS/SSL error occurred.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,
}

impl ClientError {
    /// Whether the server rejected the transaction permanently (5xx).
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 500)
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smtp_error_display_and_class() {
        let err = ClientError::SmtpError {
            command: "RCPT TO:<a@b>".to_string(),
            code: 550,
            message: "No such user".to_string(),
        };

        assert_eq!(err.to_string(), "SMTP error after RCPT TO:<a@b>: 550 No such user");
        assert!(err.is_permanent());
        assert!(!ClientError::ConnectionClosed.is_permanent());
    }
}
