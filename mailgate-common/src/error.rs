//! Error types shared across the mailgate crates.
//!
//! Protocol- and storage-specific errors live next to the code that raises
//! them; this module holds the ones more than one crate needs to name.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors raised while validating a loaded configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required configuration field is missing or empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A configuration value is invalid.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// An encrypted listener is configured without certificate material.
    #[error("tls_cert_file and tls_key_file are required for encrypted listener on port {0}")]
    MissingTlsMaterial(u16),

    /// A configured file does not exist.
    #[error("Unable to find {what} {}", path.display())]
    FileNotFound { what: &'static str, path: PathBuf },
}

/// Errors that end a single SMTP session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The peer address of the connection could not be resolved.
    #[error("Unable to resolve remote address")]
    UnresolvedPeer,

    /// The connection was refused by admission policy.
    #[error("Connection rejected: {0}")]
    Rejected(&'static str),

    /// Protocol error occurred during session.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The TLS handshake with the client failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// Connection error occurred.
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),
}

impl SessionError {
    /// Returns `true` if the session ended because of admission policy rather
    /// than a fault.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::UnresolvedPeer)
    }
}

/// Errors raised while installing the global log subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The rolling log file could not be created.
    #[error("Unable to open log file: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    /// A global subscriber was already installed.
    #[error("Unable to install log subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingField("default_relay");
        assert_eq!(err.to_string(), "Missing required field: default_relay");

        let err = ConfigError::InvalidConfiguration {
            field: "rate_limiting.burst_limit".to_string(),
            reason: "cannot be greater than requests_per_minute".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration for rate_limiting.burst_limit: cannot be greater than requests_per_minute"
        );

        let err = ConfigError::FileNotFound {
            what: "TLS Certificate",
            path: PathBuf::from("/tmp/cert.pem"),
        };
        assert_eq!(err.to_string(), "Unable to find TLS Certificate /tmp/cert.pem");
    }

    #[test]
    fn test_session_error_classification() {
        assert!(SessionError::Rejected("blocked").is_rejection());
        assert!(SessionError::UnresolvedPeer.is_rejection());
        assert!(!SessionError::Protocol("bad".to_string()).is_rejection());
        assert!(
            !SessionError::Connection(io::Error::from(io::ErrorKind::UnexpectedEof))
                .is_rejection()
        );
    }
}
