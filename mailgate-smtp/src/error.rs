//! Error types for the mailgate SMTP server.
//!
//! Covers the line transport, TLS material and handshakes, and the listener
//! lifecycle. Session-level failures use [`mailgate_common::error::SessionError`].

use std::io;

use mailgate_common::error::SessionError;
use thiserror::Error;

/// Errors that can occur during connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// I/O error during connection operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connection was closed by peer.
    #[error("Connection closed by peer")]
    Closed,

    /// The peer sent more than the given number of bytes without a line
    /// terminator.
    #[error("Line exceeds {0} bytes")]
    LineTooLong(usize),
}

/// Errors that can occur during TLS operations.
#[derive(Debug, Error)]
pub enum TlsError {
    /// I/O error during TLS operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to load TLS certificate.
    #[error("Failed to load TLS certificate from {path}: {reason}")]
    CertificateLoad { path: String, reason: String },

    /// Failed to load TLS private key.
    #[error("Failed to load TLS private key from {path}: {reason}")]
    KeyLoad { path: String, reason: String },

    /// TLS handshake or upgrade failed.
    #[error("TLS upgrade failed: {0}")]
    UpgradeFailed(String),

    /// Rustls library error.
    #[error("TLS error: {0}")]
    Rustls(String),
}

impl From<tokio_rustls::rustls::Error> for TlsError {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::Rustls(err.to_string())
    }
}

impl From<ConnectionError> for SessionError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Io(err) => Self::Connection(err),
            ConnectionError::Closed => {
                Self::Connection(io::Error::from(io::ErrorKind::UnexpectedEof))
            }
            err @ ConnectionError::LineTooLong(_) => Self::Protocol(err.to_string()),
        }
    }
}

impl From<TlsError> for SessionError {
    fn from(err: TlsError) -> Self {
        Self::Handshake(err.to_string())
    }
}

/// Errors raised by the server lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Server is already running")]
    AlreadyRunning,

    #[error("No listeners configured")]
    NoListeners,

    /// Binding a listener failed; every listener opened by the same start
    /// has been closed again.
    #[error("Failed to listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// An encrypted listener is configured without certificate paths.
    #[error("TLS material is required for encrypted listener {0}")]
    MissingTlsMaterial(String),

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Specialized `Result` type for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Specialized `Result` type for TLS operations.
pub type TlsResult<T> = std::result::Result<T, TlsError>;
