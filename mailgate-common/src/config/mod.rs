//! Configuration types for the mailgate relay.
//!
//! The binary crate locates and parses the configuration document; this module
//! only describes its shape and checks that it is coherent.

pub mod listener;
pub mod queue;
pub mod rate_limit;
pub mod relay;

use std::path::PathBuf;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::metadata::LevelFilter;

pub use self::{
    listener::{Encryption, ListenerSpec},
    queue::QueueConfig,
    rate_limit::RateLimitConfig,
    relay::RelayConfig,
};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[serde(alias = "TRACE")]
    Trace,
    #[serde(alias = "DEBUG")]
    Debug,
    #[default]
    #[serde(alias = "INFO")]
    Info,
    #[serde(alias = "WARN")]
    Warn,
    #[serde(alias = "ERROR")]
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub listeners: Vec<ListenerSpec>,

    /// `host:port` used when no routing entry matches the recipient.
    pub default_relay: String,

    /// Targets matching an allow-list entry are never blocked.
    #[serde(default)]
    pub allow_list: Vec<String>,

    /// Literal IPs, CIDR blocks, or substrings matched against peer IPs and
    /// recipients.
    #[serde(default)]
    pub block_list: Vec<String>,

    /// Recipient domain key to `host:port`.
    #[serde(default)]
    pub domain_routing: AHashMap<String, String>,

    #[serde(default)]
    pub tls_cert_file: Option<PathBuf>,

    #[serde(default)]
    pub tls_key_file: Option<PathBuf>,

    /// Prefix of the daily-rotated log file, e.g. `/var/log/mailgate/mailgate`.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub rate_limiting: RateLimitConfig,

    /// Durable retry queue; delivery failures are only logged when absent.
    #[serde(default)]
    pub queue: Option<QueueConfig>,

    #[serde(default)]
    pub relay: RelayConfig,
}

impl Config {
    /// A minimal configuration with a single listener and default settings.
    pub fn new(listeners: Vec<ListenerSpec>, default_relay: impl Into<String>) -> Self {
        Self {
            listeners,
            default_relay: default_relay.into(),
            allow_list: Vec::new(),
            block_list: Vec::new(),
            domain_routing: AHashMap::new(),
            tls_cert_file: None,
            tls_key_file: None,
            log_file: None,
            log_level: LogLevel::default(),
            rate_limiting: RateLimitConfig::default(),
            queue: None,
            relay: RelayConfig::default(),
        }
    }

    /// Whether any listener speaks TLS, implicitly or via STARTTLS.
    pub fn needs_tls(&self) -> bool {
        self.listeners
            .iter()
            .any(|listener| listener.encryption.needs_tls())
    }

    ///
    /// Check the configuration is usable before any listener is opened.
    ///
    /// # Errors
    /// Returns the first problem found: no listeners, no default relay, a zero
    /// port, missing certificate paths for an encrypted listener, or
    /// inconsistent rate-limit and queue settings.
    ///
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listeners.is_empty() {
            return Err(ConfigError::MissingField("listeners"));
        }

        if self.default_relay.trim().is_empty() {
            return Err(ConfigError::MissingField("default_relay"));
        }

        for listener in &self.listeners {
            if listener.port == 0 {
                return Err(invalid(
                    "listeners.port",
                    "must be a number between 1 and 65535",
                ));
            }

            if listener.encryption.needs_tls()
                && (self.tls_cert_file.is_none() || self.tls_key_file.is_none())
            {
                return Err(ConfigError::MissingTlsMaterial(listener.port));
            }
        }

        let limits = &self.rate_limiting;
        if limits.requests_per_minute == 0 {
            return Err(invalid(
                "rate_limiting.requests_per_minute",
                "must be positive",
            ));
        }
        if limits.burst_limit == 0 {
            return Err(invalid("rate_limiting.burst_limit", "must be positive"));
        }
        if limits.burst_limit > limits.requests_per_minute {
            return Err(invalid(
                "rate_limiting.burst_limit",
                "cannot be greater than requests_per_minute",
            ));
        }

        if let Some(queue) = &self.queue {
            if queue.max_queue_size == 0 {
                return Err(invalid("queue.max_queue_size", "must be positive"));
            }
            if queue.persist_interval.is_zero() {
                return Err(invalid("queue.persist_interval", "must be positive"));
            }
            if self.relay.scan_interval.is_zero() {
                return Err(invalid("relay.scan_interval", "must be positive"));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidConfiguration {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
