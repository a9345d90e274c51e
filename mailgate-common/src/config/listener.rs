use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Transport security offered by a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encryption {
    /// Plaintext for the whole session.
    #[default]
    None,
    /// Implicit TLS: the handshake happens before any SMTP bytes.
    Tls,
    /// Plaintext greeting, then the client must upgrade with `STARTTLS`.
    StartTls,
}

impl Encryption {
    /// Whether this listener needs certificate material.
    pub const fn needs_tls(self) -> bool {
        matches!(self, Self::Tls | Self::StartTls)
    }
}

impl Display for Encryption {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::None => "none",
            Self::Tls => "tls",
            Self::StartTls => "starttls",
        })
    }
}

/// One listening endpoint of the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub encryption: Encryption,
    /// Accepted for compatibility; AUTH is not offered.
    #[serde(default)]
    pub require_auth: bool,
}

impl ListenerSpec {
    pub fn new(host: impl Into<String>, port: u16, encryption: Encryption) -> Self {
        Self {
            host: host.into(),
            port,
            encryption,
            require_auth: false,
        }
    }

    /// An empty host, `0.0.0.0`, `::` or `*` binds every interface.
    pub fn is_wildcard(&self) -> bool {
        matches!(self.host.trim_matches(['[', ']']), "" | "0.0.0.0" | "::" | "*")
    }
}

impl Display for ListenerSpec {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(fmt, "[{}]:{} ({})", self.host, self.port, self.encryption)
        } else {
            write!(fmt, "{}:{} ({})", self.host, self.port, self.encryption)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_hosts() {
        assert!(ListenerSpec::new("0.0.0.0", 25, Encryption::None).is_wildcard());
        assert!(ListenerSpec::new("", 25, Encryption::None).is_wildcard());
        assert!(ListenerSpec::new("[::]", 25, Encryption::None).is_wildcard());
        assert!(!ListenerSpec::new("127.0.0.1", 25, Encryption::None).is_wildcard());
    }

    #[test]
    fn display() {
        assert_eq!(
            ListenerSpec::new("::1", 465, Encryption::Tls).to_string(),
            "[::1]:465 (tls)"
        );
        assert_eq!(
            ListenerSpec::new("127.0.0.1", 587, Encryption::StartTls).to_string(),
            "127.0.0.1:587 (starttls)"
        );
    }
}
