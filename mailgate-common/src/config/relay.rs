use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client-side settings for onward delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Name announced in EHLO/HELO to downstream relays.
    #[serde(default = "default_helo_name")]
    pub helo_name: String,

    /// Skip certificate verification when upgrading to TLS downstream.
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// How often queued messages are looked at again, e.g. `"30s"`.
    #[serde(default = "default_scan_interval", with = "humantime_serde")]
    pub scan_interval: Duration,
}

fn default_helo_name() -> String {
    "mailgate.local".to_string()
}

const fn default_scan_interval() -> Duration {
    Duration::from_secs(30)
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            helo_name: default_helo_name(),
            accept_invalid_certs: false,
            scan_interval: default_scan_interval(),
        }
    }
}
