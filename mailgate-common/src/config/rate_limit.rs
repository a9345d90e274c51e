use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Per-IP admission limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    /// Validated against `requests_per_minute` but not otherwise enforced.
    pub burst_limit: u32,
    #[serde(default)]
    pub exempt_ips: Vec<IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_limit: 10,
            exempt_ips: Vec::new(),
        }
    }
}
