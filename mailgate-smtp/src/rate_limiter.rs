//! Per-IP connection rate limiting using a fixed one-minute window.
//!
//! Each peer IP has a counter and the instant it was last reset. Once more than
//! a minute has passed since that reset the counter starts again from zero; the
//! window does not slide. Expired windows are swept out at most once a
//! window, so peers that stop connecting are eventually forgotten.

use std::{
    net::IpAddr,
    time::{Duration, Instant},
};

use ahash::AHashMap;
use mailgate_common::{config::RateLimitConfig, tracing};
use parking_lot::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Window {
    count: u32,
    reset_at: Instant,
}

impl Window {
    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.reset_at) > WINDOW
    }
}

#[derive(Debug)]
struct Windows {
    by_ip: AHashMap<IpAddr, Window>,
    swept_at: Instant,
}

impl Windows {
    fn sweep(&mut self, now: Instant) {
        if now.saturating_duration_since(self.swept_at) <= WINDOW {
            return;
        }

        let before = self.by_ip.len();
        self.by_ip.retain(|_, window| !window.expired(now));
        self.swept_at = now;

        tracing::trace!(evicted = before - self.by_ip.len(), "Swept expired rate limit windows");
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(Windows {
                by_ip: AHashMap::new(),
                swept_at: Instant::now(),
            }),
        }
    }

    /// Record a connection attempt from `ip`, returning whether it is allowed.
    pub fn allow(&self, ip: IpAddr) -> bool {
        self.allow_at(ip, Instant::now())
    }

    pub(crate) fn allow_at(&self, ip: IpAddr, now: Instant) -> bool {
        let ip = ip.to_canonical();
        if self.config.exempt_ips.iter().any(|exempt| exempt.to_canonical() == ip) {
            return true;
        }

        let mut windows = self.windows.lock();
        windows.sweep(now);

        let window = windows.by_ip.entry(ip).or_insert(Window {
            count: 0,
            reset_at: now,
        });

        if window.expired(now) {
            window.count = 0;
            window.reset_at = now;
        }

        if window.count >= self.config.requests_per_minute {
            tracing::debug!(%ip, count = window.count, "Rate limit exceeded");
            return false;
        }

        window.count += 1;
        true
    }

    /// Number of IPs currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.lock().by_ip.len()
    }
}
