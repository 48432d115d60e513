//! Per-client fixed-window rate limiting.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{MayaError, Result};

/// Rate limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Process-wide request counter keyed by client identifier.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    /// Count one request for `client_id`.
    ///
    /// The increment and the comparison happen under the entry lock, so two
    /// concurrent requests can never both take the last slot.
    pub fn check(&self, client_id: &str) -> Result<()> {
        self.check_at(client_id, Instant::now())
    }

    fn check_at(&self, client_id: &str, now: Instant) -> Result<()> {
        let mut entry = self
            .windows
            .entry(client_id.to_string())
            .or_insert(Window {
                started: now,
                count: 0,
            });

        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            let retry_after = self.window.saturating_sub(elapsed);
            tracing::warn!(
                "Rate limit hit for '{}' ({} requests in {:?})",
                client_id,
                entry.count,
                self.window
            );
            return Err(MayaError::RateLimited {
                client_id: client_id.to_string(),
                retry_after,
            });
        }

        entry.count += 1;
        Ok(())
    }

    /// Requests left in the current window.
    pub fn remaining(&self, client_id: &str) -> u32 {
        match self.windows.get(client_id) {
            Some(window) if window.started.elapsed() < self.window => {
                self.max_requests.saturating_sub(window.count)
            }
            _ => self.max_requests,
        }
    }

    /// Drop windows that have fully elapsed.
    ///
    /// Returns how many windows were removed. Clients inserted concurrently
    /// by `check` are not counted.
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, window| {
            let live = window.started.elapsed() < self.window;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
