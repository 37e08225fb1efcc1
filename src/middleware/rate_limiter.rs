//! Per-user sliding-window admission control
//!
//! Purely in-memory: a list of request instants per user, pruned lazily on
//! each check and compacted by a periodic sweep so idle users do not
//! accumulate memory.

use crate::metrics::METRICS;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: usize,
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 5,
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Sliding-window rate limiter keyed by user id
pub struct RateLimiter {
    windows: DashMap<String, Vec<Instant>>,
    config: RateLimitConfig,
    sweeper: StdMutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
            sweeper: StdMutex::new(None),
        }
    }

    /// Prune aged entries, then admit iff the remaining count is below
    /// the maximum, recording the new timestamp on admission
    pub fn check(&self, user_id: &str) -> bool {
        let now = Instant::now();
        let window = self.config.window;
        let mut entry = self.windows.entry(user_id.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < window);

        if entry.len() >= self.config.max_requests {
            METRICS
                .rate_limit_checks
                .with_label_values(&["rejected"])
                .inc();
            debug!(user_id, count = entry.len(), "Rate limit exceeded");
            return false;
        }

        entry.push(now);
        METRICS
            .rate_limit_checks
            .with_label_values(&["allowed"])
            .inc();
        trace!(user_id, count = entry.len(), "Request admitted");
        true
    }

    /// Remaining admissions in the current window, without recording
    pub fn remaining(&self, user_id: &str) -> usize {
        let now = Instant::now();
        let used = self
            .windows
            .get(user_id)
            .map(|e| {
                e.iter()
                    .filter(|t| now.duration_since(**t) < self.config.window)
                    .count()
            })
            .unwrap_or(0);
        self.config.max_requests.saturating_sub(used)
    }

    /// Drop per-user entries whose windows are fully aged out
    pub fn sweep(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.windows
            .retain(|_, timestamps| timestamps.iter().any(|t| now.duration_since(*t) < window));
    }

    /// Start the periodic sweep task bounding memory
    pub fn start_sweeper(self: &Arc<Self>) {
        let limiter = Arc::clone(self);
        let interval = self.config.sweep_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        });

        let mut guard = self.sweeper.lock().expect("sweeper lock poisoned");
        if let Some(old) = guard.replace(task) {
            old.abort();
        }
    }

    pub fn shutdown(&self) {
        let mut guard = self.sweeper.lock().expect("sweeper lock poisoned");
        if let Some(task) = guard.take() {
            task.abort();
        }
    }

    /// Number of users currently tracked
    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }
}
