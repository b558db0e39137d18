//! Single-lock sliding window limiter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::backend::FloodControl;
use super::clock::{Clock, SystemClock};
use super::log::RequestLog;
use super::UserId;
use crate::error::{FloodControlError, Result};

/// Validate limiter parameters shared by every limiter variant.
pub(crate) fn validate(window: Duration, limit: u32) -> Result<()> {
    if window.is_zero() {
        return Err(FloodControlError::InvalidLimit(
            "window must be greater than zero".to_string(),
        ));
    }
    if limit == 0 {
        return Err(FloodControlError::InvalidLimit(
            "limit must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Per-key sliding window limiter guarded by one mutex.
///
/// The lock is held for the whole of a check (evict, compare, append), so
/// concurrent checks behave exactly as if they ran one after another.
pub struct SlidingWindowLimiter {
    /// Request logs indexed by user id
    logs: Mutex<HashMap<UserId, RequestLog>>,
    window: Duration,
    limit: u32,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    /// Create a limiter using the system clock.
    pub fn new(window: Duration, limit: u32) -> Result<Self> {
        Self::with_clock(window, limit, Arc::new(SystemClock))
    }

    /// Create a limiter reading time from `clock`.
    pub fn with_clock(window: Duration, limit: u32, clock: Arc<dyn Clock>) -> Result<Self> {
        validate(window, limit)?;
        Ok(Self {
            logs: Mutex::new(HashMap::new()),
            window,
            limit,
            clock,
        })
    }

    /// Decide whether a request from `key` is admitted right now.
    ///
    /// Stale entries for the key are evicted whatever the outcome. The
    /// current instant is recorded only when the request is admitted.
    pub fn check(&self, key: UserId) -> Result<()> {
        let mut logs = self.logs.lock();
        let now = self.clock.now();

        let log = logs.entry(key).or_default();
        let admitted = log.try_admit(now, self.window, self.limit);

        trace!(key, admitted, in_window = log.len(), "Checked flood control");

        if admitted {
            Ok(())
        } else {
            debug!(key, limit = self.limit, "Rate limit exceeded");
            Err(FloodControlError::RateLimitExceeded {
                key,
                limit: self.limit,
                window: self.window,
            })
        }
    }

    /// Boolean form of [`check`](Self::check).
    pub fn is_allowed(&self, key: UserId) -> bool {
        self.check(key).is_ok()
    }

    /// Number of admitted requests for `key` still inside the window.
    pub fn count(&self, key: UserId) -> usize {
        let logs = self.logs.lock();
        let now = self.clock.now();
        logs.get(&key)
            .map(|log| log.count_within(now, self.window))
            .unwrap_or(0)
    }

    /// How many more requests `key` may make right now.
    pub fn remaining(&self, key: UserId) -> u32 {
        let used = self.count(key) as u32;
        self.limit.saturating_sub(used)
    }

    /// Time until `key` may make another request, or `None` if it may now.
    pub fn retry_after(&self, key: UserId) -> Option<Duration> {
        let logs = self.logs.lock();
        let now = self.clock.now();
        logs.get(&key)
            .and_then(|log| log.retry_after(now, self.window, self.limit))
    }

    /// Number of keys with a log.
    pub fn key_count(&self) -> usize {
        self.logs.lock().len()
    }

    /// Drop every log.
    pub fn clear(&self) {
        self.logs.lock().clear();
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

impl FloodControl for SlidingWindowLimiter {
    fn check(&self, key: UserId) -> Result<()> {
        SlidingWindowLimiter::check(self, key)
    }

    fn window(&self) -> Duration {
        self.window
    }

    fn limit(&self) -> u32 {
        self.limit
    }
}
