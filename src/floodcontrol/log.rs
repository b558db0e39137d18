//! Per-key log of admitted request instants.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Admitted request instants for one key, oldest first.
///
/// Entries are only ever appended with the current instant of a monotonic
/// clock, so the deque is always in chronological order. That ordering is
/// what lets eviction stop at the first entry still inside the window.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    entries: VecDeque<Instant>,
}

/// Whether an entry recorded at `at` has fallen out of the window at `now`.
///
/// An entry exactly `window` old is still counted.
fn is_stale(now: Instant, at: Instant, window: Duration) -> bool {
    now.saturating_duration_since(at) > window
}

impl RequestLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries older than `window` from the front of the log.
    ///
    /// Returns the number of entries removed.
    pub fn evict_stale(&mut self, now: Instant, window: Duration) -> usize {
        let mut evicted = 0;
        while let Some(&oldest) = self.entries.front() {
            if !is_stale(now, oldest, window) {
                break;
            }
            self.entries.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Evict stale entries, then record `now` if there is room for it.
    ///
    /// Returns `true` if the request was admitted. On rejection the log keeps
    /// its post-eviction contents and `now` is not recorded.
    pub fn try_admit(&mut self, now: Instant, window: Duration, limit: u32) -> bool {
        self.evict_stale(now, window);

        if self.entries.len() >= limit as usize {
            return false;
        }

        self.entries.push_back(now);
        true
    }

    /// Number of entries still inside the window at `now`, without evicting.
    pub fn count_within(&self, now: Instant, window: Duration) -> usize {
        let first_live = self.first_live(now, window);
        self.entries.len() - first_live
    }

    /// Time until one more request would be admitted, if the log is full.
    ///
    /// Returns `None` when a request at `now` would be admitted.
    pub fn retry_after(&self, now: Instant, window: Duration, limit: u32) -> Option<Duration> {
        let first_live = self.first_live(now, window);
        if self.entries.len() - first_live < limit as usize {
            return None;
        }

        // The oldest live entry leaves the window one tick after it is exactly
        // `window` old.
        let oldest = self.entries[first_live];
        let age = now.saturating_duration_since(oldest);
        Some(window - age + Duration::from_nanos(1))
    }

    /// Number of entries currently stored, stale or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The oldest stored instant.
    pub fn oldest(&self) -> Option<Instant> {
        self.entries.front().copied()
    }

    fn first_live(&self, now: Instant, window: Duration) -> usize {
        self.entries
            .partition_point(|&at| is_stale(now, at, window))
    }
}
