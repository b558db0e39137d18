//! Flood control trait for abstracting over limiter storage strategies.

use std::time::Duration;

use super::UserId;
use crate::error::Result;

/// Trait for flood control implementations.
///
/// This trait abstracts over the single-lock `SlidingWindowLimiter` and the
/// `ShardedLimiter` so callers can hold either behind an `Arc<dyn FloodControl>`.
pub trait FloodControl: Send + Sync {
    /// Admit or reject a request from `key` at the current instant.
    ///
    /// Returns `FloodControlError::RateLimitExceeded` on rejection.
    fn check(&self, key: UserId) -> Result<()>;

    /// The trailing window requests are counted over.
    fn window(&self) -> Duration;

    /// Maximum admitted requests per key within the window.
    fn limit(&self) -> u32;
}
