//! Sliding window flood control and its per-key state.

mod backend;
mod clock;
mod limiter;
mod log;
mod sharded;

pub use backend::FloodControl;
pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::SlidingWindowLimiter;
pub use log::RequestLog;
pub use sharded::ShardedLimiter;

/// Identifier of the user whose requests are counted.
pub type UserId = i64;
