//! Error types for the floodgate crate.

use std::time::Duration;

use thiserror::Error;

use crate::floodcontrol::UserId;

/// Main error type for floodgate operations.
#[derive(Error, Debug)]
pub enum FloodControlError {
    /// The key already has `limit` admitted events inside the trailing window.
    ///
    /// This is the normal negative outcome of a check, not a fault.
    #[error("rate limit exceeded for user {key}: {limit} requests per {window:?}")]
    RateLimitExceeded {
        key: UserId,
        limit: u32,
        window: Duration,
    },

    /// Limiter constructed with a zero window or zero limit
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FloodControlError {
    /// Returns `true` if this is a rejection rather than a structural failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FloodControlError::RateLimitExceeded { .. })
    }
}

/// Result type alias for floodgate operations.
pub type Result<T> = std::result::Result<T, FloodControlError>;
