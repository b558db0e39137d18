//! Floodgate - Per-key Sliding Window Flood Control
//!
//! This crate decides whether a request from a given user should be admitted,
//! based on how many of that user's requests were admitted within a trailing
//! time window. The limiter is a plain library component; the `console`
//! module and the `floodgate` binary are one caller of it among many.

pub mod config;
pub mod console;
pub mod error;
pub mod floodcontrol;
