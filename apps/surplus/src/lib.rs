//! # Surplus Library
//!
//! This library exposes the Surplus front-end modules for testing and
//! integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod api;
pub mod cli;
pub mod config;

// Re-export the inner crates for convenience
pub use surplus_client;
pub use surplus_core;

use std::time::{SystemTime, UNIX_EPOCH};
use surplus_core::Timestamp;

/// Current unix time in seconds.
pub fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
