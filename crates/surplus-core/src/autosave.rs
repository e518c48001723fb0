//! # Autosave Bookkeeping
//!
//! Draft saves are fire-and-forget, so their outcome is tracked here:
//! - Every save gets a generation number; only the newest generation may
//!   retry or update the status (last write wins)
//! - Transient failures retry on a bounded exponential [`Backoff`]
//!
//! No clocks or timers live here; the async caller sleeps for the returned
//! delays.

use crate::Timestamp;
use std::time::Duration;

// =============================================================================
// BACKOFF
// =============================================================================

/// Default first retry delay.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default cap on a single delay.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Bounded exponential backoff: `base * 2^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0-based), or `None` when exhausted.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Option<Duration> {
        if retry >= self.max_retries {
            return None;
        }
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let millis = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Some(Duration::from_millis(millis))
    }
}

// =============================================================================
// TRACKER
// =============================================================================

/// Last known state of draft synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutosaveStatus {
    /// Nothing outstanding and nothing confirmed since the last reset or cancel.
    #[default]
    Idle,
    /// A save for `generation` is in flight.
    Saving { generation: u64 },
    /// The backend confirmed `generation`.
    Saved { generation: u64, at: Timestamp },
    /// `generation` failed and will retry.
    RetryPending { generation: u64, retry: u32 },
    /// `generation` failed and gave up; the next step change or tick retries.
    Failed { generation: u64 },
}

/// Generation counter plus status.
#[derive(Debug, Clone, Default)]
pub struct AutosaveTracker {
    latest: u64,
    status: AutosaveStatus,
}

impl AutosaveTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new save, superseding any older one.
    pub fn begin(&mut self) -> u64 {
        self.latest = self.latest.saturating_add(1);
        self.status = AutosaveStatus::Saving {
            generation: self.latest,
        };
        self.latest
    }

    /// Supersede every outstanding save without starting a new one.
    ///
    /// Used when the form stops accepting saves (submit, discard).
    pub fn cancel(&mut self) {
        self.latest = self.latest.saturating_add(1);
        if matches!(
            self.status,
            AutosaveStatus::Saving { .. } | AutosaveStatus::RetryPending { .. }
        ) {
            self.status = AutosaveStatus::Idle;
        }
    }

    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.latest
    }

    #[must_use]
    pub fn status(&self) -> AutosaveStatus {
        self.status
    }

    /// Whether the last save ended in failure.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        matches!(
            self.status,
            AutosaveStatus::Failed { .. } | AutosaveStatus::RetryPending { .. }
        )
    }

    /// Record a confirmed save. Stale generations are ignored.
    pub fn record_success(&mut self, generation: u64, at: Timestamp) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.status = AutosaveStatus::Saved { generation, at };
        true
    }

    /// Record a failed attempt and decide whether to retry.
    ///
    /// Returns the delay before the next attempt, or `None` when the
    /// generation is stale, the failure is permanent, or retries ran out.
    pub fn record_failure(
        &mut self,
        generation: u64,
        retry: u32,
        transient: bool,
        backoff: &Backoff,
    ) -> Option<Duration> {
        if !self.is_current(generation) {
            return None;
        }
        let delay = if transient { backoff.delay(retry) } else { None };
        self.status = match delay {
            Some(_) => AutosaveStatus::RetryPending { generation, retry },
            None => AutosaveStatus::Failed { generation },
        };
        delay
    }
}
