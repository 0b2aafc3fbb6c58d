//! Retry delay policies.
//!
//! Each subsystem keeps its own formula, expressed through one
//! scheduler-agnostic trait so the delay is an explicit contract rather than
//! an incidental timer chain:
//!
//! * [`LinearBackoff`] — `base × attempt`.  Used for batch analysis items,
//!   which are latency-sensitive; the first retry should come quickly.
//! * [`ExponentialBackoff`] — `base × 2^(attempt−1)`.  Used for cleanup and
//!   device-release retries, where pressure relief matters more than speed.

use std::time::Duration;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Delay as a pure function of the (1-based) failed attempt number.
///
/// Implementations carry no timers; callers schedule the sleep with whatever
/// async primitive they run on.
pub trait RetryPolicy: Send + Sync {
    /// Total attempts allowed, including the first.
    fn max_attempts(&self) -> u32;

    /// Delay to wait after attempt `attempt` failed (1-based).
    fn delay(&self, attempt: u32) -> Duration;
}

// ---------------------------------------------------------------------------
// LinearBackoff
// ---------------------------------------------------------------------------

/// `base × attempt`: 1×, 2×, 3×, …
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    pub base: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy for LinearBackoff {
    fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt.max(1))
    }
}

// ---------------------------------------------------------------------------
// ExponentialBackoff
// ---------------------------------------------------------------------------

/// `base × 2^(attempt−1)`: 1×, 2×, 4×, …
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy for ExponentialBackoff {
    fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.base.saturating_mul(factor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
