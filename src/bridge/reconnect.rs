//! Reconnect backoff policy.
//!
//! Backoff is linear: attempt `n` waits `base_delay × n`. Once
//! `max_attempts` have been made the client stays disconnected until an
//! explicit `connect`.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default cap on automatic reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default delay unit between attempts.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(3);

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Linear reconnect backoff with an attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts allowed before giving up.
    pub max_attempts: u32,
    /// Delay unit multiplied by the attempt number.
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: DEFAULT_RECONNECT_BASE_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Policy that never reconnects.
    #[inline]
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            max_attempts: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before the 1-based `attempt`.
    #[inline]
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Returns `true` if another attempt is allowed after `attempts_made`.
    #[inline]
    #[must_use]
    pub const fn allows_another(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let policy = ReconnectPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
        };
        let delays: Vec<_> = (1..=5).map(|n| policy.delay_for(n).as_millis()).collect();
        assert_eq!(delays, vec![500, 1000, 1500, 2000, 2500]);
    }

    #[test]
    fn test_cap() {
        let policy = ReconnectPolicy::default();
        assert!(policy.allows_another(4));
        assert!(!policy.allows_another(5));
        assert!(!ReconnectPolicy::disabled().allows_another(0));
    }
}
