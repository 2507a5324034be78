//! Reconnect backoff policy.

use std::time::Duration;

use koi_core::config::realtime::RealtimeConfig;

/// Capped exponential backoff for reconnect attempts.
///
/// Pure state: the manager tracks the attempt counter and asks this
/// policy for the next delay, so the schedule is testable without a
/// transport or a clock.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// First retry delay.
    pub base: Duration,
    /// Delay ceiling.
    pub max: Duration,
    /// Attempts after which the policy gives up.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Builds the policy from configuration.
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            base: config.backoff_base(),
            max: config.backoff_max(),
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// Delay before retry number `attempt` (0-based): `min(base * 2^attempt, max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).unwrap_or(self.max).min(self.max)
    }

    /// Whether the policy is out of attempts.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            max_attempts: 5,
        }
    }

    #[test]
    fn doubles_from_base() {
        let p = policy();
        assert_eq!(p.delay(0), Duration::from_secs(1));
        assert_eq!(p.delay(1), Duration::from_secs(2));
        assert_eq!(p.delay(2), Duration::from_secs(4));
        assert_eq!(p.delay(3), Duration::from_secs(8));
        assert_eq!(p.delay(4), Duration::from_secs(16));
    }

    #[test]
    fn caps_at_max() {
        let p = policy();
        assert_eq!(p.delay(5), Duration::from_secs(30));
        assert_eq!(p.delay(20), Duration::from_secs(30));
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn exhausts_at_max_attempts() {
        let p = policy();
        assert!(!p.is_exhausted(4));
        assert!(p.is_exhausted(5));
        assert!(p.is_exhausted(6));
    }
}
