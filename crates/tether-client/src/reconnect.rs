//! Reconnection policy — exponential backoff with a hard attempt cap

use std::time::Duration;

/// Close code for a normal, intentional closure. Never triggers reconnection.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code the gateway uses when going away for maintenance. Also final.
pub const CLOSE_SERVICE_RESTART: u16 = 1012;

/// Backoff configuration for unexpected closures.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt; doubles each attempt.
    pub base_delay: Duration,
    /// Hard cap on consecutive attempts without a successful handshake.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(2000),
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Delay before attempt `attempt` (1-based): `base_delay * 2^(attempt-1)`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Whether another attempt may run, given how many have already completed.
    #[must_use]
    pub const fn should_reconnect(&self, completed_attempts: u32) -> bool {
        completed_attempts < self.max_attempts
    }

    /// Whether a close code warrants reconnection at all.
    #[must_use]
    pub const fn is_unexpected_close(code: u16) -> bool {
        code != CLOSE_NORMAL && code != CLOSE_SERVICE_RESTART
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(8000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(16000));
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(32000));
    }

    #[test]
    fn test_attempt_cap() {
        let config = ReconnectConfig::default();
        assert!(config.should_reconnect(0));
        assert!(config.should_reconnect(4));
        assert!(!config.should_reconnect(5));
        assert!(!config.should_reconnect(6));
    }

    #[test]
    fn test_zero_attempt_clamps() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(2000));
    }

    #[test]
    fn test_unexpected_close_codes() {
        assert!(!ReconnectConfig::is_unexpected_close(CLOSE_NORMAL));
        assert!(!ReconnectConfig::is_unexpected_close(CLOSE_SERVICE_RESTART));
        assert!(ReconnectConfig::is_unexpected_close(1006));
        assert!(ReconnectConfig::is_unexpected_close(1011));
    }
}
