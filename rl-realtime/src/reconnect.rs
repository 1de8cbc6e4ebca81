//! Reconnection policy.

use std::time::Duration;

use rl_core::config::SessionConfig;
use rl_core::constants;

/// How long to wait before each reconnection attempt.
///
/// `delay(n) = min(base * multiplier^n, max) +/- jitter`. The default is a
/// fixed 3 second retry with no attempt limit.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first attempt.
    pub base_delay: Duration,
    /// Upper bound before jitter.
    pub max_delay: Duration,
    /// Growth factor per attempt. `1.0` keeps the delay fixed.
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0) applied to each delay.
    pub jitter_factor: f64,
    /// Maximum number of consecutive attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        let fixed = Duration::from_millis(constants::RECONNECT_DELAY_MS);
        Self {
            base_delay: fixed,
            max_delay: fixed,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Capped exponential backoff: 1s, 2s, 4s, 8s, 16s, max 30s, +/- 30%.
    pub fn exponential() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.3,
            max_attempts: 0,
        }
    }

    /// Delay before attempt `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64().max(base);
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let scaled = (base * self.multiplier.max(1.0).powi(exponent)).min(max);

        let jitter_range = scaled * self.jitter_factor.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            (rand::random::<f64>() * 2.0 - 1.0) * jitter_range
        } else {
            0.0
        };
        Duration::try_from_secs_f64((scaled + jitter).max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Whether attempt number `attempt` (one-based) is still allowed.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }
}

impl From<&SessionConfig> for ReconnectConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.reconnect_base_ms),
            max_delay: Duration::from_millis(config.reconnect_max_ms),
            multiplier: config.reconnect_multiplier,
            jitter_factor: config.reconnect_jitter,
            max_attempts: config.reconnect_max_attempts,
        }
    }
}
