//! Reconnect delay policy.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the reconnect delay grows with the attempt number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `base * attempt`.
    #[default]
    Linear,
    /// `base * 2^(attempt - 1)`.
    Exponential,
}

/// Reconnect schedule: attempt cap, delay growth, and jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Reconnect attempts allowed after a connection is lost before the
    /// transport gives up. A successful open resets the count.
    pub max_attempts: u32,
    /// Delay unit.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth strategy.
    pub strategy: BackoffStrategy,
    /// Fractional jitter in `[0, 1]`; each delay is scaled by a random
    /// factor in `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(3000),
            max_delay: Duration::from_millis(30_000),
            strategy: BackoffStrategy::Linear,
            jitter: 0.0,
        }
    }
}

impl ReconnectPolicy {
    /// Whether reconnect number `attempt` (1-based) is allowed.
    pub const fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Delay before reconnect number `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let factor = match self.strategy {
            BackoffStrategy::Linear => attempt,
            BackoffStrategy::Exponential => 1_u32
                .checked_shl(attempt.saturating_sub(1))
                .unwrap_or(u32::MAX),
        };
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay before reconnect number `attempt`, with jitter applied.
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter <= 0.0 {
            return delay;
        }
        let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
        delay.mul_f64(factor).min(self.max_delay)
    }
}
