//! Retry and idempotency settings.
//!
//! Durations serialize as integer milliseconds so the same values can be
//! written in YAML or JSON config files:
//!
//! ```yaml
//! retry:
//!   max_attempts: 3
//!   base_delay: 1000
//!   multiplier: 2.0
//!   max_delay: 30000
//!   jitter_ratio: 0.25
//! idempotency:
//!   ttl: 600000
//! ```
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Backoff policy for [`ResilientExecutor`](crate::ResilientExecutor).
///
/// The delay before attempt `n + 1` is `base_delay * multiplier^(n - 1)`,
/// capped at `max_delay`, plus up to `jitter_ratio` of that delay at random.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total tries including the first one.
    ///
    /// Default: `3`
    pub max_attempts: u32,

    /// Default: `1000` ms
    #[serde(with = "crate::serde_millis")]
    pub base_delay: Duration,

    /// Default: `2.0`
    pub multiplier: f64,

    /// Default: `30000` ms
    #[serde(with = "crate::serde_millis")]
    pub max_delay: Duration,

    /// Fraction of the computed delay added as random jitter, in `[0, 1]`.
    /// Spreads out retries from clients that failed at the same moment.
    ///
    /// Default: `0.25`
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter_ratio: 0.25,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio;
        self
    }

    /// No jitter, for deterministic timing.
    pub fn without_jitter(self) -> Self {
        self.with_jitter_ratio(0.0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
            return Err(ConfigError::InvalidMultiplier(self.multiplier));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ConfigError::InvalidJitter(self.jitter_ratio));
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigError::InvertedDelays {
                base: self.base_delay,
                max: self.max_delay,
            });
        }
        Ok(())
    }

    /// Backoff after failed attempt `attempt` (1-based), before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// [`backoff`](Self::backoff) plus random jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter_ratio <= 0.0 {
            return delay;
        }
        delay + delay.mul_f64(fastrand::f64() * self.jitter_ratio)
    }
}

/// Settings for the [`IdempotencyCache`](crate::IdempotencyCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// How long a successful result is replayed for its key.
    ///
    /// Default: `600000` ms (10 minutes)
    #[serde(with = "crate::serde_millis")]
    pub ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10 * 60),
        }
    }
}

impl IdempotencyConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }
        Ok(())
    }
}
