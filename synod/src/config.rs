//! Configuration types for the Synod client.

use rand::Rng;
use std::time::Duration;

use crate::error::{Result, SynodError};

/// Client configuration.
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    /// What to do after losing an accept race.
    pub retry: RetryConfig,
}

/// Retry policy for conflicting proposals.
///
/// Competing proposers can keep invalidating each other's rounds. Waiting a
/// random amount of time before the next round breaks the symmetry without
/// touching safety.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Give up after this many proposals (`None` retries forever).
    pub max_attempts: Option<u32>,

    /// Delay before the first retry (`None` retries immediately).
    pub initial_backoff: Option<Duration>,

    /// Maximum backoff delay.
    pub max_backoff: Duration,

    /// Backoff multiplier (exponential growth factor).
    pub backoff_multiplier: f64,

    /// Fraction of each delay that is randomized, in [0, 1].
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryConfig {
    /// Retry immediately and forever.
    pub fn none() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: None,
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: 0.0,
        }
    }

    /// Randomized exponential backoff, suited to contended quorums.
    pub fn jittered() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: Some(Duration::from_millis(5)),
            max_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: 1.0,
        }
    }

    /// Set the attempt limit.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay to wait before retry number `retry` (1-based).
    ///
    /// Returns `None` when backoff is disabled.
    pub fn delay(&self, retry: u32) -> Option<Duration> {
        let initial = self.initial_backoff?;
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let base = (initial.as_nanos() as f64 * self.backoff_multiplier.powi(exponent))
            .min(self.max_backoff.as_nanos() as f64);
        let spread = base * self.jitter;
        let nanos = if spread > 0.0 {
            base - spread + rand::rng().random_range(0.0..=spread)
        } else {
            base
        };
        Some(Duration::from_nanos(nanos as u64))
    }

    /// Validate retry configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == Some(0) {
            return Err(SynodError::Config(
                "max_attempts must be positive".into(),
            ));
        }
        if let Some(initial) = self.initial_backoff {
            if initial.is_zero() {
                return Err(SynodError::Config(
                    "initial_backoff must be positive".into(),
                ));
            }
            if self.max_backoff < initial {
                return Err(SynodError::Config(
                    "max_backoff must be >= initial_backoff".into(),
                ));
            }
        }
        if self.backoff_multiplier < 1.0 {
            return Err(SynodError::Config(
                "backoff_multiplier must be >= 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(SynodError::Config("jitter must be within [0, 1]".into()));
        }
        Ok(())
    }
}

impl ClientConfig {
    /// Set custom retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()
    }
}
