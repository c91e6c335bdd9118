//! Bounded retry around network steps
//!
//! `RetryPolicy` is applied uniformly to list page renders, pagination
//! advances and detail fetches. Between attempts it sleeps according to its
//! backoff, rotates outbound identity when the site blocked the previous
//! attempt (or on every attempt when configured), and gives up early when
//! the run is cancelled.

use super::identity::IdentityPool;
use crate::browser::Identity;
use crate::config::{BackoffKind, RetryConfig, RotationMode};
use crate::NavigationError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a retried step did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: NavigationError },

    #[error("cancelled")]
    Cancelled,
}

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential { base: Duration, max: Duration },
}

/// Bounded retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        let base = Duration::from_millis(config.delay_ms);
        let backoff = match config.backoff {
            BackoffKind::Fixed => Backoff::Fixed(base),
            BackoffKind::Exponential => Backoff::Exponential {
                base,
                max: Duration::from_millis(config.max_delay_ms),
            },
        };
        Self::new(config.max_attempts, backoff)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }

    /// Runs `op` until it succeeds, the budget is spent, or `cancel` fires
    ///
    /// # Arguments
    ///
    /// * `cancel` - Checked before every attempt and during every backoff
    /// * `identities` - Pool providing the identity for each attempt
    /// * `label` - What is being attempted, for logs
    /// * `op` - Called with the 1-based attempt number and the identity to use
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - The first successful result
    /// * `Err(RetryError::Exhausted)` - Every attempt failed; carries the last failure
    /// * `Err(RetryError::Cancelled)` - Cancellation was observed at an attempt boundary
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        identities: &IdentityPool,
        label: &str,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(u32, Identity) -> Fut,
        Fut: Future<Output = Result<T, NavigationError>>,
    {
        let mut attempt = 1;
        let mut identity = identities.current();

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let error = match op(attempt, identity.clone()).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt >= self.max_attempts {
                tracing::warn!(
                    "Giving up on {} after {} attempts: {}",
                    label,
                    attempt,
                    error
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                "Attempt {}/{} for {} failed ({}); retrying in {:?}",
                attempt,
                self.max_attempts,
                label,
                error.reason,
                delay
            );

            identity = if error.reason.is_blocked()
                || identities.mode() == RotationMode::EveryAttempt
            {
                identities.rotate()
            } else {
                identities.current()
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
