use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{info, warn};
use tokio::time::Instant;

use crate::error::SyncError;
use crate::settings::ResilienceSettings;

/// Exponential backoff between attempts of one logical submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based): base, 2×base, 4×base, ...
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ResilienceSettings::default())
    }
}

impl From<&ResilienceSettings> for RetryPolicy {
    fn from(settings: &ResilienceSettings) -> Self {
        Self {
            retries: settings.retry_count,
            base_delay: Duration::from_secs(settings.retry_base_delay_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    /// The single trial call is in flight.
    HalfOpen,
}

/// Consecutive-failure circuit breaker.
///
/// Opens after `failure_threshold` failed calls in a row and fails fast for
/// `open_for`. The first caller after that window becomes the half-open trial;
/// its outcome closes the breaker or opens it for another window. Every
/// method takes a short, non-async lock, so the fast-fail path never waits on I/O.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_for: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_for: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            open_for,
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        *self.lock()
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state(), BreakerState::Closed { .. })
    }

    /// Admits a call, or fails fast with `SyncError::CircuitOpen`.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, SyncError> {
        let mut state = self.lock();
        match *state {
            BreakerState::Closed { .. } => {}
            BreakerState::Open { until } if Instant::now() >= until => {
                info!("circuit breaker half-open; next call is a trial");
                *state = BreakerState::HalfOpen;
            }
            BreakerState::Open { .. } | BreakerState::HalfOpen => {
                return Err(SyncError::CircuitOpen);
            }
        }
        Ok(BreakerPermit {
            breaker: self,
            settled: false,
        })
    }

    fn on_success(&self) {
        let mut state = self.lock();
        if !matches!(*state, BreakerState::Closed { .. }) {
            info!("circuit breaker closed; submissions resume normally");
        }
        *state = BreakerState::Closed {
            consecutive_failures: 0,
        };
    }

    fn on_failure(&self) {
        let mut state = self.lock();
        let next = match *state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.failure_threshold {
                    warn!(
                        "circuit breaker opened for {}s after {failures} consecutive failures",
                        self.open_for.as_secs()
                    );
                    BreakerState::Open {
                        until: Instant::now() + self.open_for,
                    }
                } else {
                    BreakerState::Closed {
                        consecutive_failures: failures,
                    }
                }
            }
            BreakerState::HalfOpen | BreakerState::Open { .. } => {
                warn!(
                    "circuit breaker trial failed; reopening for {}s",
                    self.open_for.as_secs()
                );
                BreakerState::Open {
                    until: Instant::now() + self.open_for,
                }
            }
        };
        *state = next;
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl From<&ResilienceSettings> for CircuitBreaker {
    fn from(settings: &ResilienceSettings) -> Self {
        Self::new(
            settings.breaker_failure_threshold,
            Duration::from_secs(settings.breaker_open_secs),
        )
    }
}

/// Admission ticket for one call. Dropping it unsettled counts as a failure,
/// so an abandoned trial cannot leave the breaker half-open forever.
#[must_use]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl BreakerPermit<'_> {
    pub fn succeeded(mut self) {
        self.settled = true;
        self.breaker.on_success();
    }

    pub fn failed(mut self) {
        self.settled = true;
        self.breaker.on_failure();
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_failure();
        }
    }
}
