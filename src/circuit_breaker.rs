//! Circuit Breaker
//!
//! Gates access to the remote backend after repeated failures. Three states:
//!
//! ```text
//! Closed   --failure_threshold consecutive failures-->  Open
//! Open     --is_allowed() after reset_timeout------->   HalfOpen
//! HalfOpen --record_success()----------------------->   Closed
//! HalfOpen --record_failure()----------------------->   Open
//! ```
//!
//! The Open -> HalfOpen transition happens only inside [`CircuitBreaker::is_allowed`].

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation, every attempt allowed
    Closed,
    /// Failing fast until the reset timeout elapses
    Open,
    /// One trial decides whether to close or reopen
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Consecutive-failure circuit breaker
///
/// All reads and writes of the state go through one lock.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
    pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);

    #[must_use]
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
            }),
        }
    }

    /// Whether a new attempt may proceed
    ///
    /// In `Open`, returns `true` and moves to `HalfOpen` once `reset_timeout`
    /// has elapsed since the last failure.
    pub fn is_allowed(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map_or(Duration::MAX, |at| at.elapsed());
                if elapsed >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    info!("Circuit breaker half-open, allowing trial operation");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::Open => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.last_failure_time = None;
                info!("Circuit breaker closed after successful trial");
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.last_failure_time = Some(Instant::now());
                    warn!(
                        failures = inner.failure_count,
                        reset_timeout_secs = self.reset_timeout.as_secs_f64(),
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.last_failure_time = Some(Instant::now());
                warn!("Circuit breaker trial failed, reopening");
            }
            // Stays open until is_allowed() observes the timeout
            CircuitState::Open => inner.failure_count = inner.failure_count.saturating_add(1),
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    #[must_use]
    pub fn last_failure_time(&self) -> Option<Instant> {
        self.inner.lock().last_failure_time
    }

    #[must_use]
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    #[must_use]
    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FAILURE_THRESHOLD, Self::DEFAULT_RESET_TIMEOUT)
    }
}
