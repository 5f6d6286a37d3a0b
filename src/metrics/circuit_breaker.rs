//! Circuit breaker for backing-store calls.
//!
//! Keeps one explicit CLOSED / OPEN / HALF_OPEN state machine per
//! backing-store dependency so a failing database stops receiving traffic
//! for a cooldown period instead of cascading timeouts into every request.
//!
//! Transition rules:
//! - CLOSED: calls pass through; `failure_threshold` consecutive failures
//!   open the circuit and record `opened_at`.
//! - OPEN: calls are rejected without I/O until `reset_timeout` elapses,
//!   then the next caller is admitted as the HALF_OPEN trial.
//! - HALF_OPEN: exactly one trial call; success closes the circuit and
//!   resets the failure count, failure reopens it and re-arms `opened_at`.

use super::error::{MetricsError, Result};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before allowing a trial.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Ask for permission to make one call.
    ///
    /// Holds the write lock across the open-to-half-open check so exactly
    /// one caller wins the trial slot after the reset timeout elapses.
    pub async fn try_acquire(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(false);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!("circuit breaker transitioned to half-open, admitting trial call");
                    Ok(())
                } else {
                    warn!("circuit breaker is open, rejecting call");
                    Err(MetricsError::CircuitOpen)
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    warn!("circuit breaker half-open trial already in flight, rejecting call");
                    Err(MetricsError::CircuitOpen)
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record the outcome of one logical call (after retries, not per
    /// attempt).
    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.trial_in_flight = false;
                info!("circuit breaker closed after successful trial");
            }
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.consecutive_failures += 1;

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
                warn!("circuit breaker reopened after failed trial");
            }
            CircuitState::Open => {
                debug!("failure recorded while circuit breaker already open");
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.read().await;
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            seconds_since_opened: inner.opened_at.map(|at| at.elapsed().as_secs()),
        }
    }

    /// Manually close the circuit and clear counters.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        debug!("circuit breaker manually reset");
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub seconds_since_opened: Option<u64>,
}

impl serde::Serialize for CircuitBreakerStats {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("CircuitBreakerStats", 3)?;

        let state_str = match self.state {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };

        s.serialize_field("state", state_str)?;
        s.serialize_field("consecutive_failures", &self.consecutive_failures)?;
        s.serialize_field("seconds_since_opened", &self.seconds_since_opened)?;
        s.end()
    }
}
