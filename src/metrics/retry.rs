//! Bounded exponential-backoff retry for backing-store calls.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `f`, retrying failures that satisfy `retryable` with exponential
    /// backoff. Deterministic failures (validation, calculation, not-found)
    /// must report non-retryable and propagate immediately — retrying them
    /// cannot change the outcome.
    pub async fn execute_if<F, Fut, T, E, R>(&self, mut f: F, retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        let mut delay = self.config.initial_delay;

        loop {
            attempt += 1;

            match f().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!("retry succeeded on attempt {}", attempt);
                    }
                    return Ok(result);
                }
                Err(error) if !retryable(&error) => {
                    debug!("non-retryable error on attempt {}: {}", attempt, error);
                    return Err(error);
                }
                Err(error) if attempt >= self.config.max_attempts => {
                    warn!("all {} retry attempts exhausted", self.config.max_attempts);
                    return Err(error);
                }
                Err(error) => {
                    warn!(
                        "attempt {} failed: {}. Retrying in {:?}",
                        attempt, error, delay
                    );

                    sleep(delay).await;

                    delay = self.calculate_next_delay(delay);
                }
            }
        }
    }

    fn calculate_next_delay(&self, current_delay: Duration) -> Duration {
        let mut next_delay = Duration::from_secs_f64(
            current_delay.as_secs_f64() * self.config.backoff_multiplier,
        );

        if self.config.jitter {
            let jitter_amount = next_delay.as_secs_f64() * 0.1 * rand::random::<f64>();
            next_delay = Duration::from_secs_f64(next_delay.as_secs_f64() + jitter_amount);
        }

        if next_delay > self.config.max_delay {
            next_delay = self.config.max_delay;
        }

        next_delay
    }
}
