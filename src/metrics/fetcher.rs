//! Resilient wrapper around backing-store calls.
//!
//! Composes the circuit breaker, the retry policy, and a per-attempt
//! timeout into one `call` entry point. The breaker sees one outcome per
//! logical call — an exhausted retry sequence counts as a single failure,
//! not one per attempt, so a slow store cannot flap the circuit open from
//! a single request.

use super::circuit_breaker::CircuitBreaker;
use super::error::{MetricsError, Result};
use super::retry::{RetryConfig, RetryPolicy};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct ResilientFetcher {
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl ResilientFetcher {
    pub fn new(
        breaker: Arc<CircuitBreaker>,
        retry_config: RetryConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            breaker,
            retry: RetryPolicy::new(retry_config),
            call_timeout,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Execute `f` under breaker, retry, and timeout protection.
    ///
    /// Each attempt is bounded by the call timeout independently of the
    /// backoff budget; a timed-out attempt is a transient failure. Only
    /// transient errors are retried.
    pub async fn call<F, Fut, T>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.breaker.try_acquire().await?;

        let timeout = self.call_timeout;
        let result = self
            .retry
            .execute_if(
                || {
                    let attempt = f();
                    async move {
                        match tokio::time::timeout(timeout, attempt).await {
                            Ok(outcome) => outcome,
                            Err(_) => Err(MetricsError::Timeout {
                                timeout_ms: timeout.as_millis() as u64,
                            }),
                        }
                    }
                },
                MetricsError::is_transient,
            )
            .await;

        match &result {
            Err(e) if e.is_transient() => {
                warn!(operation, error = %e, "backing store call failed after retries");
                self.breaker.record_failure().await;
            }
            // A deterministic error still proves the store answered, so it
            // counts as a healthy outcome for the breaker.
            Ok(_) | Err(_) => {
                debug!(operation, "backing store call completed");
                self.breaker.record_success().await;
            }
        }

        result
    }
}
