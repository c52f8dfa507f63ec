//! Retry, per-attempt deadlines and circuit breaking around upstream calls.

pub mod circuit;
pub mod retry;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::{ResilienceError, TransportError};

pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitPermit, CircuitSnapshot, CircuitState};
pub use retry::RetryPolicy;

enum AttemptFailure {
    Timeout,
    Transport(TransportError),
}

/// Retry policy paired with the shared breaker. Cheap to clone; clones share
/// circuit state.
#[derive(Clone, Debug)]
pub struct Resilience {
    policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl Resilience {
    pub fn new(policy: RetryPolicy, breaker: Arc<CircuitBreaker>) -> Self {
        Self { policy, breaker }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Runs `operation` until it succeeds, is rejected, or the retry budget is
    /// spent. Transient failures and attempt timeouts are retried with backoff;
    /// rejections and decode failures return immediately and do not count
    /// against the circuit.
    pub async fn call<T, F, Fut>(&self, endpoint: &str, mut operation: F) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            let permit = self.breaker.acquire(endpoint)?;

            let failure = match tokio::time::timeout(self.policy.attempt_timeout, operation()).await {
                Ok(Ok(value)) => {
                    permit.success();
                    if attempt > 1 {
                        debug!(
                            event_name = "system.upstream.recovered",
                            endpoint, attempt, "upstream call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Ok(Err(error)) if !error.is_retryable() => {
                    permit.success();
                    return Err(ResilienceError::Upstream {
                        endpoint: endpoint.to_owned(),
                        attempts: attempt,
                        source: error,
                    });
                }
                Ok(Err(error)) => {
                    permit.failure();
                    AttemptFailure::Transport(error)
                }
                Err(_) => {
                    permit.failure();
                    AttemptFailure::Timeout
                }
            };

            if !self.policy.should_retry(attempt) {
                warn!(
                    event_name = "system.upstream.retries_exhausted",
                    endpoint,
                    attempts = attempt,
                    timed_out = matches!(failure, AttemptFailure::Timeout),
                    "upstream call failed"
                );
                return Err(match failure {
                    AttemptFailure::Timeout => ResilienceError::UpstreamTimeout {
                        endpoint: endpoint.to_owned(),
                        attempts: attempt,
                    },
                    AttemptFailure::Transport(source) => ResilienceError::Upstream {
                        endpoint: endpoint.to_owned(),
                        attempts: attempt,
                        source,
                    },
                });
            }

            let delay = self.policy.backoff(attempt);
            let reason = match &failure {
                AttemptFailure::Timeout => "attempt timed out".to_owned(),
                AttemptFailure::Transport(error) => error.to_string(),
            };
            warn!(
                event_name = "system.upstream.retry_scheduled",
                endpoint,
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %reason,
                "transient upstream failure; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
