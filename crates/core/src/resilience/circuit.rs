use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::ResilienceConfig;
use crate::errors::ResilienceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, cooldown: Duration::from_secs(30) }
    }
}

impl From<&ResilienceConfig> for CircuitBreakerConfig {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_secs(config.cooldown_secs),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub endpoint: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct EndpointHealth {
    state: CircuitState,
    consecutive_failures: u32,
    open_until: Option<Instant>,
    trial_in_flight: bool,
}

impl Default for EndpointHealth {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            open_until: None,
            trial_in_flight: false,
        }
    }
}

/// Per-endpoint failure tracking shared by every caller of an upstream.
///
/// A circuit opens after `failure_threshold` consecutive failed attempts and
/// rejects calls until `cooldown` elapses. The first caller after that becomes
/// the single trial call; its outcome closes or reopens the circuit.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    endpoints: DashMap<String, EndpointHealth>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config, endpoints: DashMap::new() }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn acquire(self: &Arc<Self>, endpoint: &str) -> Result<CircuitPermit, ResilienceError> {
        let now = Instant::now();
        let trial = {
            let mut health = self.endpoints.entry(endpoint.to_owned()).or_default();
            match health.state {
                CircuitState::Closed => false,
                CircuitState::Open => {
                    let open_until = health.open_until.unwrap_or(now);
                    if now < open_until {
                        return Err(ResilienceError::CircuitOpen {
                            endpoint: endpoint.to_owned(),
                            retry_after_ms: millis(open_until - now),
                        });
                    }
                    health.state = CircuitState::HalfOpen;
                    health.trial_in_flight = true;
                    true
                }
                CircuitState::HalfOpen => {
                    if health.trial_in_flight {
                        return Err(ResilienceError::CircuitOpen {
                            endpoint: endpoint.to_owned(),
                            retry_after_ms: millis(self.config.cooldown),
                        });
                    }
                    health.trial_in_flight = true;
                    true
                }
            }
        };

        if trial {
            info!(
                event_name = "system.circuit.trial_started",
                endpoint, "circuit cooldown elapsed; letting one trial call through"
            );
        }

        Ok(CircuitPermit {
            breaker: Arc::clone(self),
            endpoint: endpoint.to_owned(),
            trial,
            settled: false,
        })
    }

    pub fn state(&self, endpoint: &str) -> CircuitState {
        self.endpoints.get(endpoint).map(|health| health.state).unwrap_or(CircuitState::Closed)
    }

    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let mut snapshot: Vec<_> = self
            .endpoints
            .iter()
            .map(|entry| CircuitSnapshot {
                endpoint: entry.key().clone(),
                state: entry.value().state,
                consecutive_failures: entry.value().consecutive_failures,
            })
            .collect();
        snapshot.sort_by(|left, right| left.endpoint.cmp(&right.endpoint));
        snapshot
    }

    fn record_success(&self, endpoint: &str, trial: bool) {
        let Some(mut health) = self.endpoints.get_mut(endpoint) else {
            return;
        };
        // A non-trial call that started before the circuit opened says nothing
        // about the upstream now.
        if !trial && health.state != CircuitState::Closed {
            return;
        }
        if health.state != CircuitState::Closed {
            info!(event_name = "system.circuit.closed", endpoint, "trial call succeeded; circuit closed");
        }
        *health = EndpointHealth::default();
    }

    fn record_failure(&self, endpoint: &str, trial: bool) {
        let Some(mut health) = self.endpoints.get_mut(endpoint) else {
            return;
        };
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);

        let trip = if trial {
            health.trial_in_flight = false;
            true
        } else {
            health.state == CircuitState::Closed
                && health.consecutive_failures >= self.config.failure_threshold
        };

        if trip {
            health.state = CircuitState::Open;
            health.open_until = Some(Instant::now() + self.config.cooldown);
            warn!(
                event_name = "system.circuit.opened",
                endpoint,
                consecutive_failures = health.consecutive_failures,
                cooldown_ms = millis(self.config.cooldown),
                "circuit opened"
            );
        }
    }

    fn release_trial(&self, endpoint: &str) {
        if let Some(mut health) = self.endpoints.get_mut(endpoint) {
            health.trial_in_flight = false;
        }
    }
}

/// Admission to call an endpoint once. Settle it with [`CircuitPermit::success`]
/// or [`CircuitPermit::failure`]; dropping an unsettled trial frees the trial
/// slot for the next caller.
#[derive(Debug)]
pub struct CircuitPermit {
    breaker: Arc<CircuitBreaker>,
    endpoint: String,
    trial: bool,
    settled: bool,
}

impl CircuitPermit {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success(&self.endpoint, self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure(&self.endpoint, self.trial);
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial(&self.endpoint);
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
