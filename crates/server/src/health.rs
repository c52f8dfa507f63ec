use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use pricelens_core::config::CacheBackend;
use pricelens_core::resilience::{CircuitBreaker, CircuitSnapshot, CircuitState};
use pricelens_core::upstream::{ANALYSIS_ENDPOINT, TRANSFORMATION_ENDPOINT};
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    breaker: Arc<CircuitBreaker>,
    cache_backend: CacheBackend,
}

impl HealthState {
    pub fn new(breaker: Arc<CircuitBreaker>, cache_backend: CacheBackend) -> Self {
        Self { breaker, cache_backend }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cache_backend: CacheBackend,
    pub circuits: Vec<CircuitSnapshot>,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// `ready` only while every upstream circuit is closed.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let circuits = circuits(&state.breaker);
    let ready = circuits.iter().all(|circuit| circuit.state == CircuitState::Closed);

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        cache_backend: state.cache_backend,
        circuits,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn circuits(breaker: &CircuitBreaker) -> Vec<CircuitSnapshot> {
    let mut circuits = breaker.snapshot();
    for endpoint in [ANALYSIS_ENDPOINT, TRANSFORMATION_ENDPOINT] {
        if !circuits.iter().any(|circuit| circuit.endpoint == endpoint) {
            circuits.push(CircuitSnapshot {
                endpoint: endpoint.to_string(),
                state: CircuitState::Closed,
                consecutive_failures: 0,
            });
        }
    }
    circuits.sort_by(|left, right| left.endpoint.cmp(&right.endpoint));
    circuits
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{extract::State, http::StatusCode, Json};
    use pricelens_core::config::CacheBackend;
    use pricelens_core::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_is_ready_while_circuits_are_closed() {
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));

        let (status, Json(payload)) =
            health(State(HealthState::new(breaker, CacheBackend::Memory))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.cache_backend, CacheBackend::Memory);
        let endpoints: Vec<_> = payload.circuits.iter().map(|c| c.endpoint.as_str()).collect();
        assert_eq!(endpoints, vec!["analysis", "transformation"]);
    }

    #[tokio::test]
    async fn open_circuit_degrades_health() {
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(60),
        }));
        breaker.acquire("transformation").expect("closed circuit grants a permit").failure();

        let (status, Json(payload)) =
            health(State(HealthState::new(breaker, CacheBackend::Memory))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        let transformation = payload
            .circuits
            .iter()
            .find(|circuit| circuit.endpoint == "transformation")
            .expect("transformation circuit");
        assert_eq!(transformation.state, CircuitState::Open);
    }
}
