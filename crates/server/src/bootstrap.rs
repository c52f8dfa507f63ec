use std::sync::Arc;

use pricelens_core::cache::CacheStoreError;
use pricelens_core::config::{AppConfig, ConfigError, LoadOptions, LogFormat};
use pricelens_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
use pricelens_core::SingleFlightCache;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::health::HealthState;

/// Process-scoped state, built once at start and drained at shutdown.
pub struct Application {
    pub config: AppConfig,
    pub breaker: Arc<CircuitBreaker>,
    pub cache: SingleFlightCache,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cache backend setup failed: {0}")]
    Cache(#[source] CacheStoreError),
}

/// Loads configuration, installs the log subscriber it describes, then builds
/// the shared state.
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    init_logging(&config);
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let cache = SingleFlightCache::from_config(&config.cache).await.map_err(BootstrapError::Cache)?;
    info!(
        event_name = "system.bootstrap.cache_ready",
        correlation_id = "bootstrap",
        backend = cache.backend().as_str(),
        ttl_secs = config.cache.ttl_secs,
        "model cache initialized"
    );

    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::from(&config.resilience)));
    info!(
        event_name = "system.bootstrap.breaker_ready",
        correlation_id = "bootstrap",
        failure_threshold = config.resilience.failure_threshold,
        cooldown_secs = config.resilience.cooldown_secs,
        "circuit breaker initialized"
    );

    Ok(Application { config, breaker, cache })
}

// A subscriber may already be installed (tests, embedding hosts); keep it.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

impl Application {
    pub fn health_state(&self) -> HealthState {
        HealthState::new(Arc::clone(&self.breaker), self.cache.backend())
    }

    /// Waits for in-flight transformations so their results land in the
    /// cache; gives up after `server.graceful_shutdown_secs`.
    pub async fn shutdown(&self) -> bool {
        let pending = self.cache.inflight_count();
        let drained = self.cache.drain(self.config.server.graceful_shutdown()).await;
        if drained {
            info!(
                event_name = "system.shutdown.drained",
                correlation_id = "shutdown",
                pending,
                "in-flight transformations settled"
            );
        } else {
            warn!(
                event_name = "system.shutdown.drain_timeout",
                correlation_id = "shutdown",
                pending,
                "in-flight transformations still running at shutdown"
            );
        }
        drained
    }
}
