pub mod ask;
pub mod config;
pub mod doctor;

use std::sync::Arc;

use pricelens_agent::WorkflowOrchestrator;
use pricelens_core::config::AppConfig;
use pricelens_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
use pricelens_core::SingleFlightCache;
use pricelens_upstream::{HttpAnalysisService, HttpTransformationService};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

fn current_thread_runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to initialize async runtime: {error}"))
}

/// Same wiring as the server, scoped to one command invocation.
async fn build_orchestrator(config: &AppConfig) -> Result<WorkflowOrchestrator, String> {
    let transformation = HttpTransformationService::from_config(&config.transformation)
        .map_err(|error| error.to_string())?;
    let analysis =
        HttpAnalysisService::from_config(&config.analysis).map_err(|error| error.to_string())?;
    let cache = SingleFlightCache::from_config(&config.cache).await.map_err(|error| error.to_string())?;
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::from(&config.resilience)));

    Ok(WorkflowOrchestrator::from_config(
        config,
        Arc::new(transformation),
        Arc::new(analysis),
        cache,
        breaker,
    ))
}
