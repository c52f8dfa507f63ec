use std::fs;
use std::path::PathBuf;

use pricelens_agent::WorkflowRequest;
use pricelens_core::config::{AppConfig, LoadOptions};
use pricelens_core::domain::{Objective, PricingSource, Requirements, Solver};
use pricelens_core::errors::{AnalysisError, InterfaceError, WorkflowFailure};
use pricelens_core::WorkflowKind;

use super::{build_orchestrator, current_thread_runtime, CommandResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceArgs {
    pub urls: Vec<String>,
    pub documents: Vec<PathBuf>,
    pub refresh: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AskArgs {
    pub workflow: WorkflowKind,
    pub question: String,
    pub sources: SourceArgs,
    pub seats: Option<u32>,
    pub features: Vec<String>,
    pub objective: Option<Objective>,
    pub solver: Option<Solver>,
}

pub fn run(args: AskArgs) -> CommandResult {
    let command = "ask";
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure(command, "config_validation", error.to_string(), 2),
    };
    let sources = match read_sources(&args.sources) {
        Ok(sources) => sources,
        Err(message) => return CommandResult::failure(command, "input", message, 2),
    };

    let mut requirements = Requirements {
        objective: args.objective.unwrap_or_default(),
        solver: args.solver.unwrap_or(config.analysis.solver),
        ..Requirements::default()
    };
    requirements.filters.seats = args.seats;
    requirements.filters.required_features = args.features;

    let request = WorkflowRequest {
        question: args.question,
        sources,
        requirements,
        refresh: args.sources.refresh,
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(message) => return CommandResult::failure(command, "runtime", message, 4),
    };
    let outcome = runtime.block_on(async {
        let orchestrator = build_orchestrator(&config).await?;
        Ok::<_, String>(orchestrator.run(args.workflow, &request).await)
    });

    match outcome {
        Err(message) => CommandResult::failure(command, "bootstrap", message, 4),
        Ok(Ok(result)) => match serde_json::to_string_pretty(&result) {
            Ok(output) => CommandResult { exit_code: 0, output },
            Err(error) => CommandResult::failure(command, "serialization", error.to_string(), 4),
        },
        Ok(Err(error)) => {
            let correlation_id = error.plan.request_id.clone();
            let interface = error.into_interface(correlation_id);
            interface_failure(command, &interface)
        }
    }
}

pub fn validate(args: SourceArgs) -> CommandResult {
    let command = "validate";
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure(command, "config_validation", error.to_string(), 2),
    };
    let sources = match read_sources(&args) {
        Ok(sources) => sources,
        Err(message) => return CommandResult::failure(command, "input", message, 2),
    };
    let request = WorkflowRequest { sources, refresh: args.refresh, ..WorkflowRequest::default() };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(message) => return CommandResult::failure(command, "runtime", message, 4),
    };
    let outcome = runtime.block_on(async {
        let orchestrator = build_orchestrator(&config).await?;
        Ok::<_, String>(orchestrator.run_validation(&request).await)
    });

    match outcome {
        Err(message) => CommandResult::failure(command, "bootstrap", message, 4),
        Ok(Ok(report)) => {
            let valid = report.result.as_ref().map_or(true, |result| result.valid);
            match serde_json::to_string_pretty(&report) {
                Ok(output) => CommandResult { exit_code: if valid { 0 } else { 1 }, output },
                Err(error) => CommandResult::failure(command, "serialization", error.to_string(), 4),
            }
        }
        Ok(Err(failure)) => {
            let error_class = match &failure {
                WorkflowFailure::AllSourcesFailed(_) => "service_unavailable",
                WorkflowFailure::Analysis(AnalysisError::Upstream { cause, .. })
                    if cause.is_availability_failure() =>
                {
                    "service_unavailable"
                }
                WorkflowFailure::Analysis(AnalysisError::Upstream { .. }) => "bad_request",
                WorkflowFailure::Analysis(AnalysisError::MalformedResult { .. })
                | WorkflowFailure::Flow(_) => "internal",
            };
            CommandResult::failure(command, error_class, failure.to_string(), 3)
        }
    }
}

fn read_sources(args: &SourceArgs) -> Result<Vec<PricingSource>, String> {
    let mut sources = Vec::with_capacity(args.urls.len() + args.documents.len());
    for url in &args.urls {
        let source = PricingSource::url(url.as_str());
        if source.is_blank() {
            return Err("--url must not be empty".to_string());
        }
        sources.push(source);
    }
    for path in &args.documents {
        let content = fs::read_to_string(path)
            .map_err(|error| format!("failed to read document `{}`: {error}", path.display()))?;
        let source = PricingSource::document(content);
        if source.is_blank() {
            return Err(format!("document `{}` is empty", path.display()));
        }
        sources.push(source);
    }
    Ok(sources)
}

fn interface_failure(command: &str, error: &InterfaceError) -> CommandResult {
    let error_class = match error {
        InterfaceError::BadRequest { .. } => "bad_request",
        InterfaceError::ServiceUnavailable { .. } => "service_unavailable",
        InterfaceError::Internal { .. } => "internal",
    };
    CommandResult::failure(
        command,
        error_class,
        format!("{} ({error}; correlation_id={})", error.user_message(), error.correlation_id()),
        3,
    )
}
