use serde::{Deserialize, Serialize};

use crate::domain::{AnalysisOperation, Fingerprint};
use crate::errors::SourceFetchError;
use crate::flows::states::{TransitionOutcome, WorkflowKind, WorkflowState};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSource {
    pub label: String,
    pub fingerprint: Fingerprint,
    pub saas_name: String,
    pub plans: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSource {
    pub label: String,
    pub fingerprint: Fingerprint,
    pub error: String,
    pub availability_failure: bool,
}

impl From<&SourceFetchError> for FailedSource {
    fn from(failure: &SourceFetchError) -> Self {
        Self {
            label: failure.label.clone(),
            fingerprint: failure.fingerprint.clone(),
            error: failure.cause.to_string(),
            availability_failure: failure.cause.is_availability_failure(),
        }
    }
}

/// Record of what the orchestrator decided for one request: which sources
/// resolved or failed, which analysis operations ran, and every transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub request_id: String,
    pub workflow: WorkflowKind,
    pub grounded: bool,
    pub refresh: bool,
    pub resolved_sources: Vec<ResolvedSource>,
    pub failed_sources: Vec<FailedSource>,
    pub operations_invoked: Vec<AnalysisOperation>,
    pub state: WorkflowState,
    pub steps: Vec<TransitionOutcome>,
}

impl WorkflowPlan {
    pub fn new(request_id: impl Into<String>, workflow: WorkflowKind) -> Self {
        Self {
            request_id: request_id.into(),
            workflow,
            grounded: false,
            refresh: false,
            resolved_sources: Vec::new(),
            failed_sources: Vec::new(),
            operations_invoked: Vec::new(),
            state: WorkflowState::ResolveSources,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: TransitionOutcome) {
        self.state = outcome.to;
        self.steps.push(outcome);
    }

    pub fn invocations_of(&self, operation: AnalysisOperation) -> usize {
        self.operations_invoked.iter().filter(|invoked| **invoked == operation).count()
    }
}
