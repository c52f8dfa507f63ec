use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AnalysisOperation, Fingerprint};
use crate::flows::{FlowTransitionError, WorkflowKind, WorkflowPlan};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// Connection failures, 5xx and 429 responses.
    Transient,
    /// 4xx responses and failures the service reported about the input itself.
    Rejected,
    /// The response arrived but could not be decoded.
    Decode,
}

/// Raw outcome of one upstream attempt, as classified by a service implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub status: Option<u16>,
    /// Machine-readable cause reported by the upstream, when it sent one.
    pub cause: Option<String>,
    pub message: String,
}

impl TransportError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: TransportErrorKind::Transient, status: None, cause: None, message: message.into() }
    }

    pub fn rejected(status: Option<u16>, message: impl Into<String>) -> Self {
        Self { kind: TransportErrorKind::Rejected, status, cause: None, message: message.into() }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self { kind: TransportErrorKind::Decode, status: None, cause: None, message: message.into() }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == TransportErrorKind::Transient
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResilienceError {
    #[error("upstream `{endpoint}` timed out after {attempts} attempt(s)")]
    UpstreamTimeout { endpoint: String, attempts: u32 },
    #[error("upstream `{endpoint}` failed after {attempts} attempt(s): {source}")]
    Upstream {
        endpoint: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error("circuit for upstream `{endpoint}` is open; retry in {retry_after_ms}ms")]
    CircuitOpen { endpoint: String, retry_after_ms: u64 },
}

impl ResilienceError {
    /// True when the upstream could not be reached or kept failing, as opposed
    /// to answering with a rejection.
    pub fn is_availability_failure(&self) -> bool {
        match self {
            Self::UpstreamTimeout { .. } | Self::CircuitOpen { .. } => true,
            Self::Upstream { source, .. } => source.is_retryable(),
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Self::UpstreamTimeout { endpoint, .. }
            | Self::Upstream { endpoint, .. }
            | Self::CircuitOpen { endpoint, .. } => endpoint,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error(transparent)]
    Upstream(#[from] ResilienceError),
    #[error("transformation returned a malformed model for {fingerprint}: {reason}")]
    MalformedModel { fingerprint: Fingerprint, reason: String },
    #[error("transformation of {fingerprint} ended without producing a result")]
    Interrupted { fingerprint: Fingerprint },
}

impl TransformError {
    pub fn is_availability_failure(&self) -> bool {
        match self {
            Self::Upstream(error) => error.is_availability_failure(),
            Self::MalformedModel { .. } => false,
            Self::Interrupted { .. } => true,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("pricing source `{label}` failed: {cause}")]
pub struct SourceFetchError {
    pub label: String,
    pub fingerprint: Fingerprint,
    #[source]
    pub cause: TransformError,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("all {} pricing source(s) failed", failures.len())]
    AllSourcesFailed { failures: Vec<SourceFetchError> },
}

impl AggregateError {
    pub fn failures(&self) -> &[SourceFetchError] {
        match self {
            Self::AllSourcesFailed { failures } => failures,
        }
    }

    /// Every source failed for availability reasons, i.e. the transformation
    /// upstream is down rather than unable to read these particular inputs.
    pub fn is_outage(&self) -> bool {
        let failures = self.failures();
        !failures.is_empty() && failures.iter().all(|failure| failure.cause.is_availability_failure())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("analysis operation `{}` failed: {cause}", operation.as_str())]
    Upstream {
        operation: AnalysisOperation,
        #[source]
        cause: ResilienceError,
    },
    #[error("analysis operation `{}` returned an unreadable result: {reason}", operation.as_str())]
    MalformedResult { operation: AnalysisOperation, reason: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowFailure {
    #[error(transparent)]
    AllSourcesFailed(#[from] AggregateError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
}

/// Failure surfaced to the caller. The plan trace up to the failing step is
/// kept for diagnostics.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{workflow} workflow failed: {cause}")]
pub struct WorkflowError {
    pub workflow: WorkflowKind,
    #[source]
    pub cause: WorkflowFailure,
    pub plan: Box<WorkflowPlan>,
}

impl WorkflowError {
    pub fn user_message(&self) -> &'static str {
        match &self.cause {
            WorkflowFailure::AllSourcesFailed(_) => {
                "None of the pricing sources could be transformed because the transformation service is unavailable. Please retry shortly."
            }
            WorkflowFailure::Analysis(AnalysisError::Upstream { cause, .. })
                if cause.is_availability_failure() =>
            {
                "The pricing analysis service is temporarily unavailable. Please retry shortly."
            }
            WorkflowFailure::Analysis(AnalysisError::Upstream { .. }) => {
                "The pricing analysis service rejected the request. Check the pricing data and requirements."
            }
            WorkflowFailure::Analysis(AnalysisError::MalformedResult { .. }) => {
                "The pricing analysis service returned a result that could not be interpreted."
            }
            WorkflowFailure::Flow(_) => "The request could not be completed due to an internal error.",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        match self.cause {
            WorkflowFailure::AllSourcesFailed(_) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            WorkflowFailure::Analysis(AnalysisError::Upstream { cause, .. }) => {
                if cause.is_availability_failure() {
                    InterfaceError::ServiceUnavailable { message, correlation_id }
                } else {
                    InterfaceError::BadRequest { message, correlation_id }
                }
            }
            WorkflowFailure::Analysis(AnalysisError::MalformedResult { .. })
            | WorkflowFailure::Flow(_) => InterfaceError::Internal { message, correlation_id },
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}
