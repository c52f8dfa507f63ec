use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::AnalysisOperation;

/// The closed set of pricing-question workflows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Summary,
    Subscriptions,
    Optimal,
}

impl WorkflowKind {
    pub const ALL: [Self; 3] = [Self::Summary, Self::Subscriptions, Self::Optimal];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Subscriptions => "subscriptions",
            Self::Optimal => "optimal",
        }
    }

    pub fn analysis_operation(self) -> AnalysisOperation {
        match self {
            Self::Summary => AnalysisOperation::Summary,
            Self::Subscriptions => AnalysisOperation::Subscriptions,
            Self::Optimal => AnalysisOperation::Optimal,
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "summary" => Ok(Self::Summary),
            "subscriptions" => Ok(Self::Subscriptions),
            "optimal" => Ok(Self::Optimal),
            other => Err(format!(
                "unknown workflow `{other}` (expected summary|subscriptions|optimal)"
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    ResolveSources,
    BuildContext,
    SelectWorkflow,
    AssembleResult,
    Completed,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEvent {
    SourcesResolved,
    ContextBuilt,
    /// No grounding: zero sources, or every source failed while the upstream was up.
    ContextEmpty,
    AggregationFailed,
    AnalysisCompleted,
    AnalysisFailed,
    ResultAssembled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkflowContext {
    pub resolved_sources: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "operation")]
pub enum WorkflowAction {
    FanOutSources,
    InvokeAnalysis(AnalysisOperation),
    ComposeGroundedAnswer,
    ComposeGeneralGuidance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub event: WorkflowEvent,
    pub actions: Vec<WorkflowAction>,
}
