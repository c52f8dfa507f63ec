use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    TransitionOutcome, WorkflowAction, WorkflowContext, WorkflowEvent, WorkflowKind, WorkflowState,
};

pub trait FlowDefinition {
    fn workflow(&self) -> WorkflowKind;
    fn initial_state(&self) -> WorkflowState;
    fn transition(
        &self,
        current: &WorkflowState,
        event: &WorkflowEvent,
        context: &WorkflowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Resolve sources, build context, run the analysis operation matching the
/// workflow kind, assemble the answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PricingWorkflow {
    kind: WorkflowKind,
}

impl PricingWorkflow {
    pub fn new(kind: WorkflowKind) -> Self {
        Self { kind }
    }
}

impl FlowDefinition for PricingWorkflow {
    fn workflow(&self) -> WorkflowKind {
        self.kind
    }

    fn initial_state(&self) -> WorkflowState {
        WorkflowState::ResolveSources
    }

    fn transition(
        &self,
        current: &WorkflowState,
        event: &WorkflowEvent,
        context: &WorkflowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_pricing(self.kind, current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn workflow(&self) -> WorkflowKind {
        self.flow.workflow()
    }

    pub fn initial_state(&self) -> WorkflowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &WorkflowState,
        event: &WorkflowEvent,
        context: &WorkflowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &WorkflowState,
        event: &WorkflowEvent,
        context: &WorkflowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.correlation_id.clone(),
                        "workflow.transition_applied",
                        AuditCategory::Workflow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("workflow", self.workflow().as_str())
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.correlation_id.clone(),
                        "workflow.transition_rejected",
                        AuditCategory::Workflow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("workflow", self.workflow().as_str())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("cannot build a grounded context from {state:?}: no source resolved")]
    NoResolvedSources { state: WorkflowState },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: WorkflowState, event: WorkflowEvent },
}

fn transition_pricing(
    kind: WorkflowKind,
    current: &WorkflowState,
    event: &WorkflowEvent,
    context: &WorkflowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use WorkflowAction::{ComposeGeneralGuidance, ComposeGroundedAnswer, FanOutSources, InvokeAnalysis};
    use WorkflowEvent::{
        AggregationFailed, AnalysisCompleted, AnalysisFailed, ContextBuilt, ContextEmpty,
        ResultAssembled, SourcesResolved,
    };
    use WorkflowState::{AssembleResult, BuildContext, Completed, Failed, ResolveSources, SelectWorkflow};

    let (to, actions) = match (current, event) {
        (ResolveSources, SourcesResolved) => (BuildContext, vec![FanOutSources]),
        (BuildContext, ContextBuilt) => {
            if context.resolved_sources == 0 {
                return Err(FlowTransitionError::NoResolvedSources { state: *current });
            }
            (SelectWorkflow, vec![InvokeAnalysis(kind.analysis_operation())])
        }
        (BuildContext, ContextEmpty) => (AssembleResult, vec![ComposeGeneralGuidance]),
        (BuildContext, AggregationFailed) | (SelectWorkflow, AnalysisFailed) => (Failed, Vec::new()),
        (SelectWorkflow, AnalysisCompleted) => (AssembleResult, vec![ComposeGroundedAnswer]),
        (AssembleResult, ResultAssembled) => (Completed, Vec::new()),
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: *event });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}
