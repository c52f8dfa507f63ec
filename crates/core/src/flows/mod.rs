pub mod engine;
pub mod states;
pub mod trace;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, PricingWorkflow};
pub use states::{
    TransitionOutcome, WorkflowAction, WorkflowContext, WorkflowEvent, WorkflowKind, WorkflowState,
};
pub use trace::{FailedSource, ResolvedSource, WorkflowPlan};
