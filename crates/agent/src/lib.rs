//! Request-level orchestration: fan a request's pricing sources out through
//! the transformation client, merge what resolved, run the analysis operation
//! its workflow names and compose a deterministic answer.
//!
//! Answers never invent numbers. Prices, costs and cardinalities are quoted
//! from the analysis service; without grounding the orchestrator says so and
//! falls back to general guidance.

pub mod aggregator;
pub mod answer;
pub mod runtime;

#[cfg(test)]
mod testing;

pub use aggregator::{AggregateResult, SourceAggregator};
pub use runtime::{
    AnalysisPayload, ValidationReport, WorkflowOrchestrator, WorkflowRequest, WorkflowResult,
};
