//! Orchestration and resilience core for answering SaaS pricing questions:
//! pricing-source transformation behind a single-flight cache, analysis
//! operations, and the per-request workflow state machine.

pub mod audit;
pub mod cache;
pub mod clients;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod resilience;
pub mod upstream;

pub use cache::{CacheStore, MemoryStore, SingleFlightCache};
pub use clients::{AnalysisClient, TransformationClient};
pub use domain::{
    AnalysisOperation, CandidateResult, Fingerprint, Objective, OptimalResult, PricingContext,
    PricingModel, PricingSource, Requirements, Solver, SubscriptionSet, ValidationResult,
};
pub use errors::{
    AggregateError, AnalysisError, InterfaceError, ResilienceError, SourceFetchError,
    TransformError, TransportError, TransportErrorKind, WorkflowError, WorkflowFailure,
};
pub use flows::{WorkflowKind, WorkflowPlan};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Resilience, RetryPolicy};
pub use upstream::{AnalysisRequest, AnalysisService, TargetFormat, TransformationService};
