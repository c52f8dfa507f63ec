pub mod analysis;
pub mod model;
pub mod source;

pub use analysis::{
    AnalysisOperation, CandidateResult, Objective, OptimalResult, Requirements, Solver,
    SubscriptionFilters, SubscriptionSet, ValidationResult,
};
pub use model::{AddOn, ContextPlan, Plan, PricingContext, PricingModel, SourceTag};
pub use source::{Fingerprint, PricingSource};
