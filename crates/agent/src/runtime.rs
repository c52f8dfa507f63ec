use std::sync::Arc;

use pricelens_core::audit::{AuditContext, AuditSink, TracingAuditSink};
use pricelens_core::config::AppConfig;
use pricelens_core::domain::{
    OptimalResult, PricingContext, PricingSource, Requirements, SubscriptionSet, ValidationResult,
};
use pricelens_core::errors::{AggregateError, SourceFetchError, WorkflowError, WorkflowFailure};
use pricelens_core::flows::{
    FailedSource, FlowEngine, PricingWorkflow, ResolvedSource, WorkflowContext, WorkflowEvent,
    WorkflowKind, WorkflowPlan,
};
use pricelens_core::upstream::{AnalysisService, TransformationService};
use pricelens_core::{
    AnalysisClient, CircuitBreaker, Resilience, RetryPolicy, SingleFlightCache, TransformationClient,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::{AggregateResult, SourceAggregator};
use crate::answer;

const ACTOR: &str = "pricelens.orchestrator";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    /// Carried into logs and the answer context only; sources are never
    /// extracted from it.
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub sources: Vec<PricingSource>,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default)]
    pub refresh: bool,
}

impl WorkflowRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), ..Self::default() }
    }

    pub fn with_source(mut self, source: PricingSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn refreshed(mut self) -> Self {
        self.refresh = true;
        self
    }
}

/// Raw analysis output, serialized as the service returned it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AnalysisPayload {
    Summary(Value),
    Subscriptions(SubscriptionSet),
    Optimal(OptimalResult),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkflowResult {
    pub answer: String,
    pub plan: WorkflowPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisPayload>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub request_id: String,
    pub resolved_sources: Vec<ResolvedSource>,
    pub failed_sources: Vec<FailedSource>,
    /// `None` when no source resolved, so there was nothing to validate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ValidationResult>,
}

/// Runs one request through resolve, build, select and assemble. Holds only
/// shared handles, so one orchestrator serves concurrent requests.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    aggregator: SourceAggregator,
    analysis: AnalysisClient,
    audit: Arc<dyn AuditSink>,
}

impl WorkflowOrchestrator {
    pub fn new(aggregator: SourceAggregator, analysis: AnalysisClient) -> Self {
        Self { aggregator, analysis, audit: Arc::new(TracingAuditSink) }
    }

    /// Wires both clients from configuration. The breaker is shared so one
    /// health view covers every endpoint; attempt timeouts differ per service.
    pub fn from_config(
        config: &AppConfig,
        transformation: Arc<dyn TransformationService>,
        analysis: Arc<dyn AnalysisService>,
        cache: SingleFlightCache,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let transformation_resilience = Resilience::new(
            RetryPolicy::from_config(&config.resilience, config.transformation.timeout()),
            Arc::clone(&breaker),
        );
        let analysis_resilience = Resilience::new(
            RetryPolicy::from_config(&config.resilience, config.analysis.timeout()),
            breaker,
        );
        let transformation = TransformationClient::new(transformation, transformation_resilience, cache)
            .with_format(config.transformation.format);

        Self::new(
            SourceAggregator::new(transformation),
            AnalysisClient::new(analysis, analysis_resilience),
        )
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn aggregator(&self) -> &SourceAggregator {
        &self.aggregator
    }

    pub async fn run_summary(&self, request: &WorkflowRequest) -> Result<WorkflowResult, WorkflowError> {
        self.run(WorkflowKind::Summary, request).await
    }

    pub async fn run_subscriptions(
        &self,
        request: &WorkflowRequest,
    ) -> Result<WorkflowResult, WorkflowError> {
        self.run(WorkflowKind::Subscriptions, request).await
    }

    pub async fn run_optimal(&self, request: &WorkflowRequest) -> Result<WorkflowResult, WorkflowError> {
        self.run(WorkflowKind::Optimal, request).await
    }

    pub async fn run(
        &self,
        kind: WorkflowKind,
        request: &WorkflowRequest,
    ) -> Result<WorkflowResult, WorkflowError> {
        let mut run = Run::new(self.audit.as_ref(), kind, request);
        info!(
            event_name = "workflow.orchestrator.started",
            correlation_id = %run.plan.request_id,
            workflow = kind.as_str(),
            sources = request.sources.len(),
            question = %request.question,
            "workflow started"
        );

        run.advance(WorkflowEvent::SourcesResolved)?;

        let aggregated = match self.aggregator.aggregate_with(&request.sources, request.refresh).await {
            Ok(aggregated) => aggregated,
            Err(error) if error.is_outage() => {
                run.record_failures(error.failures());
                run.advance(WorkflowEvent::AggregationFailed)?;
                return Err(run.fail(error.into()));
            }
            Err(error) => {
                // The upstream answered for every source, so this is missing
                // grounding rather than an outage.
                run.record_failures(error.failures());
                return run.ungrounded();
            }
        };
        let AggregateResult { context, resolved, failures } = aggregated;
        run.record_failures(&failures);
        if context.is_empty() {
            return run.ungrounded();
        }

        run.plan.grounded = true;
        run.plan.resolved_sources = resolved;
        run.context.resolved_sources = context.source_count();
        run.advance(WorkflowEvent::ContextBuilt)?;

        run.plan.operations_invoked.push(kind.analysis_operation());
        let analysis = match kind {
            WorkflowKind::Summary => {
                self.analysis.summarize(&context).await.map(AnalysisPayload::Summary)
            }
            WorkflowKind::Subscriptions => self
                .analysis
                .enumerate_subscriptions(&context, &request.requirements)
                .await
                .map(AnalysisPayload::Subscriptions),
            WorkflowKind::Optimal => self
                .analysis
                .optimal_subscription(&context, &request.requirements)
                .await
                .map(AnalysisPayload::Optimal),
        };
        let payload = match analysis {
            Ok(payload) => payload,
            Err(error) => {
                run.advance(WorkflowEvent::AnalysisFailed)?;
                return Err(run.fail(error.into()));
            }
        };
        run.advance(WorkflowEvent::AnalysisCompleted)?;

        let answer = grounded_answer(&context, &payload, &run.plan.failed_sources);
        run.finish(answer, Some(payload))
    }

    /// Aggregates the sources and asks the analysis service to validate them.
    /// Findings are data in the report; only an outage or a failed analysis
    /// call is an error.
    pub async fn run_validation(
        &self,
        request: &WorkflowRequest,
    ) -> Result<ValidationReport, WorkflowFailure> {
        let request_id = Uuid::new_v4().to_string();
        let (context, resolved_sources, failed_sources) =
            match self.aggregator.aggregate_with(&request.sources, request.refresh).await {
                Ok(AggregateResult { context, resolved, failures }) => {
                    (context, resolved, failures.iter().map(FailedSource::from).collect())
                }
                Err(error) if error.is_outage() => return Err(error.into()),
                Err(AggregateError::AllSourcesFailed { failures }) => (
                    PricingContext::default(),
                    Vec::new(),
                    failures.iter().map(FailedSource::from).collect(),
                ),
            };

        let result = if context.is_empty() {
            None
        } else {
            Some(self.analysis.validate(&context).await?)
        };
        info!(
            event_name = "workflow.validation.completed",
            correlation_id = %request_id,
            valid = ?result.as_ref().map(|r| r.valid),
            "validation completed"
        );

        Ok(ValidationReport { request_id, resolved_sources, failed_sources, result })
    }
}

fn grounded_answer(context: &PricingContext, payload: &AnalysisPayload, failed: &[FailedSource]) -> String {
    match payload {
        AnalysisPayload::Summary(value) => answer::summary_answer(context, value, failed),
        AnalysisPayload::Subscriptions(set) => answer::subscriptions_answer(context, set, failed),
        AnalysisPayload::Optimal(result) => answer::optimal_answer(context, result, failed),
    }
}

/// Per-request state: the engine position, the plan trace being filled and
/// the audit context every transition is reported under.
struct Run<'a> {
    engine: FlowEngine<PricingWorkflow>,
    sink: &'a dyn AuditSink,
    audit: AuditContext,
    context: WorkflowContext,
    plan: WorkflowPlan,
}

impl<'a> Run<'a> {
    fn new(sink: &'a dyn AuditSink, kind: WorkflowKind, request: &WorkflowRequest) -> Self {
        let request_id = Uuid::new_v4().to_string();
        let mut plan = WorkflowPlan::new(request_id.clone(), kind);
        plan.refresh = request.refresh;
        Self {
            engine: FlowEngine::new(PricingWorkflow::new(kind)),
            sink,
            audit: AuditContext::new(request_id, ACTOR),
            context: WorkflowContext::default(),
            plan,
        }
    }

    fn advance(&mut self, event: WorkflowEvent) -> Result<(), WorkflowError> {
        match self.engine.apply_with_audit(&self.plan.state, &event, &self.context, self.sink, &self.audit) {
            Ok(outcome) => {
                self.plan.record(outcome);
                Ok(())
            }
            Err(error) => Err(self.fail(error.into())),
        }
    }

    fn record_failures(&mut self, failures: &[SourceFetchError]) {
        self.plan.failed_sources.extend(failures.iter().map(FailedSource::from));
    }

    fn ungrounded(mut self) -> Result<WorkflowResult, WorkflowError> {
        self.advance(WorkflowEvent::ContextEmpty)?;
        let answer = answer::general_guidance(self.engine.workflow(), &self.plan.failed_sources);
        self.finish(answer, None)
    }

    fn finish(
        mut self,
        answer: String,
        result: Option<AnalysisPayload>,
    ) -> Result<WorkflowResult, WorkflowError> {
        self.advance(WorkflowEvent::ResultAssembled)?;
        info!(
            event_name = "workflow.orchestrator.completed",
            correlation_id = %self.plan.request_id,
            workflow = self.engine.workflow().as_str(),
            grounded = self.plan.grounded,
            resolved = self.plan.resolved_sources.len(),
            failed = self.plan.failed_sources.len(),
            "workflow completed"
        );
        Ok(WorkflowResult { answer, plan: self.plan, result })
    }

    fn fail(&self, cause: WorkflowFailure) -> WorkflowError {
        warn!(
            event_name = "workflow.orchestrator.failed",
            correlation_id = %self.plan.request_id,
            workflow = self.engine.workflow().as_str(),
            error = %cause,
            "workflow failed"
        );
        WorkflowError { workflow: self.engine.workflow(), cause, plan: Box::new(self.plan.clone()) }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pricelens_core::audit::InMemoryAuditSink;
    use pricelens_core::domain::{AnalysisOperation, PricingSource, Requirements};
    use pricelens_core::errors::{InterfaceError, WorkflowFailure};
    use pricelens_core::flows::{WorkflowKind, WorkflowState};
    use serde_json::json;

    use super::{AnalysisPayload, WorkflowOrchestrator, WorkflowRequest};
    use crate::aggregator::SourceAggregator;
    use crate::testing::{analysis_client, transformation_client, FakeAnalysis, FakeTransformation};

    fn orchestrator(
        transformation: Arc<FakeTransformation>,
        analysis: Arc<FakeAnalysis>,
    ) -> WorkflowOrchestrator {
        WorkflowOrchestrator::new(
            SourceAggregator::new(transformation_client(transformation)),
            analysis_client(analysis),
        )
    }

    #[tokio::test]
    async fn optimal_without_sources_returns_general_guidance_and_skips_analysis() {
        let analysis = Arc::new(FakeAnalysis::default());
        let orchestrator = orchestrator(Arc::new(FakeTransformation::default()), analysis.clone());

        let result = orchestrator
            .run_optimal(&WorkflowRequest::new("best plan for 5 seats"))
            .await
            .expect("ungrounded is not a failure");

        assert!(result.answer.starts_with("No pricing data was available"));
        assert!(!result.plan.grounded);
        assert!(result.plan.operations_invoked.is_empty());
        assert_eq!(result.plan.state, WorkflowState::Completed);
        assert!(result.result.is_none());
        assert_eq!(analysis.calls(), 0);
    }

    #[tokio::test]
    async fn summary_with_one_source_invokes_summary_exactly_once() {
        let analysis = Arc::new(FakeAnalysis::default());
        let orchestrator = orchestrator(Arc::new(FakeTransformation::default()), analysis.clone());
        let request = WorkflowRequest::new("summarize acme")
            .with_source(PricingSource::url("https://acme.example/pricing"));

        let result = orchestrator.run_summary(&request).await.expect("summary");

        assert_eq!(result.plan.resolved_sources.len(), 1);
        assert_eq!(result.plan.invocations_of(AnalysisOperation::Summary), 1);
        assert_eq!(analysis.operations(), vec![AnalysisOperation::Summary]);
        assert!(matches!(result.result, Some(AnalysisPayload::Summary(_))));
        assert!(result.answer.contains("Pricing summary for"));
    }

    #[tokio::test]
    async fn concurrent_requests_for_one_source_share_a_single_transformation() {
        let transformation = Arc::new(FakeTransformation::default().with_delay_ms(20));
        let orchestrator =
            orchestrator(transformation.clone(), Arc::new(FakeAnalysis::default()));
        let source = PricingSource::url("https://acme.example/pricing");
        let request = WorkflowRequest::new("plans?")
            .with_source(source.clone())
            .with_source(source.clone());

        let (first, second, third) = tokio::join!(
            orchestrator.run_summary(&request),
            orchestrator.run_subscriptions(&request),
            orchestrator.run_optimal(&request),
        );

        assert!(first.is_ok() && second.is_ok() && third.is_ok());
        assert_eq!(transformation.calls(), 1);
    }

    #[tokio::test]
    async fn requirements_reach_the_optimal_operation() {
        let analysis = Arc::new(FakeAnalysis::default().responding(
            AnalysisOperation::Optimal,
            json!({ "subscription": { "plan": "Pro", "addOns": [], "cost": 20 }, "cardinality": 4 }),
        ));
        let orchestrator = orchestrator(Arc::new(FakeTransformation::default()), analysis.clone());
        let request = WorkflowRequest::new("cheapest with sso")
            .with_source(PricingSource::url("https://acme.example/pricing"))
            .with_requirements(Requirements::default().with_seats(5).require_feature("sso"));

        let result = orchestrator.run_optimal(&request).await.expect("optimal");

        let forwarded = analysis.last_requirements().expect("requirements forwarded");
        assert_eq!(forwarded.filters.seats, Some(5));
        assert!(result.answer.contains("plan Pro"));
        assert!(result.answer.contains("4 configuration(s)"));
    }

    #[tokio::test]
    async fn partial_failure_is_noted_in_plan_and_answer() {
        let orchestrator = orchestrator(
            Arc::new(FakeTransformation::default().rejecting("https://broken.example/pricing")),
            Arc::new(FakeAnalysis::default()),
        );
        let request = WorkflowRequest::new("compare")
            .with_source(PricingSource::url("https://acme.example/pricing"))
            .with_source(PricingSource::url("https://broken.example/pricing"));

        let result = orchestrator.run_subscriptions(&request).await.expect("partial");

        assert!(result.plan.grounded);
        assert_eq!(result.plan.failed_sources.len(), 1);
        assert!(!result.plan.failed_sources[0].availability_failure);
        assert!(result.answer.contains("https://broken.example/pricing"));
    }

    #[tokio::test]
    async fn rejected_sources_fall_back_to_general_guidance() {
        let analysis = Arc::new(FakeAnalysis::default());
        let orchestrator = orchestrator(
            Arc::new(FakeTransformation::default().rejecting("https://broken.example/pricing")),
            analysis.clone(),
        );
        let request = WorkflowRequest::new("summary")
            .with_source(PricingSource::url("https://broken.example/pricing"));

        let result = orchestrator.run_summary(&request).await.expect("guidance");

        assert!(!result.plan.grounded);
        assert_eq!(result.plan.failed_sources.len(), 1);
        assert_eq!(analysis.calls(), 0);
    }

    #[tokio::test]
    async fn transformation_outage_surfaces_as_workflow_error_with_trace() {
        let orchestrator = orchestrator(
            Arc::new(FakeTransformation::default().unavailable()),
            Arc::new(FakeAnalysis::default()),
        );
        let request = WorkflowRequest::new("summary")
            .with_source(PricingSource::url("https://a.example/pricing"))
            .with_source(PricingSource::url("https://b.example/pricing"));

        let error = orchestrator.run_summary(&request).await.expect_err("outage");

        assert!(matches!(error.cause, WorkflowFailure::AllSourcesFailed(_)));
        assert_eq!(error.plan.state, WorkflowState::Failed);
        assert_eq!(error.plan.failed_sources.len(), 2);
        assert!(error.plan.failed_sources.iter().all(|source| source.availability_failure));
        assert!(matches!(
            error.into_interface("req"),
            InterfaceError::ServiceUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn analysis_failure_surfaces_with_partial_plan() {
        let analysis = Arc::new(FakeAnalysis::default().unavailable());
        let orchestrator = orchestrator(Arc::new(FakeTransformation::default()), analysis);
        let request = WorkflowRequest::new("optimal")
            .with_source(PricingSource::url("https://acme.example/pricing"));

        let error = orchestrator.run_optimal(&request).await.expect_err("analysis down");

        assert_eq!(error.workflow, WorkflowKind::Optimal);
        assert!(matches!(error.cause, WorkflowFailure::Analysis(_)));
        assert_eq!(error.plan.resolved_sources.len(), 1);
        assert_eq!(error.plan.invocations_of(AnalysisOperation::Optimal), 1);
        assert_eq!(error.plan.state, WorkflowState::Failed);
    }

    #[tokio::test]
    async fn every_transition_is_audited_under_the_request_id() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let orchestrator = orchestrator(
            Arc::new(FakeTransformation::default()),
            Arc::new(FakeAnalysis::default()),
        )
        .with_audit_sink(sink.clone());
        let request = WorkflowRequest::new("summary")
            .with_source(PricingSource::url("https://acme.example/pricing"));

        let result = orchestrator.run_summary(&request).await.expect("summary");

        let events = sink.events();
        assert_eq!(events.len(), result.plan.steps.len());
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|event| event.correlation_id == result.plan.request_id));
    }

    #[tokio::test]
    async fn validation_reports_findings_without_failing() {
        let analysis = Arc::new(FakeAnalysis::default().responding(
            AnalysisOperation::Validate,
            json!({ "valid": false, "errors": ["plan Team has no price"] }),
        ));
        let orchestrator = orchestrator(Arc::new(FakeTransformation::default()), analysis);
        let request =
            WorkflowRequest::new("").with_source(PricingSource::url("https://acme.example/pricing"));

        let report = orchestrator.run_validation(&request).await.expect("report");

        let result = report.result.expect("validated");
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["plan Team has no price".to_owned()]);
        assert_eq!(report.resolved_sources.len(), 1);
    }
}
