use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use pricelens_core::domain::{PricingContext, PricingModel, PricingSource, SourceTag};
use pricelens_core::errors::{AggregateError, SourceFetchError, TransformError};
use pricelens_core::flows::ResolvedSource;
use pricelens_core::TransformationClient;
use tracing::{debug, warn};

/// Outcome of fanning out one request's sources. Failures that did not void
/// the request are kept next to the merged context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregateResult {
    pub context: PricingContext,
    pub resolved: Vec<ResolvedSource>,
    pub failures: Vec<SourceFetchError>,
}

#[derive(Clone)]
pub struct SourceAggregator {
    client: TransformationClient,
}

impl SourceAggregator {
    pub fn new(client: TransformationClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &TransformationClient {
        &self.client
    }

    pub async fn aggregate(&self, sources: &[PricingSource]) -> Result<AggregateResult, AggregateError> {
        self.aggregate_with(sources, false).await
    }

    /// Transforms every source concurrently and waits for all of them. With
    /// `refresh`, each distinct fingerprint is invalidated once up front so
    /// duplicates still collapse into one upstream call.
    pub async fn aggregate_with(
        &self,
        sources: &[PricingSource],
        refresh: bool,
    ) -> Result<AggregateResult, AggregateError> {
        if sources.is_empty() {
            return Ok(AggregateResult::default());
        }

        if refresh {
            let mut invalidated = BTreeSet::new();
            for source in sources {
                let fingerprint = source.fingerprint();
                if invalidated.insert(fingerprint.clone()) {
                    self.client.cache().invalidate(&fingerprint).await;
                }
            }
        }

        let outcomes = join_all(sources.iter().map(|source| async move {
            (source, self.client.transform(source).await)
        }))
        .await;

        let mut models: Vec<(SourceTag, Arc<PricingModel>)> = Vec::new();
        let mut failures = Vec::new();
        for (source, outcome) in outcomes {
            match outcome {
                Ok(model) => models.push((
                    SourceTag {
                        fingerprint: source.fingerprint(),
                        label: source.label(),
                        saas_name: model.saas_name.clone(),
                    },
                    model,
                )),
                Err(cause) => failures.push(source_failure(source, cause)),
            }
        }

        if models.is_empty() {
            return Err(AggregateError::AllSourcesFailed { failures });
        }

        let mut seen = BTreeSet::new();
        let resolved = models
            .iter()
            .filter(|(tag, _)| seen.insert(tag.fingerprint.clone()))
            .map(|(tag, model)| ResolvedSource {
                label: tag.label.clone(),
                fingerprint: tag.fingerprint.clone(),
                saas_name: model.saas_name.clone(),
                plans: model.plans.len(),
            })
            .collect();
        let context = PricingContext::merge(models);
        debug!(
            event_name = "workflow.aggregator.merged",
            sources = context.source_count(),
            plans = context.plans.len(),
            failed = failures.len(),
            "pricing context merged"
        );

        Ok(AggregateResult { context, resolved, failures })
    }
}

fn source_failure(source: &PricingSource, cause: TransformError) -> SourceFetchError {
    let failure = SourceFetchError { label: source.label(), fingerprint: source.fingerprint(), cause };
    warn!(
        event_name = "workflow.aggregator.source_failed",
        source = %failure.label,
        availability_failure = failure.cause.is_availability_failure(),
        error = %failure.cause,
        "pricing source could not be transformed"
    );
    failure
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pricelens_core::domain::PricingSource;
    use pricelens_core::errors::TransformError;
    use tokio::time::Instant;

    use super::SourceAggregator;
    use crate::testing::{transformation_client, FakeTransformation};

    #[tokio::test]
    async fn zero_sources_give_an_empty_context() {
        let service = Arc::new(FakeTransformation::default());
        let aggregator = SourceAggregator::new(transformation_client(service.clone()));

        let result = aggregator.aggregate(&[]).await.expect("empty is valid");

        assert!(result.context.is_empty());
        assert!(result.failures.is_empty());
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn one_failing_source_out_of_three_is_recorded_not_thrown() {
        let service = Arc::new(FakeTransformation::default().rejecting("https://broken.example/pricing"));
        let aggregator = SourceAggregator::new(transformation_client(service));
        let sources = vec![
            PricingSource::url("https://a.example/pricing"),
            PricingSource::url("https://broken.example/pricing"),
            PricingSource::url("https://b.example/pricing"),
        ];

        let result = aggregator.aggregate(&sources).await.expect("partial success");

        assert_eq!(result.context.source_count(), 2);
        assert_eq!(result.resolved.len(), 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].label, "https://broken.example/pricing");
    }

    #[tokio::test]
    async fn all_sources_failing_is_an_aggregate_error() {
        let service = Arc::new(
            FakeTransformation::default()
                .rejecting("https://a.example/pricing")
                .rejecting("https://b.example/pricing")
                .rejecting("https://c.example/pricing"),
        );
        let aggregator = SourceAggregator::new(transformation_client(service));
        let sources = vec![
            PricingSource::url("https://a.example/pricing"),
            PricingSource::url("https://b.example/pricing"),
            PricingSource::url("https://c.example/pricing"),
        ];

        let error = aggregator.aggregate(&sources).await.expect_err("all failed");

        assert_eq!(error.failures().len(), 3);
        assert!(!error.is_outage());
        assert!(error
            .failures()
            .iter()
            .all(|failure| matches!(failure.cause, TransformError::Upstream(_))));
    }

    #[tokio::test]
    async fn identical_sources_reach_the_upstream_once_and_merge_once() {
        let service = Arc::new(FakeTransformation::default().with_delay_ms(20));
        let aggregator = SourceAggregator::new(transformation_client(service.clone()));
        let source = PricingSource::url("https://a.example/pricing");
        let sources = vec![source.clone(), source.clone(), source.clone(), source];

        let result = aggregator.aggregate(&sources).await.expect("aggregate");

        assert_eq!(service.calls(), 1);
        assert_eq!(result.context.source_count(), 1);
        assert_eq!(result.resolved.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sources_are_transformed_concurrently_and_a_slow_one_is_awaited() {
        let service = Arc::new(
            FakeTransformation::default()
                .with_delay_ms(500)
                .slowing("https://slow.example/pricing", 3_000),
        );
        let aggregator = SourceAggregator::new(transformation_client(service.clone()));
        let sources = vec![
            PricingSource::url("https://a.example/pricing"),
            PricingSource::url("https://slow.example/pricing"),
            PricingSource::url("https://b.example/pricing"),
        ];

        let started = Instant::now();
        let result = aggregator.aggregate(&sources).await.expect("aggregate");
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(3_000));
        assert!(elapsed < Duration::from_millis(3_500), "sources ran one after another: {elapsed:?}");
        assert_eq!(service.calls(), 3);
        assert_eq!(result.context.source_count(), 3);
        assert!(result.failures.is_empty());
        assert!(result.resolved.iter().any(|source| source.saas_name == "slow"));
    }

    #[tokio::test]
    async fn refresh_requests_a_new_transformation() {
        let service = Arc::new(FakeTransformation::default());
        let aggregator = SourceAggregator::new(transformation_client(service.clone()));
        let sources = vec![PricingSource::url("https://a.example/pricing")];

        aggregator.aggregate(&sources).await.expect("first");
        aggregator.aggregate(&sources).await.expect("cached");
        assert_eq!(service.calls(), 1);

        aggregator.aggregate_with(&sources, true).await.expect("refreshed");
        assert_eq!(service.calls(), 2);
    }
}
