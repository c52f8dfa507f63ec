use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::{
    AnalysisOperation, OptimalResult, PricingContext, Requirements, SubscriptionSet,
    ValidationResult,
};
use crate::errors::AnalysisError;
use crate::resilience::Resilience;
use crate::upstream::{AnalysisRequest, AnalysisService, ANALYSIS_ENDPOINT};

/// Typed operations over the analysis service. Results depend on per-call
/// requirements and are never cached.
#[derive(Clone)]
pub struct AnalysisClient {
    service: Arc<dyn AnalysisService>,
    resilience: Resilience,
}

impl AnalysisClient {
    pub fn new(service: Arc<dyn AnalysisService>, resilience: Resilience) -> Self {
        Self { service, resilience }
    }

    /// Free-form overview of the models. The payload must be a JSON object.
    pub async fn summarize(&self, context: &PricingContext) -> Result<Value, AnalysisError> {
        let operation = AnalysisOperation::Summary;
        let payload = self.execute(operation, context, None).await?;
        if payload.is_object() {
            Ok(payload)
        } else {
            Err(AnalysisError::MalformedResult {
                operation,
                reason: "summary payload is not a JSON object".to_owned(),
            })
        }
    }

    /// Ordering is the analysis service's; this layer does not re-sort.
    pub async fn optimal_subscription(
        &self,
        context: &PricingContext,
        requirements: &Requirements,
    ) -> Result<OptimalResult, AnalysisError> {
        let operation = AnalysisOperation::Optimal;
        let payload = self.execute(operation, context, Some(requirements)).await?;
        decode(operation, payload)
    }

    pub async fn enumerate_subscriptions(
        &self,
        context: &PricingContext,
        requirements: &Requirements,
    ) -> Result<SubscriptionSet, AnalysisError> {
        let operation = AnalysisOperation::Subscriptions;
        let payload = self.execute(operation, context, Some(requirements)).await?;
        decode(operation, payload)
    }

    /// Validation findings are data; only transport failures become errors.
    pub async fn validate(&self, context: &PricingContext) -> Result<ValidationResult, AnalysisError> {
        let operation = AnalysisOperation::Validate;
        let payload = self.execute(operation, context, None).await?;
        decode(operation, payload)
    }

    async fn execute(
        &self,
        operation: AnalysisOperation,
        context: &PricingContext,
        requirements: Option<&Requirements>,
    ) -> Result<Value, AnalysisError> {
        let request = AnalysisRequest {
            operation,
            models: context.models.clone(),
            requirements: requirements.cloned(),
        };
        debug!(
            event_name = "system.analysis.invoked",
            operation = operation.as_str(),
            models = request.models.len(),
            "invoking analysis operation"
        );

        let payload = self
            .resilience
            .call(ANALYSIS_ENDPOINT, || self.service.execute(&request))
            .await
            .map_err(|cause| AnalysisError::Upstream { operation, cause })?;

        info!(
            event_name = "system.analysis.completed",
            operation = operation.as_str(),
            "analysis operation completed"
        );
        Ok(payload)
    }
}

fn decode<T: DeserializeOwned>(operation: AnalysisOperation, payload: Value) -> Result<T, AnalysisError> {
    serde_json::from_value(payload)
        .map_err(|error| AnalysisError::MalformedResult { operation, reason: error.to_string() })
}
