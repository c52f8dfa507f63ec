//! Scripted upstream fakes shared by the unit tests in this crate.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pricelens_core::domain::{
    AnalysisOperation, Plan, PricingModel, PricingSource, Requirements,
};
use pricelens_core::errors::TransportError;
use pricelens_core::upstream::{AnalysisRequest, AnalysisService, TargetFormat, TransformationService};
use pricelens_core::{
    AnalysisClient, CircuitBreaker, CircuitBreakerConfig, Resilience, RetryPolicy,
    SingleFlightCache, TransformationClient,
};
use serde_json::{json, Value};

fn resilience() -> Resilience {
    Resilience::new(
        RetryPolicy {
            max_attempts: 2,
            attempt_timeout: Duration::from_secs(5),
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            jitter: false,
        },
        Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
    )
}

pub fn transformation_client(service: Arc<FakeTransformation>) -> TransformationClient {
    TransformationClient::new(
        service,
        resilience(),
        SingleFlightCache::in_memory(64, Duration::from_secs(300)),
    )
}

pub fn analysis_client(service: Arc<FakeAnalysis>) -> AnalysisClient {
    AnalysisClient::new(service, resilience())
}

#[derive(Default)]
pub struct FakeTransformation {
    calls: AtomicUsize,
    rejected: BTreeSet<String>,
    unavailable: bool,
    delay_ms: u64,
    slow: BTreeMap<String, u64>,
}

impl FakeTransformation {
    pub fn rejecting(mut self, url: &str) -> Self {
        self.rejected.insert(url.to_owned());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Overrides the delay for one source url.
    pub fn slowing(mut self, url: &str, delay_ms: u64) -> Self {
        self.slow.insert(url.to_owned(), delay_ms);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransformationService for FakeTransformation {
    async fn transform(
        &self,
        source: &PricingSource,
        _format: TargetFormat,
    ) -> Result<PricingModel, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let label = source.label();
        let delay_ms = self.slow.get(&label).copied().unwrap_or(self.delay_ms);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.unavailable {
            return Err(TransportError::transient("service unavailable").with_status(503));
        }
        if self.rejected.contains(&label) {
            return Err(TransportError::rejected(Some(422), "no pricing table found")
                .with_cause("NO_PRICING_FOUND"));
        }

        let saas_name = label
            .trim_start_matches("https://")
            .split('.')
            .next()
            .unwrap_or("document")
            .to_owned();
        Ok(PricingModel {
            saas_name,
            currency: Some("USD".to_owned()),
            plans: ["Free", "Pro"]
                .into_iter()
                .map(|name| Plan {
                    name: name.to_owned(),
                    price: None,
                    unit: Some("user/month".to_owned()),
                    features: BTreeMap::new(),
                })
                .collect(),
            add_ons: Vec::new(),
            document: None,
        })
    }
}

#[derive(Default)]
pub struct FakeAnalysis {
    calls: AtomicUsize,
    requests: Mutex<Vec<AnalysisRequest>>,
    responses: BTreeMap<&'static str, Value>,
    unavailable: bool,
}

impl FakeAnalysis {
    pub fn responding(mut self, operation: AnalysisOperation, payload: Value) -> Self {
        self.responses.insert(operation.as_str(), payload);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn operations(&self) -> Vec<AnalysisOperation> {
        self.recorded().iter().map(|request| request.operation).collect()
    }

    pub fn last_requirements(&self) -> Option<Requirements> {
        self.recorded().last().and_then(|request| request.requirements.clone())
    }

    fn recorded(&self) -> Vec<AnalysisRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AnalysisService for FakeAnalysis {
    async fn execute(&self, request: &AnalysisRequest) -> Result<Value, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }
        if self.unavailable {
            return Err(TransportError::transient("analysis unavailable").with_status(503));
        }
        if let Some(payload) = self.responses.get(request.operation.as_str()) {
            return Ok(payload.clone());
        }
        Ok(match request.operation {
            AnalysisOperation::Summary => json!({ "numberOfPlans": 2 }),
            AnalysisOperation::Subscriptions => json!({
                "cardinality": 2,
                "subscriptions": [{ "plan": "Free" }, { "plan": "Pro" }]
            }),
            AnalysisOperation::Optimal => json!({ "subscription": { "plan": "Free" }, "cost": 0 }),
            AnalysisOperation::Validate => json!({ "valid": true }),
        })
    }
}
