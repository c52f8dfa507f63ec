use std::time::Duration;

use async_trait::async_trait;
use pricelens_core::config::AnalysisConfig;
use pricelens_core::domain::{AnalysisOperation, PricingModel, Solver};
use pricelens_core::errors::TransportError;
use pricelens_core::upstream::{AnalysisRequest, AnalysisService};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::http::{map_reqwest_error, read_json, UpstreamHttp};
use crate::ClientBuildError;

const ANALYSIS_PATH: &str = "/api/v1/pricing/analysis";
const SUMMARY_PATH: &str = "/api/v1/pricing/summary";
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobAccepted {
    job_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct JobState {
    status: JobStatus,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Analysis service over HTTP. Summary is synchronous; every other operation
/// is submitted as a job and polled until it settles.
#[derive(Clone, Debug)]
pub struct HttpAnalysisService {
    http: UpstreamHttp,
    default_solver: Solver,
    poll_interval: Duration,
    max_wait: Duration,
}

impl HttpAnalysisService {
    pub fn new(http: UpstreamHttp, default_solver: Solver, poll_interval: Duration) -> Self {
        Self { http, default_solver, poll_interval, max_wait: DEFAULT_MAX_WAIT }
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, ClientBuildError> {
        let http = UpstreamHttp::new(&config.base_url, config.api_key.as_ref(), config.timeout())?;
        Ok(Self::new(http, config.solver, config.poll_interval()).with_max_wait(config.timeout()))
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    async fn summary(&self, request: &AnalysisRequest) -> Result<Value, TransportError> {
        let form = attach_models(Form::new(), &request.models)?;
        let response = self
            .http
            .client()
            .post(self.http.url(SUMMARY_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_json(response).await
    }

    async fn submit(&self, request: &AnalysisRequest) -> Result<String, TransportError> {
        let solver = request.requirements.as_ref().map_or(self.default_solver, |r| r.solver);
        let mut form = Form::new()
            .text("operation", request.operation.as_str())
            .text("solver", solver.as_str());

        if let Some(requirements) = &request.requirements {
            if !requirements.filters.is_empty() {
                let filters = serde_json::to_string(&requirements.filters).map_err(|error| {
                    TransportError::rejected(None, format!("failed to encode filters: {error}"))
                })?;
                form = form.text("filters", filters);
            }
            if request.operation == AnalysisOperation::Optimal {
                form = form.text("objective", requirements.objective.as_str());
            }
        }
        let form = attach_models(form, &request.models)?;

        info!(
            event_name = "system.analysis.job_submitted",
            operation = request.operation.as_str(),
            solver = solver.as_str(),
            "submitting analysis job"
        );
        let response = self
            .http
            .client()
            .post(self.http.url(ANALYSIS_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let accepted: JobAccepted = read_json(response).await?;
        Ok(accepted.job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<Value, TransportError> {
        let status_url = self.http.url(&format!("{ANALYSIS_PATH}/{job_id}"));
        let started = tokio::time::Instant::now();

        loop {
            let response =
                self.http.client().get(&status_url).send().await.map_err(map_reqwest_error)?;
            let state: JobState = read_json(response).await?;

            match state.status {
                JobStatus::Completed => {
                    info!(event_name = "system.analysis.job_completed", job_id, "analysis job completed");
                    return Ok(state.result.unwrap_or_else(|| Value::Object(Default::default())));
                }
                JobStatus::Failed => {
                    let detail = describe_job_error(state.error.as_ref());
                    warn!(
                        event_name = "system.analysis.job_failed",
                        job_id,
                        error = %detail,
                        "analysis job failed"
                    );
                    return Err(TransportError::rejected(None, format!("analysis job failed: {detail}"))
                        .with_cause(detail));
                }
                JobStatus::Pending | JobStatus::Running | JobStatus::Unknown => {}
            }

            if started.elapsed() + self.poll_interval > self.max_wait {
                return Err(TransportError::transient(format!(
                    "timed out waiting for analysis job {job_id}"
                )));
            }
            debug!(event_name = "system.analysis.job_pending", job_id, "analysis job still running");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn execute(&self, request: &AnalysisRequest) -> Result<Value, TransportError> {
        if request.operation == AnalysisOperation::Summary {
            return self.summary(request).await;
        }
        let job_id = self.submit(request).await?;
        self.poll(&job_id).await
    }
}

/// One `pricingFile` part per model. The extracted document is sent as is;
/// models without one are sent as JSON.
fn attach_models(
    mut form: Form,
    models: &[std::sync::Arc<PricingModel>],
) -> Result<Form, TransportError> {
    for model in models {
        let part = match &model.document {
            Some(document) => Part::text(document.clone())
                .file_name("pricing.yaml")
                .mime_str("application/x-yaml"),
            None => {
                let encoded = serde_json::to_string(model.as_ref()).map_err(|error| {
                    TransportError::rejected(None, format!("failed to encode pricing model: {error}"))
                })?;
                Part::text(encoded).file_name("pricing.json").mime_str("application/json")
            }
        }
        .map_err(map_reqwest_error)?;
        form = form.part("pricingFile", part);
    }
    Ok(form)
}

fn describe_job_error(error: Option<&Value>) -> String {
    match error {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Object(fields)) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| Value::Object(fields.clone()).to_string()),
        Some(other) => other.to_string(),
        None => "unknown error".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pricelens_core::domain::{AnalysisOperation, Plan, PricingModel, Requirements, Solver};
    use pricelens_core::errors::TransportErrorKind;
    use pricelens_core::upstream::{AnalysisRequest, AnalysisService};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::HttpAnalysisService;
    use crate::http::UpstreamHttp;

    fn service(server: &MockServer) -> HttpAnalysisService {
        let http = UpstreamHttp::new(&server.uri(), None, Duration::from_secs(5)).expect("client");
        HttpAnalysisService::new(http, Solver::Minizinc, Duration::from_millis(10))
            .with_max_wait(Duration::from_secs(2))
    }

    fn model() -> Arc<PricingModel> {
        Arc::new(PricingModel {
            saas_name: "Acme".to_owned(),
            currency: Some("USD".to_owned()),
            plans: vec![Plan {
                name: "Team".to_owned(),
                price: None,
                unit: None,
                features: Default::default(),
            }],
            add_ons: Vec::new(),
            document: Some("saasName: Acme\n".to_owned()),
        })
    }

    #[tokio::test]
    async fn summary_posts_the_document_and_returns_the_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/pricing/summary"))
            .and(body_string_contains("saasName: Acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "numberOfPlans": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let request = AnalysisRequest {
            operation: AnalysisOperation::Summary,
            models: vec![model()],
            requirements: None,
        };
        let payload = service(&server).execute(&request).await.expect("summary");

        assert_eq!(payload, json!({ "numberOfPlans": 1 }));
    }

    #[tokio::test]
    async fn optimal_job_is_submitted_and_polled_until_completed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/pricing/analysis"))
            .and(body_string_contains("optimal"))
            .and(body_string_contains("maximize"))
            .and(body_string_contains("requiredFeatures"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "jobId": "job-7" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pricing/analysis/job-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "RUNNING" })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pricing/analysis/job-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "COMPLETED",
                "result": { "subscription": { "plan": "Team" }, "cost": 30 }
            })))
            .mount(&server)
            .await;

        let request = AnalysisRequest {
            operation: AnalysisOperation::Optimal,
            models: vec![model()],
            requirements: Some(
                Requirements::default()
                    .require_feature("sso")
                    .with_objective(pricelens_core::domain::Objective::Maximize),
            ),
        };
        let payload = service(&server).execute(&request).await.expect("optimal");

        assert_eq!(payload["subscription"]["plan"], "Team");
    }

    #[tokio::test]
    async fn failed_job_is_a_rejection_carrying_the_job_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/pricing/analysis"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "jobId": "job-9" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pricing/analysis/job-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "FAILED",
                "error": "feature `sso` does not exist"
            })))
            .mount(&server)
            .await;

        let request = AnalysisRequest {
            operation: AnalysisOperation::Subscriptions,
            models: vec![model()],
            requirements: Some(Requirements::default()),
        };
        let error = service(&server).execute(&request).await.expect_err("job failed");

        assert_eq!(error.kind, TransportErrorKind::Rejected);
        assert_eq!(error.cause.as_deref(), Some("feature `sso` does not exist"));
    }

    #[tokio::test]
    async fn unavailable_service_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/pricing/analysis"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let request = AnalysisRequest {
            operation: AnalysisOperation::Validate,
            models: vec![model()],
            requirements: None,
        };
        let error = service(&server).execute(&request).await.expect_err("unavailable");

        assert!(error.is_retryable());
        assert_eq!(error.status, Some(503));
    }

    #[tokio::test]
    async fn job_that_never_settles_times_out_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/pricing/analysis"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "jobId": "job-slow" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pricing/analysis/job-slow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "PENDING" })))
            .mount(&server)
            .await;

        let http = UpstreamHttp::new(&server.uri(), None, Duration::from_secs(5)).expect("client");
        let service = HttpAnalysisService::new(http, Solver::Choco, Duration::from_millis(20))
            .with_max_wait(Duration::from_millis(100));
        let request = AnalysisRequest {
            operation: AnalysisOperation::Validate,
            models: vec![model()],
            requirements: None,
        };
        let error = service.execute(&request).await.expect_err("never settles");

        assert!(error.is_retryable());
        assert!(error.message.contains("job-slow"));
    }
}
