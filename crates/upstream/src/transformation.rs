use async_trait::async_trait;
use pricelens_core::config::TransformationConfig;
use pricelens_core::domain::{PricingModel, PricingSource};
use pricelens_core::errors::TransportError;
use pricelens_core::upstream::{TargetFormat, TransformationService};
use serde::Serialize;
use tracing::debug;

use crate::http::{map_reqwest_error, read_json, UpstreamHttp};
use crate::ClientBuildError;

const TRANSFORM_PATH: &str = "/api/v1/transform";

#[derive(Debug, Serialize)]
struct TransformBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    format: &'static str,
}

impl<'a> TransformBody<'a> {
    fn new(source: &'a PricingSource, format: TargetFormat) -> Self {
        match source {
            PricingSource::Url { url } => {
                Self { url: Some(url.trim()), content: None, format: format.as_str() }
            }
            PricingSource::Document { content } => {
                Self { url: None, content: Some(content), format: format.as_str() }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct HttpTransformationService {
    http: UpstreamHttp,
}

impl HttpTransformationService {
    pub fn new(http: UpstreamHttp) -> Self {
        Self { http }
    }

    pub fn from_config(config: &TransformationConfig) -> Result<Self, ClientBuildError> {
        UpstreamHttp::new(&config.base_url, config.api_key.as_ref(), config.timeout()).map(Self::new)
    }
}

#[async_trait]
impl TransformationService for HttpTransformationService {
    async fn transform(
        &self,
        source: &PricingSource,
        format: TargetFormat,
    ) -> Result<PricingModel, TransportError> {
        debug!(
            event_name = "system.transformation.request_sent",
            source = %source.label(),
            format = format.as_str(),
            "requesting pricing transformation"
        );
        let response = self
            .http
            .client()
            .post(self.http.url(TRANSFORM_PATH))
            .json(&TransformBody::new(source, format))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_json(response).await
    }
}
