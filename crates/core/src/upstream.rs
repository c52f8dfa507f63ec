//! Seams to the two remote services. Implementations classify their own
//! failures into [`TransportError`]; retry and circuit policy live above them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AnalysisOperation, PricingModel, PricingSource, Requirements};
use crate::errors::TransportError;

pub const TRANSFORMATION_ENDPOINT: &str = "transformation";
pub const ANALYSIS_ENDPOINT: &str = "analysis";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFormat {
    #[default]
    #[serde(rename = "pricing2yaml")]
    Pricing2Yaml,
    Json,
}

impl TargetFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pricing2Yaml => "pricing2yaml",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for TargetFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pricing2yaml" | "yaml" => Ok(Self::Pricing2Yaml),
            "json" => Ok(Self::Json),
            other => Err(format!("unsupported target format `{other}` (expected pricing2yaml|json)")),
        }
    }
}

#[async_trait]
pub trait TransformationService: Send + Sync {
    async fn transform(
        &self,
        source: &PricingSource,
        format: TargetFormat,
    ) -> Result<PricingModel, TransportError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub operation: AnalysisOperation,
    pub models: Vec<Arc<PricingModel>>,
    pub requirements: Option<Requirements>,
}

#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Runs one operation to completion and returns its raw result payload.
    async fn execute(&self, request: &AnalysisRequest) -> Result<Value, TransportError>;
}
