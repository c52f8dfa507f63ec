use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::SingleFlightCache;
use crate::domain::{PricingModel, PricingSource};
use crate::errors::TransformError;
use crate::resilience::Resilience;
use crate::upstream::{TargetFormat, TransformationService, TRANSFORMATION_ENDPOINT};

/// Turns pricing sources into models, going through the cache and then the
/// resilience wrapper. Malformed models are rejected before they are cached.
#[derive(Clone)]
pub struct TransformationClient {
    service: Arc<dyn TransformationService>,
    resilience: Resilience,
    cache: SingleFlightCache,
    format: TargetFormat,
}

impl TransformationClient {
    pub fn new(
        service: Arc<dyn TransformationService>,
        resilience: Resilience,
        cache: SingleFlightCache,
    ) -> Self {
        Self { service, resilience, cache, format: TargetFormat::default() }
    }

    pub fn with_format(mut self, format: TargetFormat) -> Self {
        self.format = format;
        self
    }

    pub fn cache(&self) -> &SingleFlightCache {
        &self.cache
    }

    pub async fn transform(&self, source: &PricingSource) -> Result<Arc<PricingModel>, TransformError> {
        let fingerprint = source.fingerprint();
        let service = Arc::clone(&self.service);
        let resilience = self.resilience.clone();
        let source = source.clone();
        let format = self.format;
        let key = fingerprint.clone();

        self.cache
            .get_or_compute(&fingerprint, move || async move {
                debug!(
                    event_name = "system.transformation.requested",
                    source = %source.label(),
                    format = format.as_str(),
                    "requesting transformation"
                );
                let model = resilience
                    .call(TRANSFORMATION_ENDPOINT, || service.transform(&source, format))
                    .await?;
                model
                    .check_well_formed()
                    .map_err(|reason| TransformError::MalformedModel { fingerprint: key, reason })?;
                info!(
                    event_name = "system.transformation.completed",
                    source = %source.label(),
                    saas_name = %model.saas_name,
                    plans = model.plans.len(),
                    "pricing source transformed"
                );
                Ok(model)
            })
            .await
    }
}
