use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::source::Fingerprint;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub features: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOn {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub available_for: Vec<String>,
}

/// Structured pricing of one SaaS offering as produced by the transformation
/// service. Immutable once built; consumers share it behind an `Arc`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingModel {
    pub saas_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default)]
    pub plans: Vec<Plan>,
    #[serde(default)]
    pub add_ons: Vec<AddOn>,
    /// Serialized document the model was extracted into (for example a
    /// Pricing2Yaml file); forwarded verbatim to the analysis service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

impl PricingModel {
    /// Structural well-formedness check applied before a model is cached.
    pub fn check_well_formed(&self) -> Result<(), String> {
        if self.plans.is_empty() {
            return Err("pricing model has no plans".to_string());
        }

        let mut seen = BTreeSet::new();
        for plan in &self.plans {
            let name = plan.name.trim();
            if name.is_empty() {
                return Err("pricing model contains a plan without a name".to_string());
            }
            if !seen.insert(name) {
                return Err(format!("pricing model declares plan `{name}` more than once"));
            }
            if plan.price.is_some_and(|price| price.is_sign_negative()) {
                return Err(format!("plan `{name}` has a negative price"));
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTag {
    pub fingerprint: Fingerprint,
    pub label: String,
    pub saas_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPlan {
    pub source: SourceTag,
    pub plan: Plan,
}

impl ContextPlan {
    /// Plan name qualified by its source, unique across a merged context.
    pub fn qualified_name(&self) -> String {
        format!("{}@{}", self.plan.name, self.source.fingerprint.short())
    }
}

/// Combined pricing data from every source that resolved for one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PricingContext {
    pub models: Vec<Arc<PricingModel>>,
    pub plans: Vec<ContextPlan>,
}

impl PricingContext {
    /// Concatenates plan sets in input order. A fingerprint contributes once;
    /// identically named plans from different sources are kept side by side.
    pub fn merge<I>(resolved: I) -> Self
    where
        I: IntoIterator<Item = (SourceTag, Arc<PricingModel>)>,
    {
        let mut context = Self::default();
        let mut seen = BTreeSet::new();

        for (tag, model) in resolved {
            if !seen.insert(tag.fingerprint.clone()) {
                continue;
            }
            context.plans.extend(
                model.plans.iter().cloned().map(|plan| ContextPlan { source: tag.clone(), plan }),
            );
            context.models.push(model);
        }

        context
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn source_count(&self) -> usize {
        self.models.len()
    }
}
