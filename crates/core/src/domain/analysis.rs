use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    Minimize,
    Maximize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Solver {
    #[default]
    Minizinc,
    Choco,
}

impl Objective {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimize => "minimize",
            Self::Maximize => "maximize",
        }
    }
}

impl Solver {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minizinc => "minizinc",
            Self::Choco => "choco",
        }
    }
}

impl std::str::FromStr for Objective {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "minimize" => Ok(Self::Minimize),
            "maximize" => Ok(Self::Maximize),
            other => Err(format!("unsupported objective `{other}` (expected minimize|maximize)")),
        }
    }
}

impl std::str::FromStr for Solver {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "minizinc" => Ok(Self::Minizinc),
            "choco" => Ok(Self::Choco),
            other => Err(format!("unsupported solver `{other}` (expected minizinc|choco)")),
        }
    }
}

/// Constraints narrowing the configuration space. Unknown keys are passed
/// through to the analysis service untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seats: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_monthly_price: Option<Decimal>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SubscriptionFilters {
    pub fn is_empty(&self) -> bool {
        self.seats.is_none()
            && self.required_features.is_empty()
            && self.max_monthly_price.is_none()
            && self.extra.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub objective: Objective,
    #[serde(default)]
    pub solver: Solver,
    #[serde(default)]
    pub filters: SubscriptionFilters,
}

impl Requirements {
    pub fn with_seats(mut self, seats: u32) -> Self {
        self.filters.seats = Some(seats);
        self
    }

    pub fn require_feature(mut self, feature: impl Into<String>) -> Self {
        self.filters.required_features.push(feature.into());
        self
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOperation {
    Summary,
    Subscriptions,
    Optimal,
    Validate,
}

impl AnalysisOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Subscriptions => "subscriptions",
            Self::Optimal => "optimal",
            Self::Validate => "validate",
        }
    }
}

/// One subscription configuration: a plan plus optional add-ons.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default)]
    pub add_ons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimalResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<CandidateResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<u64>,
}

/// Ordered, finite enumeration of subscription configurations. The order is the
/// analysis service's; iterating is lazy and can be restarted at will.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSet {
    #[serde(default)]
    pub cardinality: u64,
    #[serde(default)]
    pub subscriptions: Vec<CandidateResult>,
}

impl SubscriptionSet {
    pub fn iter(&self) -> std::slice::Iter<'_, CandidateResult> {
        self.subscriptions.iter()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl<'a> IntoIterator for &'a SubscriptionSet {
    type Item = &'a CandidateResult;
    type IntoIter = std::slice::Iter<'a, CandidateResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}
