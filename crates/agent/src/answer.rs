//! Deterministic answer text. Numbers come from the analysis service
//! verbatim; nothing here estimates or rounds a price.

use pricelens_core::domain::{CandidateResult, OptimalResult, PricingContext, SubscriptionSet};
use pricelens_core::flows::{FailedSource, WorkflowKind};
use serde_json::Value;

const LISTED_SUBSCRIPTIONS: usize = 5;

pub fn general_guidance(kind: WorkflowKind, failed: &[FailedSource]) -> String {
    let mut answer = String::from(
        "No pricing data was available to ground this answer, so this is general guidance only. ",
    );
    answer.push_str(match kind {
        WorkflowKind::Summary => {
            "A pricing summary lists each plan, its price and billing unit, the features it includes and the add-ons that can be combined with it. Provide a pricing page URL or a Pricing2Yaml document to get a summary of a specific offering."
        }
        WorkflowKind::Subscriptions => {
            "The valid subscriptions of a SaaS offering are the combinations of one plan with the add-ons available for it. Provide a pricing page URL or a Pricing2Yaml document to enumerate them."
        }
        WorkflowKind::Optimal => {
            "To find the best plan, compare the plans that include every feature you need at your seat count and pick the cheapest, checking whether an add-on on a lower plan costs less than upgrading. Provide a pricing page URL or a Pricing2Yaml document to compute the optimal subscription."
        }
    });
    push_failure_note(&mut answer, failed);
    answer
}

pub fn summary_answer(context: &PricingContext, payload: &Value, failed: &[FailedSource]) -> String {
    let mut answer = format!("Pricing summary for {}.", offerings(context));
    if let Value::Object(fields) = payload {
        for (key, value) in fields {
            match value {
                Value::String(text) => answer.push_str(&format!("\n- {key}: {text}")),
                Value::Number(_) | Value::Bool(_) => answer.push_str(&format!("\n- {key}: {value}")),
                Value::Array(items) => answer.push_str(&format!("\n- {key}: {} item(s)", items.len())),
                Value::Object(_) | Value::Null => {}
            }
        }
    }
    push_failure_note(&mut answer, failed);
    answer
}

pub fn subscriptions_answer(
    context: &PricingContext,
    set: &SubscriptionSet,
    failed: &[FailedSource],
) -> String {
    let mut answer = format!(
        "{} has {} valid subscription configuration(s).",
        offerings(context),
        set.cardinality.max(set.len() as u64)
    );
    for (index, candidate) in set.iter().take(LISTED_SUBSCRIPTIONS).enumerate() {
        answer.push_str(&format!("\n{}. {}", index + 1, describe(candidate)));
    }
    if set.len() > LISTED_SUBSCRIPTIONS {
        answer.push_str(&format!("\n... and {} more.", set.len() - LISTED_SUBSCRIPTIONS));
    }
    push_failure_note(&mut answer, failed);
    answer
}

pub fn optimal_answer(
    context: &PricingContext,
    result: &OptimalResult,
    failed: &[FailedSource],
) -> String {
    let mut answer = match &result.subscription {
        Some(candidate) => {
            let mut text = format!("The optimal subscription for {} is {}", offerings(context), describe(candidate));
            if candidate.cost.is_none() {
                if let Some(cost) = result.cost {
                    text.push_str(&format!(" at a cost of {cost}"));
                }
            }
            text.push('.');
            text
        }
        None => format!(
            "No subscription of {} satisfies the given requirements.",
            offerings(context)
        ),
    };
    if let Some(cardinality) = result.cardinality {
        answer.push_str(&format!(" {cardinality} configuration(s) were considered."));
    }
    push_failure_note(&mut answer, failed);
    answer
}

fn describe(candidate: &CandidateResult) -> String {
    let mut text = match &candidate.plan {
        Some(plan) => format!("plan {plan}"),
        None => "no base plan".to_owned(),
    };
    if !candidate.add_ons.is_empty() {
        text.push_str(&format!(" with add-ons {}", candidate.add_ons.join(", ")));
    }
    if let Some(cost) = candidate.cost {
        text.push_str(&format!(" at a cost of {cost}"));
    }
    text
}

fn offerings(context: &PricingContext) -> String {
    let names: Vec<&str> = context.models.iter().map(|model| model.saas_name.as_str()).collect();
    match names.as_slice() {
        [] => "the requested offering".to_owned(),
        [single] => (*single).to_owned(),
        many => many.join(", "),
    }
}

fn push_failure_note(answer: &mut String, failed: &[FailedSource]) {
    if failed.is_empty() {
        return;
    }
    let labels: Vec<&str> = failed.iter().map(|source| source.label.as_str()).collect();
    answer.push_str(&format!(
        "\nNote: {} source(s) could not be read and were left out: {}.",
        failed.len(),
        labels.join(", ")
    ));
}

#[cfg(test)]
mod tests {
    use pricelens_core::domain::{CandidateResult, OptimalResult, PricingContext, SubscriptionSet};
    use pricelens_core::flows::{FailedSource, WorkflowKind};
    use pricelens_core::Fingerprint;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{general_guidance, optimal_answer, subscriptions_answer, summary_answer};

    fn candidate(plan: &str, add_ons: &[&str], cost: Option<Decimal>) -> CandidateResult {
        CandidateResult {
            plan: Some(plan.to_owned()),
            add_ons: add_ons.iter().map(|name| (*name).to_owned()).collect(),
            cost,
            extra: Default::default(),
        }
    }

    #[test]
    fn guidance_mentions_failed_sources() {
        let failed = vec![FailedSource {
            label: "https://broken.example/pricing".to_owned(),
            fingerprint: Fingerprint("f".repeat(64)),
            error: "rejected".to_owned(),
            availability_failure: false,
        }];

        let answer = general_guidance(WorkflowKind::Optimal, &failed);

        assert!(answer.starts_with("No pricing data was available"));
        assert!(answer.contains("https://broken.example/pricing"));
    }

    #[test]
    fn optimal_answer_quotes_the_service_cost() {
        let result = OptimalResult {
            subscription: Some(candidate("Team", &["SSO"], Some(Decimal::new(4250, 2)))),
            cost: Some(Decimal::new(4250, 2)),
            cardinality: Some(12),
        };

        let answer = optimal_answer(&PricingContext::default(), &result, &[]);

        assert!(answer.contains("plan Team with add-ons SSO at a cost of 42.50"));
        assert!(answer.contains("12 configuration(s)"));
    }

    #[test]
    fn subscriptions_answer_lists_in_service_order() {
        let set = SubscriptionSet {
            cardinality: 7,
            subscriptions: (1..=7).map(|n| candidate(&format!("P{n}"), &[], None)).collect(),
        };

        let answer = subscriptions_answer(&PricingContext::default(), &set, &[]);

        assert!(answer.contains("7 valid subscription"));
        assert!(answer.contains("1. plan P1"));
        assert!(answer.contains("5. plan P5"));
        assert!(!answer.contains("plan P6"));
        assert!(answer.contains("and 2 more"));
    }

    #[test]
    fn summary_answer_lists_scalar_fields() {
        let answer = summary_answer(
            &PricingContext::default(),
            &json!({ "numberOfPlans": 3, "currency": "EUR", "plans": ["A", "B", "C"] }),
            &[],
        );

        assert!(answer.contains("- numberOfPlans: 3"));
        assert!(answer.contains("- currency: EUR"));
        assert!(answer.contains("- plans: 3 item(s)"));
    }
}
