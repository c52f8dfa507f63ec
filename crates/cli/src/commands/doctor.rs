use std::time::Duration;

use pricelens_core::config::{AppConfig, LoadOptions};
use pricelens_core::SingleFlightCache;
use pricelens_upstream::http::UpstreamHttp;
use serde::Serialize;

use super::current_thread_runtime;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.extend(check_runtime_dependencies(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["transformation_reachability", "analysis_reachability", "cache_backend"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_runtime_dependencies(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "async_runtime",
                status: CheckStatus::Fail,
                details: error,
            }];
        }
    };

    runtime.block_on(async {
        vec![
            check_reachable("transformation_reachability", &config.transformation.base_url).await,
            check_reachable("analysis_reachability", &config.analysis.base_url).await,
            check_cache(config).await,
        ]
    })
}

/// Any HTTP response counts; only connection-level failures fail the check.
async fn check_reachable(name: &'static str, base_url: &str) -> DoctorCheck {
    let http = match UpstreamHttp::new(base_url, None, PROBE_TIMEOUT) {
        Ok(http) => http,
        Err(error) => {
            return DoctorCheck { name, status: CheckStatus::Fail, details: error.to_string() };
        }
    };

    match http.client().get(http.base_url()).send().await {
        Ok(response) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("`{base_url}` responded with {}", response.status()),
        },
        Err(error) => DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: format!("`{base_url}` is unreachable: {error}"),
        },
    }
}

async fn check_cache(config: &AppConfig) -> DoctorCheck {
    match SingleFlightCache::from_config(&config.cache).await {
        Ok(cache) => DoctorCheck {
            name: "cache_backend",
            status: CheckStatus::Pass,
            details: format!("{} cache ready (ttl {}s)", cache.backend().as_str(), config.cache.ttl_secs),
        },
        Err(error) => {
            DoctorCheck { name: "cache_backend", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
