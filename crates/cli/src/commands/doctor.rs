use std::sync::Arc;

use sentinel_core::clock::{Clock, SystemClock};
use sentinel_core::config::{AppConfig, LoadOptions};
use sentinel_core::monitor::MonitorServices;
use sentinel_core::outbound::NoopOutboundSink;
use sentinel_core::scenarios::{BatchRequest, ScenarioGenerator};
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_CHECK_FAILED};

const SELF_TEST_PER_CATEGORY: usize = 2;

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

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_CHECK_FAILED };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult::rendered(exit_code, output)
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
            checks.push(check_outbound_channels(&config));
            checks.push(check_scenario_self_test(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["outbound_channels", "scenario_self_test"] {
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

fn check_outbound_channels(config: &AppConfig) -> DoctorCheck {
    let outbound = &config.outbound;
    let describe = |enabled: bool, url: Option<&String>| match (enabled, url) {
        (true, Some(url)) => format!("enabled ({url})"),
        (true, None) => "enabled without url".to_string(),
        (false, _) => "disabled".to_string(),
    };
    let token = if outbound.alert_token.is_some() { "set" } else { "unset" };

    DoctorCheck {
        name: "outbound_channels",
        status: CheckStatus::Pass,
        details: format!(
            "analytics {}, alerts {} (token {token}), timeout {}s",
            describe(outbound.analytics_enabled, outbound.analytics_url.as_ref()),
            describe(outbound.alerts_enabled, outbound.alert_url.as_ref()),
            outbound.timeout_secs
        ),
    }
}

fn check_scenario_self_test(config: &AppConfig) -> DoctorCheck {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let services = MonitorServices::from_config(config, Arc::new(NoopOutboundSink), clock.clone());
    let generator = ScenarioGenerator::new(services.signals, services.detector, clock);
    let batch = generator.generate_batch(&BatchRequest {
        per_category: SELF_TEST_PER_CATEGORY,
        ..BatchRequest::default()
    });

    match generator.test_batch(&batch.id) {
        Ok(report) if report.all_passed() => DoctorCheck {
            name: "scenario_self_test",
            status: CheckStatus::Pass,
            details: format!("{}/{} synthetic scenarios passed", report.passed, report.total),
        },
        Ok(report) => {
            let failing: Vec<&str> = report
                .results
                .iter()
                .filter(|result| !result.passed)
                .map(|result| result.scenario_id.as_str())
                .collect();
            DoctorCheck {
                name: "scenario_self_test",
                status: CheckStatus::Fail,
                details: format!(
                    "{}/{} synthetic scenarios passed; failing: {}",
                    report.passed,
                    report.total,
                    failing.join(", ")
                ),
            }
        }
        Err(error) => DoctorCheck {
            name: "scenario_self_test",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
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
