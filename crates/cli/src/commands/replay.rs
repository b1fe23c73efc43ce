use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use sentinel_core::clock::{Clock, SystemClock};
use sentinel_core::domain::turn::TurnInput;
use sentinel_core::export::{export_dataset, ExportFormat};
use sentinel_core::monitor::{MonitorServices, QualityMonitor};
use sentinel_core::outbound::NoopOutboundSink;
use sentinel_core::telemetry::metrics::BusMetrics;
use serde::Serialize;

use crate::commands::{load_config, render_json, CommandResult, EXIT_IO, EXIT_INPUT};

const COMMAND: &str = "replay";

#[derive(Debug, Serialize)]
struct ReplaySummary {
    source: String,
    turns: usize,
    turns_with_errors: usize,
    errors_detected: usize,
    directives_issued: usize,
    human_reviews: usize,
    metrics: Option<BusMetrics>,
}

enum LoadFailure {
    Io(anyhow::Error),
    Invalid(anyhow::Error),
}

pub fn run(path: &Path, export: Option<ExportFormat>) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let inputs = match load_inputs(path) {
        Ok(inputs) => inputs,
        Err(LoadFailure::Io(error)) => {
            return CommandResult::failure(COMMAND, "io", format!("{error:#}"), EXIT_IO);
        }
        Err(LoadFailure::Invalid(error)) => {
            return CommandResult::failure(
                COMMAND,
                "invalid_input",
                format!("{error:#}"),
                EXIT_INPUT,
            );
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let monitor = QualityMonitor::new(MonitorServices::from_config(
        &config,
        Arc::new(NoopOutboundSink),
        clock,
    ));

    let default_window = Duration::hours(i64::from(config.telemetry.metrics_window_hours));
    let period = metrics_period(&inputs, default_window);
    let turns = inputs.len();

    let mut summary = ReplaySummary {
        source: path.display().to_string(),
        turns,
        turns_with_errors: 0,
        errors_detected: 0,
        directives_issued: 0,
        human_reviews: 0,
        metrics: None,
    };
    for input in inputs {
        let outcome = monitor.ingest(input);
        summary.turns_with_errors += usize::from(outcome.detection.has_error);
        summary.errors_detected += outcome.detection.errors.len();
        summary.directives_issued += usize::from(outcome.directive.is_some());
        summary.human_reviews += usize::from(outcome.requires_human_review());
    }

    let output = match export {
        Some(format) => export_dataset(&monitor.samples(turns), format).map_err(|error| {
            CommandResult::failure(COMMAND, "export", error.to_string(), EXIT_IO)
        }),
        None => {
            summary.metrics = Some(monitor.bus().metrics(period));
            render_json(COMMAND, &summary)
        }
    };

    match output {
        Ok(output) => CommandResult::rendered(0, output),
        Err(failure) => failure,
    }
}

fn load_inputs(path: &Path) -> Result<Vec<TurnInput>, LoadFailure> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))
        .map_err(LoadFailure::Io)?;
    parse_inputs(&raw).map_err(LoadFailure::Invalid)
}

fn parse_inputs(raw: &str) -> anyhow::Result<Vec<TurnInput>> {
    let mut inputs = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let input: TurnInput = serde_json::from_str(line)
            .with_context(|| format!("line {} is not a valid turn record", index + 1))?;
        inputs.push(input);
    }
    if inputs.is_empty() {
        bail!("no turn records found");
    }
    Ok(inputs)
}

/// Widens the metrics window so historical records stay inside it.
fn metrics_period(inputs: &[TurnInput], default_window: Duration) -> Duration {
    let earliest = inputs.iter().filter_map(|input| input.recorded_at).min();
    match earliest {
        Some(earliest) => {
            let span = Utc::now() - earliest + Duration::hours(1);
            span.max(default_window)
        }
        None => default_window,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use sentinel_core::domain::turn::TurnInput;

    use super::{metrics_period, parse_inputs};

    #[test]
    fn blank_lines_are_skipped_and_defaults_fill_optional_fields() {
        let raw = "\n{\"conversation_id\":\"c1\",\"user_message\":\"hola\",\"agent_response\":\"hi\"}\n\n";
        let inputs = parse_inputs(raw).expect("valid input");
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].latency_ms, 0);
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let raw = "{\"conversation_id\":\"c1\",\"user_message\":\"a\",\"agent_response\":\"b\"}\nnot json\n";
        let error = parse_inputs(raw).expect_err("second line is invalid");
        assert!(error.to_string().contains("line 2"), "{error}");
    }

    #[test]
    fn empty_file_is_rejected() {
        assert!(parse_inputs("\n  \n").is_err());
    }

    #[test]
    fn metrics_period_covers_historical_records() {
        let old = TurnInput::new("c1", "a", "b").recorded_at(Utc::now() - Duration::days(10));
        let period = metrics_period(&[old], Duration::hours(24));
        assert!(period > Duration::days(10));

        let fresh = TurnInput::new("c1", "a", "b");
        assert_eq!(metrics_period(&[fresh], Duration::hours(24)), Duration::hours(24));
    }
}
