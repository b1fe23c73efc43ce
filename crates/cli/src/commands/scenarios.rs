use std::sync::Arc;

use sentinel_core::clock::{Clock, SystemClock};
use sentinel_core::export::{export_batch, ExportFormat};
use sentinel_core::monitor::MonitorServices;
use sentinel_core::outbound::NoopOutboundSink;
use sentinel_core::scenarios::{BatchRequest, ScenarioGenerator};

use crate::commands::{load_config, render_json, CommandResult, EXIT_CHECK_FAILED, EXIT_IO};

const COMMAND: &str = "scenarios";

/// Generates a batch, replays it against the configured detector and prints
/// the report. Any failing scenario turns the exit code non-zero.
pub fn run(per_category: usize, seed: u64, export: Option<ExportFormat>) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let max = config.scenarios.max_per_category;
    if per_category == 0 || per_category > max {
        return CommandResult::failure(
            COMMAND,
            "invalid_input",
            format!("--per-category must be in range 1..={max}"),
            EXIT_CHECK_FAILED,
        );
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let services = MonitorServices::from_config(&config, Arc::new(NoopOutboundSink), clock.clone());
    let generator = ScenarioGenerator::new(services.signals, services.detector, clock);
    let batch =
        generator.generate_batch(&BatchRequest { per_category, seed, ..BatchRequest::default() });

    let report = match generator.test_batch(&batch.id) {
        Ok(report) => report,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "scenario_replay",
                error.to_string(),
                EXIT_CHECK_FAILED,
            );
        }
    };
    let exit_code = if report.all_passed() { 0 } else { EXIT_CHECK_FAILED };

    let output = match export {
        Some(format) => {
            let tested = generator.batch(&batch.id).unwrap_or(batch);
            export_batch(&tested, format).map_err(|error| {
                CommandResult::failure(COMMAND, "export", error.to_string(), EXIT_IO)
            })
        }
        None => render_json(COMMAND, &report),
    };

    match output {
        Ok(output) => CommandResult::rendered(exit_code, output),
        Err(failure) => failure,
    }
}
