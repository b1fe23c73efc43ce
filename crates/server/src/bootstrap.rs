use std::sync::Arc;
use std::time::Duration;

use sentinel_core::clock::{Clock, SystemClock};
use sentinel_core::config::{AppConfig, ConfigError, LoadOptions};
use sentinel_core::learning::{
    spawn_schedule, ExperimentRegistry, LearningMiner, MiningOutcome, MiningSchedule, MiningSource,
};
use sentinel_core::monitor::{MonitorServices, QualityMonitor};
use sentinel_core::outbound::OutboundSink;
use sentinel_core::scenarios::ScenarioGenerator;
use thiserror::Error;
use tracing::info;

use crate::outbound::HttpOutboundSink;

pub struct Application {
    pub config: AppConfig,
    pub monitor: Arc<QualityMonitor>,
    pub miner: Arc<LearningMiner>,
    pub experiments: Arc<ExperimentRegistry>,
    pub generator: Arc<ScenarioGenerator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("outbound http client could not be built: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let sink = HttpOutboundSink::from_config(&config.outbound).map_err(BootstrapError::HttpClient)?;
    info!(
        event_name = "system.bootstrap.outbound_ready",
        correlation_id = "bootstrap",
        analytics_enabled = sink.analytics_enabled(),
        alerts_enabled = sink.alerts_enabled(),
        "outbound sinks configured"
    );
    Ok(assemble(config, Arc::new(sink), Arc::new(SystemClock)))
}

/// Wires every service from `config` around the given sink and clock.
pub fn assemble(config: AppConfig, outbound: Arc<dyn OutboundSink>, clock: Arc<dyn Clock>) -> Application {
    let services = MonitorServices::from_config(&config, outbound, clock.clone());
    let generator = Arc::new(
        ScenarioGenerator::new(services.signals.clone(), services.detector.clone(), clock.clone())
            .with_retention(config.scenarios.batch_retention),
    );
    let miner = Arc::new(LearningMiner::new(&config.learning, clock.clone()));
    let experiments = Arc::new(ExperimentRegistry::new(clock));

    info!(
        event_name = "system.bootstrap.services_ready",
        correlation_id = "bootstrap",
        telemetry_capacity = config.telemetry.capacity,
        max_attempts = config.healing.max_attempts,
        "monitoring services constructed"
    );

    Application {
        monitor: Arc::new(QualityMonitor::new(services)),
        miner,
        experiments,
        generator,
        config,
    }
}

impl Application {
    /// Spawns the recurring mining pass when learning is enabled. Each completed
    /// pass feeds its threshold recommendation back into the detector.
    pub fn start_learning(&self) -> Option<MiningSchedule> {
        if !self.config.learning.enabled {
            info!(
                event_name = "learning.schedule.disabled",
                correlation_id = "bootstrap",
                "learning schedule disabled by configuration"
            );
            return None;
        }

        let detector = self.monitor.services().detector.clone();
        let experiments = self.experiments.clone();
        let source: Arc<dyn MiningSource> = self.monitor.clone();
        Some(spawn_schedule(
            self.miner.clone(),
            source,
            Duration::from_secs(self.config.learning.interval_secs),
            move |outcome| {
                experiments.evaluate_all();
                let MiningOutcome::Completed(report) = outcome else {
                    return;
                };
                let current = detector.min_error_confidence();
                if let Some(next) = report.accuracy.recommend_min_error_confidence(current) {
                    detector.set_min_error_confidence(next);
                    info!(
                        event_name = "learning.threshold.adjusted",
                        correlation_id = "learning",
                        previous = current,
                        next,
                        precision = report.accuracy.precision,
                        recall = report.accuracy.recall,
                        "detector emission threshold adjusted"
                    );
                }
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use sentinel_core::config::{ConfigOverrides, LoadOptions};
    use sentinel_core::domain::turn::TurnInput;

    use crate::bootstrap::bootstrap;

    #[test]
    fn bootstrap_fails_fast_on_invalid_configuration() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                max_attempts: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("healing.max_attempts"), "{message}");
    }

    #[tokio::test]
    async fn bootstrapped_monitor_ingests_and_schedule_stops() {
        let app = bootstrap(LoadOptions::default()).expect("bootstrap with defaults");
        let outcome = app.monitor.ingest(TurnInput::new("conv-boot", "hello", "Hi! Where to?"));
        assert_eq!(outcome.turn.sequence, 1);
        assert_eq!(app.monitor.bus().len(), 1);

        let schedule = app.start_learning().expect("learning enabled by default");
        schedule.stop().await;
    }

    #[test]
    fn disabled_learning_spawns_nothing() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides { learning_enabled: Some(false), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        })
        .expect("bootstrap");
        assert!(app.start_learning().is_none());
    }
}
