use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use sentinel_core::config::AppConfig;
use sentinel_core::domain::healing::{Directive, HealingActionType};
use sentinel_core::learning::{MiningOutcome, VariantMetrics, VariantSpec};
use sentinel_core::scenarios::{BatchRequest, ScenarioCategory};
use sentinel_core::signals::INTENT_MATCH_THRESHOLD;
use sentinel_core::{
    ConversationId, ConversationStage, ErrorType, ExperimentRegistry, InMemoryOutboundSink,
    LearningMiner, ManualClock, MiningSource, MonitorServices, QualityMonitor, ScenarioGenerator,
    Severity, TurnInput,
};

fn monitor_with(config: &AppConfig, clock: Arc<ManualClock>) -> (QualityMonitor, InMemoryOutboundSink) {
    let sink = InMemoryOutboundSink::default();
    let services = MonitorServices::from_config(config, Arc::new(sink.clone()), clock);
    (QualityMonitor::new(services), sink)
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid start")))
}

#[test]
fn slow_turn_is_flagged_with_latency_evidence() {
    let (monitor, _) = monitor_with(&AppConfig::default(), clock());
    let outcome = monitor.ingest(
        TurnInput::new("conv-slow", "Find me a flight to Rome next week", "Here are the options.")
            .with_latency_ms(12_500)
            .with_stage(ConversationStage::Searching),
    );

    let timeout = outcome
        .detection
        .errors
        .iter()
        .find(|error| error.error_type == ErrorType::Timeout)
        .expect("timeout error");
    assert!(timeout.evidence.iter().any(|line| line.contains("12500ms")));
}

#[test]
fn spanish_speaker_gets_a_language_switch_to_es() {
    let (monitor, sink) = monitor_with(&AppConfig::default(), clock());
    let outcome =
        monitor.ingest(TurnInput::new("conv-es", "I need a flight to Madrid", "No entiendo inglés"));

    let mismatch = outcome
        .detection
        .errors
        .iter()
        .find(|error| error.error_type == ErrorType::LanguageMismatch)
        .expect("language mismatch");
    assert_eq!(mismatch.severity, Severity::Critical);

    let directive = outcome.directive.expect("directive");
    assert_eq!(directive.action_type, HealingActionType::LanguageSwitch);
    assert!(matches!(directive.directive, Directive::SwitchLanguage { ref language, .. } if language == "es"));

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].conversation_id, ConversationId("conv-es".to_string()));
}

#[test]
fn re_asking_for_provided_details_is_a_parsing_failure() {
    let (monitor, _) = monitor_with(&AppConfig::default(), clock());
    let outcome = monitor.ingest(
        TurnInput::new("conv-jfk", "next week to JFK", "When would you like to travel?")
            .with_stage(ConversationStage::Discovery),
    );
    assert!(outcome.detection.error_types().contains(&ErrorType::ParsingFailure));
}

#[test]
fn attempts_never_exceed_the_configured_limit() {
    let mut config = AppConfig::default();
    config.healing.max_attempts = 3;
    let (monitor, _) = monitor_with(&config, clock());
    let conversation = ConversationId("conv-loop".to_string());

    for _ in 0..8 {
        let outcome = monitor.ingest(
            TurnInput::new("conv-loop", "next week to JFK", "When would you like to travel?")
                .with_stage(ConversationStage::Discovery),
        );
        assert!(monitor.services().orchestrator.attempts(&conversation) <= 3);
        if monitor.services().orchestrator.attempts(&conversation) == 3 && outcome.directive.is_none() {
            assert!(outcome.requires_human_review());
        }
    }
    assert_eq!(monitor.services().orchestrator.attempts(&conversation), 3);
}

#[test]
fn bus_evicts_oldest_turns_beyond_capacity() {
    let mut config = AppConfig::default();
    config.telemetry.capacity = 5;
    let (monitor, _) = monitor_with(&config, clock());

    for index in 0..8 {
        monitor.ingest(TurnInput::new(format!("conv-{index}"), "hello", "Hi! Where to?"));
    }

    let bus = monitor.bus();
    assert_eq!(bus.len(), 5);
    let oldest = &bus.records(5)[0];
    assert_eq!(oldest.turn.conversation_id, ConversationId("conv-3".to_string()));
}

#[test]
fn mining_below_the_sample_floor_is_repeatably_empty() {
    let clock = clock();
    let (monitor, _) = monitor_with(&AppConfig::default(), clock.clone());
    for index in 0..4 {
        monitor.ingest(TurnInput::new(format!("conv-{index}"), "Thanks, perfect", "Booked!"));
    }

    let miner = LearningMiner::new(&AppConfig::default().learning, clock);
    let samples = monitor.mining_samples(miner.max_turns());
    for _ in 0..2 {
        assert!(matches!(miner.run_once(&samples), MiningOutcome::Skipped { .. }));
        assert!(miner.patterns().is_empty());
    }
}

#[test]
fn experiment_completes_once_and_stays_completed() {
    let clock = clock();
    let registry = ExperimentRegistry::new(clock.clone());
    let spec = |name: &str| VariantSpec {
        name: name.to_string(),
        directive: Directive::RefinePrompt { instruction: format!("use the {name} greeting") },
    };
    let test = registry.create("greeting", spec("control"), spec("treatment"));

    clock.advance(Duration::days(6));
    assert!(registry.evaluate(&test.id).expect("evaluate").completed_at.is_none());

    clock.advance(Duration::days(1));
    let completed = registry.evaluate(&test.id).expect("evaluate");
    let completed_at = completed.completed_at.expect("completed after seven days");

    clock.advance(Duration::days(3));
    let again = registry.evaluate(&test.id).expect("evaluate");
    assert_eq!(again.completed_at, Some(completed_at));
    assert!(registry
        .record_result(
            &test.id,
            sentinel_core::learning::VariantKind::Control,
            &VariantMetrics::default()
        )
        .is_err());
}

#[test]
fn adversarial_destinations_stay_below_the_intent_threshold() {
    let clock = clock();
    let config = AppConfig::default();
    let (monitor, _) = monitor_with(&config, clock.clone());
    let services = monitor.services();
    let generator = ScenarioGenerator::new(services.signals.clone(), services.detector.clone(), clock);

    let classification = services.signals.intent("Do you have flights to Mars?");
    assert!(classification.best_concrete_confidence() < INTENT_MATCH_THRESHOLD);

    let batch = generator.generate_batch(&BatchRequest {
        per_category: 6,
        categories: vec![ScenarioCategory::Adversarial],
        seed: 11,
    });
    let report = generator.test_batch(&batch.id).expect("batch exists");
    assert_eq!(report.total, 6);
    for result in &report.results {
        assert!(result.intent_confidence < INTENT_MATCH_THRESHOLD || !result.detected_intent.is_concrete());
    }
    assert!(generator.batch(&batch.id).and_then(|batch| batch.last_report).is_some());
}
