//! Hot path: turn in, directive out.
//!
//! `ingest` runs synchronously on the caller's thread. Turns of one
//! conversation are serialized behind a per-conversation lock and numbered in
//! arrival order; distinct conversations proceed in parallel.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::detector::{DetectionContext, DetectionResult, DetectorConfig, ErrorDetector};
use crate::domain::error::{DetectedError, ErrorType};
use crate::domain::healing::{HealingAction, HealingResult};
use crate::domain::learning::{LearningDataPoint, MiningSample};
use crate::domain::turn::{ConversationId, ConversationStage, Turn, TurnInput};
use crate::healing::{HealingOrchestrator, HealingPolicy};
use crate::learning::MiningSource;
use crate::outbound::{CriticalAlert, OutboundSink};
use crate::signals::SignalSuite;
use crate::telemetry::{TelemetryBus, TurnRecord};

/// Explicitly constructed services the monitor is wired from.
#[derive(Clone)]
pub struct MonitorServices {
    pub signals: Arc<SignalSuite>,
    pub bus: Arc<TelemetryBus>,
    pub detector: Arc<ErrorDetector>,
    pub orchestrator: Arc<HealingOrchestrator>,
    pub outbound: Arc<dyn OutboundSink>,
    pub clock: Arc<dyn Clock>,
}

impl MonitorServices {
    /// Rule-based extractors and config-driven detector, bus and orchestrator.
    pub fn from_config(
        config: &AppConfig,
        outbound: Arc<dyn OutboundSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let signals = Arc::new(SignalSuite::rule_based());
        Self {
            bus: Arc::new(TelemetryBus::new(config.telemetry.capacity, clock.clone())),
            detector: Arc::new(ErrorDetector::new(
                DetectorConfig::from(&config.detection),
                signals.clone(),
                clock.clone(),
            )),
            orchestrator: Arc::new(HealingOrchestrator::new(
                HealingPolicy::from(&config.healing),
                config.healing.result_retention,
                signals.clone(),
                clock.clone(),
            )),
            signals,
            outbound,
            clock,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IngestOutcome {
    pub turn: Arc<Turn>,
    pub detection: DetectionResult,
    pub healing: Vec<HealingResult>,
    /// The single applied action for this turn, if any.
    pub directive: Option<HealingAction>,
}

impl IngestOutcome {
    pub fn requires_human_review(&self) -> bool {
        self.healing.iter().any(|result| result.requires_human_review)
    }
}

#[derive(Debug, Default)]
struct ConversationState {
    last_sequence: u64,
    prior_errors: u32,
    turns: u32,
}

pub struct QualityMonitor {
    services: MonitorServices,
    conversations: Mutex<HashMap<ConversationId, Arc<Mutex<ConversationState>>>>,
}

impl QualityMonitor {
    pub fn new(services: MonitorServices) -> Self {
        Self { services, conversations: Mutex::new(HashMap::new()) }
    }

    pub fn services(&self) -> &MonitorServices {
        &self.services
    }

    pub fn bus(&self) -> &Arc<TelemetryBus> {
        &self.services.bus
    }

    pub fn ingest(&self, input: TurnInput) -> IngestOutcome {
        let services = &self.services;
        let conversation = self.conversation_state(&input.conversation_id);
        let mut state = lock(&conversation);

        state.last_sequence += 1;
        let report = services.signals.analyze(&input.user_message);
        let turn = services.bus.append(Turn::from_input(
            input,
            state.last_sequence,
            &report,
            services.clock.now(),
        ));

        let context =
            DetectionContext { prior_error_count: state.prior_errors, conversation_turns: state.turns };
        let detection = self.detect(&turn, &context);
        if detection.has_error {
            if let Err(error) = services.bus.record_errors(&turn.id, &detection.errors) {
                warn!(
                    event_name = "monitor.errors.unrecorded",
                    turn_id = %turn.id,
                    %error,
                    "detected errors could not be attached to the turn"
                );
            }
        }

        let healing = if detection.has_error { self.heal(&detection, &turn) } else { Vec::new() };
        for result in &healing {
            if let Err(error) = services.bus.record_healing(result) {
                warn!(
                    event_name = "monitor.healing.unrecorded",
                    turn_id = %turn.id,
                    %error,
                    "healing result could not be attached to the turn"
                );
            }
        }

        services.outbound.publish_turn(&turn);
        if let Some(alert) =
            CriticalAlert::from_errors(&turn.conversation_id, &detection.errors, services.clock.now())
        {
            services.outbound.raise_alert(&alert);
        }

        state.turns += 1;
        state.prior_errors =
            state.prior_errors.saturating_add(u32::try_from(detection.errors.len()).unwrap_or(u32::MAX));

        let directive =
            healing.iter().find(|result| result.applied()).and_then(|result| result.action.clone());
        info!(
            event_name = "monitor.turn.ingested",
            correlation_id = %turn.id,
            conversation_id = %turn.conversation_id,
            turn_id = %turn.id,
            error_count = detection.errors.len(),
            severity = detection.severity.map(|severity| severity.as_str()).unwrap_or("none"),
            directive = directive.as_ref().map(|action| action.action_type.as_str()).unwrap_or("none"),
            "turn ingested"
        );

        IngestOutcome { turn, detection, healing, directive }
    }

    /// Clears the conversation's healing attempts. Returns the previous count.
    pub fn reset_conversation(&self, conversation_id: &ConversationId) -> u32 {
        self.services.orchestrator.reset(conversation_id)
    }

    /// Newest `limit` bus records projected for the learning miner.
    pub fn samples(&self, limit: usize) -> Vec<MiningSample> {
        self.services.bus.records(limit).iter().map(project).collect()
    }

    fn detect(&self, turn: &Turn, context: &DetectionContext) -> DetectionResult {
        let detector = &self.services.detector;
        match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(turn, context))) {
            Ok(result) => result,
            Err(_) => {
                error!(
                    event_name = "monitor.detector.panicked",
                    conversation_id = %turn.conversation_id,
                    turn_id = %turn.id,
                    "error detector panicked; treating turn as no signal"
                );
                DetectionResult::clean(turn.id.clone())
            }
        }
    }

    fn heal(&self, detection: &DetectionResult, turn: &Turn) -> Vec<HealingResult> {
        let orchestrator = &self.services.orchestrator;
        match panic::catch_unwind(AssertUnwindSafe(|| orchestrator.handle_detection(detection, turn)))
        {
            Ok(results) => results,
            Err(_) => {
                error!(
                    event_name = "monitor.healing.panicked",
                    conversation_id = %turn.conversation_id,
                    turn_id = %turn.id,
                    "healing orchestrator panicked; escalating every error"
                );
                detection
                    .errors
                    .iter()
                    .map(|error| self.fallback_escalation(error))
                    .collect()
            }
        }
    }

    fn fallback_escalation(&self, error: &DetectedError) -> HealingResult {
        HealingResult {
            error_id: error.id.clone(),
            turn_id: error.turn_id.clone(),
            conversation_id: error.conversation_id.clone(),
            error_type: error.error_type,
            action: Some(HealingAction::escalation("healing pipeline failure")),
            success: false,
            requires_human_review: true,
            reasoning: "healing pipeline failed; escalated to a human agent".to_string(),
            attempt: 0,
            recorded_at: self.services.clock.now(),
        }
    }

    fn conversation_state(&self, conversation_id: &ConversationId) -> Arc<Mutex<ConversationState>> {
        let mut conversations = lock(&self.conversations);
        Arc::clone(conversations.entry(conversation_id.clone()).or_default())
    }
}

impl MiningSource for QualityMonitor {
    fn mining_samples(&self, max_samples: usize) -> Vec<MiningSample> {
        self.samples(max_samples)
    }
}

fn project(record: &TurnRecord) -> MiningSample {
    let turn = &record.turn;
    let had_error = record.had_error();
    let was_healed = record.was_healed();
    let abandoned = turn.outcome.abandoned || turn.stage == ConversationStage::Abandoned;
    let error_type = record
        .errors
        .iter()
        .max_by(|left, right| {
            left.severity.cmp(&right.severity).then(left.confidence.total_cmp(&right.confidence))
        })
        .map(|error| error.error_type);
    let abandonment_risk =
        record.errors.iter().any(|error| error.error_type == ErrorType::Abandonment);

    MiningSample {
        point: LearningDataPoint {
            turn_id: turn.id.clone(),
            intent: turn.intent,
            language: turn.language.clone(),
            had_error,
            error_type,
            was_healed,
            satisfaction: turn.satisfaction,
            converted: turn.outcome.converted(),
            abandoned,
            abandonment_prevented: abandonment_risk && was_healed && !abandoned,
        },
        agent_response: turn.agent_response.clone(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
