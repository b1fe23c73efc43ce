//! Rule engine classifying a turn into zero or more [`DetectedError`]s.

pub mod rules;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::config::DetectionConfig;
use crate::domain::error::{DetectedError, ErrorType, Severity};
use crate::domain::turn::{Turn, TurnId};
use crate::signals::{saturate, SignalSuite};

use self::rules::RuleInput;

#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    pub timeout_threshold_ms: u64,
    /// Abandonment needs strictly more prior errors than this.
    pub abandonment_error_threshold: u32,
    pub low_confidence_threshold: f64,
    pub min_error_confidence: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            timeout_threshold_ms: 10_000,
            abandonment_error_threshold: 2,
            low_confidence_threshold: 0.3,
            min_error_confidence: 0.0,
        }
    }
}

impl From<&DetectionConfig> for DetectorConfig {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            timeout_threshold_ms: config.timeout_threshold_ms,
            abandonment_error_threshold: config.abandonment_error_threshold,
            low_confidence_threshold: config.low_confidence_threshold,
            min_error_confidence: config.min_error_confidence,
        }
    }
}

/// Conversation state the detector cannot derive from the turn alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionContext {
    pub prior_error_count: u32,
    pub conversation_turns: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub turn_id: TurnId,
    pub has_error: bool,
    pub errors: Vec<DetectedError>,
    pub severity: Option<Severity>,
    /// Mean of per-error confidences, or 1.0 when nothing was emitted.
    pub confidence: f64,
}

impl DetectionResult {
    pub fn clean(turn_id: TurnId) -> Self {
        Self { turn_id, has_error: false, errors: Vec::new(), severity: None, confidence: 1.0 }
    }

    pub fn from_errors(turn_id: TurnId, errors: Vec<DetectedError>) -> Self {
        if errors.is_empty() {
            return Self::clean(turn_id);
        }
        let severity = errors.iter().map(|error| error.severity).max();
        let confidence =
            errors.iter().map(|error| error.confidence).sum::<f64>() / errors.len() as f64;
        Self { turn_id, has_error: true, errors, severity, confidence }
    }

    pub fn has_critical(&self) -> bool {
        self.severity == Some(Severity::Critical)
    }

    pub fn error_types(&self) -> Vec<ErrorType> {
        self.errors.iter().map(|error| error.error_type).collect()
    }
}

pub struct ErrorDetector {
    config: DetectorConfig,
    min_error_confidence: AtomicU64,
    signals: Arc<SignalSuite>,
    clock: Arc<dyn Clock>,
}

impl ErrorDetector {
    pub fn new(config: DetectorConfig, signals: Arc<SignalSuite>, clock: Arc<dyn Clock>) -> Self {
        let min_error_confidence = AtomicU64::new(config.min_error_confidence.to_bits());
        Self { config, min_error_confidence, signals, clock }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn min_error_confidence(&self) -> f64 {
        f64::from_bits(self.min_error_confidence.load(Ordering::Relaxed))
    }

    /// Adjusts the emission floor; the learning schedule tunes this from
    /// measured precision and recall.
    pub fn set_min_error_confidence(&self, value: f64) {
        let value = value.clamp(0.0, 1.0);
        self.min_error_confidence.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn detect(&self, turn: &Turn, context: &DetectionContext) -> DetectionResult {
        let response_language = self.signals.language(&turn.agent_response);
        let response_intent = self.signals.intent(&turn.agent_response);
        let input = RuleInput {
            turn,
            context,
            config: &self.config,
            response_language: &response_language,
            response_intent: &response_intent,
        };

        let floor = self.min_error_confidence();
        let detected_at = self.clock.now();
        let errors: Vec<DetectedError> = ErrorType::ALL
            .iter()
            .filter_map(|error_type| {
                let finding = rules::evaluate(*error_type, &input)?;
                let confidence = saturate(finding.score);
                if confidence < floor {
                    debug!(
                        event_name = "detector.error.suppressed",
                        turn_id = %turn.id,
                        error_type = error_type.as_str(),
                        confidence,
                        floor,
                        "finding below emission threshold"
                    );
                    return None;
                }
                Some(DetectedError::new(
                    turn.id.clone(),
                    turn.conversation_id.clone(),
                    *error_type,
                    finding.severity,
                    confidence,
                    finding.evidence,
                    finding.actual_behavior,
                    detected_at,
                ))
            })
            .collect();

        DetectionResult::from_errors(turn.id.clone(), errors)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::{DetectionContext, DetectorConfig, ErrorDetector};
    use crate::clock::SystemClock;
    use crate::domain::error::{ErrorType, Severity};
    use crate::domain::turn::{ConversationStage, Turn, TurnInput};
    use crate::signals::SignalSuite;

    fn detector() -> ErrorDetector {
        ErrorDetector::new(
            DetectorConfig::default(),
            Arc::new(SignalSuite::rule_based()),
            Arc::new(SystemClock),
        )
    }

    fn turn(input: TurnInput) -> Turn {
        let suite = SignalSuite::rule_based();
        let report = suite.analyze(&input.user_message);
        let at = Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).single().unwrap_or_default();
        Turn::from_input(input, 1, &report, at)
    }

    fn types(turn: &Turn, context: DetectionContext) -> Vec<ErrorType> {
        detector().detect(turn, &context).error_types()
    }

    #[test]
    fn clean_exchange_is_confident_no_error() {
        let turn = turn(
            TurnInput::new("c-1", "I need a flight to Paris", "Great choice! When would you like to fly?")
                .with_stage(ConversationStage::Discovery)
                .with_latency_ms(900),
        );
        let result = detector().detect(&turn, &DetectionContext::default());
        assert!(!result.has_error, "{:?}", result.errors);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(result.severity, None);
    }

    #[test]
    fn slow_response_emits_timeout_with_latency_evidence() {
        let turn = turn(
            TurnInput::new("c-1", "I need a flight to Paris", "Here are three options.")
                .with_latency_ms(12_500),
        );
        let result = detector().detect(&turn, &DetectionContext::default());
        let timeout = result
            .errors
            .iter()
            .find(|error| error.error_type == ErrorType::Timeout)
            .expect("timeout error");
        assert_eq!(timeout.severity, Severity::Medium);
        assert!(timeout.evidence.iter().any(|cue| cue == "latency 12500ms exceeded 10000ms threshold"));
    }

    #[test]
    fn very_slow_response_escalates_timeout_severity() {
        let turn = turn(TurnInput::new("c-1", "hotel in Rome", "Here you go.").with_latency_ms(25_000));
        let result = detector().detect(&turn, &DetectionContext::default());
        assert_eq!(result.severity, Some(Severity::High));
    }

    #[test]
    fn spanish_reply_to_english_user_is_critical_mismatch() {
        let turn = turn(TurnInput::new("c-1", "I need a flight to Madrid", "No entiendo inglés"));
        let result = detector().detect(&turn, &DetectionContext::default());
        let mismatch = result
            .errors
            .iter()
            .find(|error| error.error_type == ErrorType::LanguageMismatch)
            .expect("language mismatch");
        assert_eq!(mismatch.severity, Severity::Critical);
        assert!(mismatch.auto_fixable);
        assert!(result.has_critical());
    }

    #[test]
    fn english_reply_in_spanish_conversation_is_flagged_from_language_hint() {
        let turn = turn(
            TurnInput::new("c-hint", "ok", "When would you like to travel?").with_language_hint("es"),
        );
        assert_eq!(turn.language, "es");

        let result = detector().detect(&turn, &DetectionContext::default());
        let mismatch = result
            .errors
            .iter()
            .find(|error| error.error_type == ErrorType::LanguageMismatch)
            .expect("language mismatch");
        assert!(mismatch
            .evidence
            .iter()
            .any(|cue| cue == "conversation language is es, agent replied in en"));
        assert!(!mismatch.evidence.iter().any(|cue| cue.starts_with("user wrote")));
    }

    #[test]
    fn re_asking_for_given_date_is_parsing_failure() {
        let turn = turn(
            TurnInput::new("c-1", "next week to JFK", "When would you like to travel?")
                .with_stage(ConversationStage::Discovery),
        );
        assert!(types(&turn, DetectionContext::default()).contains(&ErrorType::ParsingFailure));
    }

    #[test]
    fn abandonment_needs_prior_errors_above_threshold_and_frustration() {
        let turn = turn(
            TurnInput::new(
                "c-1",
                "This is ridiculous, I already told you the dates!!",
                "Could you tell me your travel dates?",
            )
            .with_stage(ConversationStage::Searching),
        );
        let at_threshold = DetectionContext { prior_error_count: 2, conversation_turns: 4 };
        let above = DetectionContext { prior_error_count: 3, conversation_turns: 5 };

        assert!(!types(&turn, at_threshold).contains(&ErrorType::Abandonment));
        assert!(types(&turn, above).contains(&ErrorType::Abandonment));
        assert!(types(&turn, above).contains(&ErrorType::UserFrustration));
    }

    #[test]
    fn upstream_failure_is_not_auto_fixable() {
        let turn = turn(TurnInput::new(
            "c-1",
            "Find me a hotel in Rome",
            "Sorry, something went wrong. Please try again later.",
        ));
        let result = detector().detect(&turn, &DetectionContext::default());
        let failure = result
            .errors
            .iter()
            .find(|error| error.error_type == ErrorType::ApiFailure)
            .expect("api failure");
        assert!(!failure.auto_fixable);
    }

    #[test]
    fn raising_the_floor_suppresses_weak_findings() {
        let detector = detector();
        let turn = turn(
            TurnInput::new("c-1", "Find me a hotel in Rome", "I think maybe this one works.")
                .with_stage(ConversationStage::Presenting),
        );
        let before = detector.detect(&turn, &DetectionContext::default());
        assert!(before.error_types().contains(&ErrorType::LowConfidence));

        detector.set_min_error_confidence(0.5);
        let after = detector.detect(&turn, &DetectionContext::default());
        assert!(!after.error_types().contains(&ErrorType::LowConfidence));
    }

    #[test]
    fn overall_confidence_is_mean_of_emitted_errors() {
        let turn = turn(
            TurnInput::new("c-1", "I need a flight to Madrid", "No entiendo inglés")
                .with_latency_ms(15_000),
        );
        let result = detector().detect(&turn, &DetectionContext::default());
        let mean = result.errors.iter().map(|error| error.confidence).sum::<f64>()
            / result.errors.len() as f64;
        assert!((result.confidence - mean).abs() < 1e-9);
        assert_eq!(result.severity, Some(Severity::Critical));
    }
}
