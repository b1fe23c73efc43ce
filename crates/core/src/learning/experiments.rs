//! A/B experiments between remediation variants.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::healing::Directive;
use crate::domain::turn::ConversationId;
use crate::errors::DomainError;

pub const COMPLETION_CONVERSATIONS: u64 = 1_000;
pub const COMPLETION_DAYS: i64 = 7;
/// Relative score margin a variant needs to be declared the winner.
pub const WINNER_MARGIN: f64 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Control,
    Treatment,
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Control => "control",
            Self::Treatment => "treatment",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Running,
    Completed,
}

/// Counters reported by the host for a batch of conversations on one variant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantMetrics {
    pub conversations: u64,
    pub errors: u64,
    pub bookings: u64,
    pub abandonments: u64,
    pub total_satisfaction: f64,
}

impl VariantMetrics {
    fn absorb(&mut self, other: &VariantMetrics) {
        self.conversations = self.conversations.saturating_add(other.conversations);
        self.errors = self.errors.saturating_add(other.errors);
        self.bookings = self.bookings.saturating_add(other.bookings);
        self.abandonments = self.abandonments.saturating_add(other.abandonments);
        self.total_satisfaction += other.total_satisfaction;
    }

    fn rate(&self, count: u64) -> f64 {
        if self.conversations == 0 {
            0.0
        } else {
            (count as f64 / self.conversations as f64).min(1.0)
        }
    }

    pub fn booking_rate(&self) -> f64 {
        self.rate(self.bookings)
    }

    pub fn error_rate(&self) -> f64 {
        self.rate(self.errors)
    }

    pub fn abandonment_rate(&self) -> f64 {
        self.rate(self.abandonments)
    }

    pub fn avg_satisfaction(&self) -> f64 {
        if self.conversations == 0 {
            0.0
        } else {
            self.total_satisfaction / self.conversations as f64
        }
    }

    /// Weighted blend of booking, error, abandonment and satisfaction outcomes.
    pub fn score(&self) -> f64 {
        if self.conversations == 0 {
            return 0.0;
        }
        0.4 * self.booking_rate()
            + 0.2 * (1.0 - self.error_rate())
            + 0.2 * (1.0 - self.abandonment_rate())
            + 0.2 * self.avg_satisfaction()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    pub name: String,
    pub directive: Directive,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub directive: Directive,
    pub metrics: VariantMetrics,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    SampleSizeReached,
    DurationElapsed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentOutcome {
    pub control_score: f64,
    pub treatment_score: f64,
    /// `None` means no significant difference.
    pub winner: Option<VariantKind>,
    pub reason: CompletionReason,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbTest {
    pub id: String,
    pub name: String,
    pub control: Variant,
    pub treatment: Variant,
    pub status: ExperimentStatus,
    pub start_date: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<ExperimentOutcome>,
}

impl AbTest {
    pub fn variant(&self, kind: VariantKind) -> &Variant {
        match kind {
            VariantKind::Control => &self.control,
            VariantKind::Treatment => &self.treatment,
        }
    }

    pub fn total_conversations(&self) -> u64 {
        self.control.metrics.conversations.saturating_add(self.treatment.metrics.conversations)
    }

    fn completion_reason(&self, now: DateTime<Utc>) -> Option<CompletionReason> {
        if self.total_conversations() >= COMPLETION_CONVERSATIONS {
            Some(CompletionReason::SampleSizeReached)
        } else if now - self.start_date >= Duration::days(COMPLETION_DAYS) {
            Some(CompletionReason::DurationElapsed)
        } else {
            None
        }
    }

    /// Moves a running test to completed once a completion condition holds.
    /// No-op for a completed test. Returns whether this call completed it.
    fn try_complete(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == ExperimentStatus::Completed {
            return false;
        }
        let Some(reason) = self.completion_reason(now) else {
            return false;
        };

        let control_score = self.control.metrics.score();
        let treatment_score = self.treatment.metrics.score();
        self.status = ExperimentStatus::Completed;
        self.completed_at = Some(now);
        self.outcome = Some(ExperimentOutcome {
            control_score,
            treatment_score,
            winner: pick_winner(control_score, treatment_score),
            reason,
        });
        true
    }
}

fn pick_winner(control: f64, treatment: f64) -> Option<VariantKind> {
    if treatment > control * (1.0 + WINNER_MARGIN) {
        Some(VariantKind::Treatment)
    } else if control > treatment * (1.0 + WINNER_MARGIN) {
        Some(VariantKind::Control)
    } else {
        None
    }
}

pub struct ExperimentRegistry {
    clock: Arc<dyn Clock>,
    tests: Mutex<BTreeMap<String, AbTest>>,
}

impl ExperimentRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, tests: Mutex::new(BTreeMap::new()) }
    }

    pub fn create(&self, name: impl Into<String>, control: VariantSpec, treatment: VariantSpec) -> AbTest {
        let test = AbTest {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            control: Variant {
                name: control.name,
                directive: control.directive,
                metrics: VariantMetrics::default(),
            },
            treatment: Variant {
                name: treatment.name,
                directive: treatment.directive,
                metrics: VariantMetrics::default(),
            },
            status: ExperimentStatus::Running,
            start_date: self.clock.now(),
            completed_at: None,
            outcome: None,
        };
        info!(
            event_name = "learning.experiment.created",
            test_id = %test.id,
            name = %test.name,
            "a/b experiment created"
        );
        self.lock().insert(test.id.clone(), test.clone());
        test
    }

    /// Stable split: the same conversation always lands on the same variant.
    pub fn assign(&self, test_id: &str, conversation_id: &ConversationId) -> Result<VariantKind, DomainError> {
        if !self.lock().contains_key(test_id) {
            return Err(DomainError::UnknownExperiment(test_id.to_string()));
        }
        let digest = blake3::hash(format!("{test_id}:{}", conversation_id.0).as_bytes());
        Ok(if digest.as_bytes()[0] & 1 == 0 { VariantKind::Control } else { VariantKind::Treatment })
    }

    pub fn record_result(
        &self,
        test_id: &str,
        variant: VariantKind,
        metrics: &VariantMetrics,
    ) -> Result<AbTest, DomainError> {
        let now = self.clock.now();
        let mut tests = self.lock();
        let test = tests
            .get_mut(test_id)
            .ok_or_else(|| DomainError::UnknownExperiment(test_id.to_string()))?;
        if test.status != ExperimentStatus::Running {
            return Err(DomainError::ExperimentNotRunning(test_id.to_string()));
        }
        // A deadline that passed before this report closes the test without it.
        if test.try_complete(now) {
            log_completion(test);
            return Err(DomainError::ExperimentNotRunning(test_id.to_string()));
        }

        match variant {
            VariantKind::Control => test.control.metrics.absorb(metrics),
            VariantKind::Treatment => test.treatment.metrics.absorb(metrics),
        }
        if test.try_complete(now) {
            log_completion(test);
        }
        Ok(test.clone())
    }

    /// Applies the completion rules. Safe to call repeatedly.
    pub fn evaluate(&self, test_id: &str) -> Result<AbTest, DomainError> {
        let now = self.clock.now();
        let mut tests = self.lock();
        let test = tests
            .get_mut(test_id)
            .ok_or_else(|| DomainError::UnknownExperiment(test_id.to_string()))?;
        if test.try_complete(now) {
            log_completion(test);
        }
        Ok(test.clone())
    }

    /// Evaluates every running test; returns the ids completed by this call.
    pub fn evaluate_all(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut tests = self.lock();
        let mut completed = Vec::new();
        for test in tests.values_mut() {
            if test.try_complete(now) {
                log_completion(test);
                completed.push(test.id.clone());
            }
        }
        completed
    }

    pub fn get(&self, test_id: &str) -> Option<AbTest> {
        self.lock().get(test_id).cloned()
    }

    pub fn list(&self) -> Vec<AbTest> {
        let mut tests: Vec<AbTest> = self.lock().values().cloned().collect();
        tests.sort_by(|left, right| left.start_date.cmp(&right.start_date).then(left.id.cmp(&right.id)));
        tests
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, AbTest>> {
        match self.tests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn log_completion(test: &AbTest) {
    let winner = test
        .outcome
        .as_ref()
        .and_then(|outcome| outcome.winner)
        .map(|winner| winner.to_string())
        .unwrap_or_else(|| "no_difference".to_string());
    info!(
        event_name = "learning.experiment.completed",
        test_id = %test.id,
        conversations = test.total_conversations(),
        winner = %winner,
        "a/b experiment completed"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::{
        CompletionReason, ExperimentRegistry, ExperimentStatus, VariantKind, VariantMetrics,
        VariantSpec,
    };
    use crate::clock::ManualClock;
    use crate::domain::healing::Directive;
    use crate::domain::turn::ConversationId;
    use crate::errors::DomainError;

    fn setup() -> (Arc<ManualClock>, ExperimentRegistry, String) {
        let start = Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).single().unwrap_or_default();
        let clock = Arc::new(ManualClock::new(start));
        let registry = ExperimentRegistry::new(clock.clone());
        let test = registry.create(
            "empathetic-frustration-prompt",
            VariantSpec {
                name: "baseline".to_string(),
                directive: Directive::RefinePrompt { instruction: "Answer directly.".to_string() },
            },
            VariantSpec {
                name: "empathetic".to_string(),
                directive: Directive::RefinePrompt {
                    instruction: "Acknowledge frustration first.".to_string(),
                },
            },
        );
        (clock, registry, test.id)
    }

    fn metrics(conversations: u64, bookings: u64, satisfaction: f64) -> VariantMetrics {
        VariantMetrics {
            conversations,
            errors: conversations / 10,
            bookings,
            abandonments: conversations / 20,
            total_satisfaction: satisfaction * conversations as f64,
        }
    }

    #[test]
    fn completes_exactly_when_conversations_reach_one_thousand() {
        let (_, registry, id) = setup();
        let after_first = registry
            .record_result(&id, VariantKind::Control, &metrics(500, 50, 0.6))
            .expect("record control");
        assert_eq!(after_first.status, ExperimentStatus::Running);

        let almost = registry
            .record_result(&id, VariantKind::Treatment, &metrics(499, 120, 0.8))
            .expect("record treatment");
        assert_eq!(almost.status, ExperimentStatus::Running);

        let done = registry
            .record_result(&id, VariantKind::Treatment, &metrics(1, 1, 0.8))
            .expect("final record");
        assert_eq!(done.status, ExperimentStatus::Completed);
        let outcome = done.outcome.expect("outcome");
        assert_eq!(outcome.reason, CompletionReason::SampleSizeReached);
        assert_eq!(outcome.winner, Some(VariantKind::Treatment));
    }

    #[test]
    fn completes_after_seven_days_and_stays_completed() {
        let (clock, registry, id) = setup();
        registry.record_result(&id, VariantKind::Control, &metrics(10, 2, 0.7)).expect("record");
        registry.record_result(&id, VariantKind::Treatment, &metrics(10, 2, 0.71)).expect("record");

        clock.advance(Duration::days(6));
        assert_eq!(registry.evaluate(&id).expect("evaluate").status, ExperimentStatus::Running);

        clock.advance(Duration::days(1));
        let completed = registry.evaluate(&id).expect("evaluate");
        assert_eq!(completed.status, ExperimentStatus::Completed);
        let outcome = completed.outcome.clone().expect("outcome");
        assert_eq!(outcome.reason, CompletionReason::DurationElapsed);
        assert_eq!(outcome.winner, None);

        clock.advance(Duration::days(3));
        assert_eq!(registry.evaluate(&id).expect("re-evaluate"), completed);
        assert!(registry.evaluate_all().is_empty());
    }

    #[test]
    fn recording_into_a_completed_test_is_rejected() {
        let (clock, registry, id) = setup();
        clock.advance(Duration::days(8));
        registry.evaluate(&id).expect("evaluate");

        let error = registry
            .record_result(&id, VariantKind::Control, &metrics(1, 0, 0.5))
            .expect_err("completed test");
        assert_eq!(error, DomainError::ExperimentNotRunning(id));
    }

    #[test]
    fn late_results_after_the_deadline_are_not_scored() {
        let (clock, registry, id) = setup();
        registry.record_result(&id, VariantKind::Control, &metrics(100, 10, 0.6)).expect("record");
        registry.record_result(&id, VariantKind::Treatment, &metrics(100, 10, 0.6)).expect("record");

        clock.advance(Duration::days(8));
        let error = registry
            .record_result(&id, VariantKind::Treatment, &metrics(300, 200, 0.9))
            .expect_err("deadline passed");
        assert_eq!(error, DomainError::ExperimentNotRunning(id.clone()));

        let test = registry.get(&id).expect("test");
        assert_eq!(test.status, ExperimentStatus::Completed);
        assert_eq!(test.treatment.metrics.conversations, 100);
        let outcome = test.outcome.expect("outcome");
        assert_eq!(outcome.reason, CompletionReason::DurationElapsed);
        assert_eq!(outcome.winner, None);
    }

    #[test]
    fn huge_reported_counts_saturate_and_complete_the_test() {
        let (_, registry, id) = setup();
        registry.record_result(&id, VariantKind::Control, &metrics(500, 50, 0.6)).expect("record");

        let huge = VariantMetrics { conversations: u64::MAX, bookings: u64::MAX, ..VariantMetrics::default() };
        let done = registry.record_result(&id, VariantKind::Treatment, &huge).expect("record");
        assert_eq!(done.total_conversations(), u64::MAX);
        assert_eq!(done.status, ExperimentStatus::Completed);

        let again = registry.record_result(&id, VariantKind::Treatment, &huge).expect_err("completed");
        assert_eq!(again, DomainError::ExperimentNotRunning(id));
    }

    #[test]
    fn unknown_tests_are_reported() {
        let (_, registry, _) = setup();
        assert!(matches!(registry.evaluate("missing"), Err(DomainError::UnknownExperiment(_))));
        assert!(registry.assign("missing", &ConversationId("c".to_string())).is_err());
    }

    #[test]
    fn assignment_is_deterministic_and_splits_traffic() {
        let (_, registry, id) = setup();
        let conversation = ConversationId("conv-42".to_string());
        let first = registry.assign(&id, &conversation).expect("assign");
        assert_eq!(registry.assign(&id, &conversation).expect("assign"), first);

        let treatment = (0..200)
            .filter(|index| {
                registry.assign(&id, &ConversationId(format!("conv-{index}"))).ok()
                    == Some(VariantKind::Treatment)
            })
            .count();
        assert!((60..=140).contains(&treatment), "treatment share {treatment}");
    }

    #[test]
    fn score_blends_outcome_rates() {
        let metrics = VariantMetrics {
            conversations: 100,
            errors: 10,
            bookings: 30,
            abandonments: 20,
            total_satisfaction: 70.0,
        };
        let expected = 0.4 * 0.3 + 0.2 * 0.9 + 0.2 * 0.8 + 0.2 * 0.7;
        assert!((metrics.score() - expected).abs() < 1e-9);
        assert_eq!(VariantMetrics::default().score(), 0.0);
    }
}
