//! Bounded, per-conversation remediation of detected errors.
//!
//! Each conversation carries an attempt counter. An error either passes the
//! [`HealingPolicy`] gate and gets the top-ranked candidate action for its type,
//! or falls through to human review. Applying the action is the host runtime's
//! job; the orchestrator only returns the directive and records the outcome.

pub mod actions;
pub mod policy;

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::clock::Clock;
use crate::detector::DetectionResult;
use crate::domain::error::DetectedError;
use crate::domain::healing::{HealingAction, HealingActionType, HealingResult};
use crate::domain::turn::{ConversationId, Turn};
use crate::signals::SignalSuite;

use self::actions::ActionContext;
pub use self::policy::{HealingGate, HealingPolicy};

#[derive(Default)]
struct OrchestratorState {
    attempts: HashMap<ConversationId, u32>,
    results: HashMap<String, HealingResult>,
    order: VecDeque<String>,
}

pub struct HealingOrchestrator {
    policy: HealingPolicy,
    retention: usize,
    signals: Arc<SignalSuite>,
    clock: Arc<dyn Clock>,
    state: Mutex<OrchestratorState>,
}

impl HealingOrchestrator {
    pub fn new(
        policy: HealingPolicy,
        retention: usize,
        signals: Arc<SignalSuite>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policy,
            retention: retention.max(1),
            signals,
            clock,
            state: Mutex::new(OrchestratorState::default()),
        }
    }

    pub fn policy(&self) -> &HealingPolicy {
        &self.policy
    }

    /// Remediates one error. Calling again for the same error id returns the
    /// recorded result without touching the attempt counter.
    pub fn heal(&self, error: &DetectedError, turn: &Turn) -> HealingResult {
        let mut state = self.lock_state();
        if let Some(existing) = state.results.get(&error.id) {
            return existing.clone();
        }
        let result = self.decide(&mut state, error, turn);
        self.store(&mut state, result.clone());
        result
    }

    /// Processes every error of one detection, most severe first. Only the first
    /// error that yields an applied action spends the turn's attempt; the rest
    /// are recorded as superseded.
    pub fn handle_detection(&self, detection: &DetectionResult, turn: &Turn) -> Vec<HealingResult> {
        let mut ordered: Vec<&DetectedError> = detection.errors.iter().collect();
        ordered.sort_by(|left, right| {
            right
                .severity
                .cmp(&left.severity)
                .then(right.confidence.partial_cmp(&left.confidence).unwrap_or(Ordering::Equal))
        });

        let mut state = self.lock_state();
        let mut applied: Option<HealingResult> = None;
        let mut results = Vec::with_capacity(ordered.len());
        for error in ordered {
            if let Some(existing) = state.results.get(&error.id) {
                if existing.applied() && applied.is_none() {
                    applied = Some(existing.clone());
                }
                results.push(existing.clone());
                continue;
            }

            let result = match &applied {
                Some(winner) => self.superseded(&state, error, winner),
                None => self.decide(&mut state, error, turn),
            };
            if result.applied() && applied.is_none() {
                applied = Some(result.clone());
            }
            self.store(&mut state, result.clone());
            results.push(result);
        }
        results
    }

    pub fn attempts(&self, conversation_id: &ConversationId) -> u32 {
        self.lock_state().attempts.get(conversation_id).copied().unwrap_or(0)
    }

    /// Clears a conversation's attempt counter. Returns the previous value.
    pub fn reset(&self, conversation_id: &ConversationId) -> u32 {
        let previous = self.lock_state().attempts.remove(conversation_id).unwrap_or(0);
        info!(
            event_name = "healing.conversation.reset",
            conversation_id = %conversation_id,
            previous_attempts = previous,
            "healing attempt counter reset"
        );
        previous
    }

    /// Retained results, oldest first.
    pub fn results(&self) -> Vec<HealingResult> {
        let state = self.lock_state();
        state.order.iter().filter_map(|id| state.results.get(id).cloned()).collect()
    }

    pub fn result_for(&self, error_id: &str) -> Option<HealingResult> {
        self.lock_state().results.get(error_id).cloned()
    }

    fn decide(
        &self,
        state: &mut OrchestratorState,
        error: &DetectedError,
        turn: &Turn,
    ) -> HealingResult {
        let attempts = state.attempts.get(&error.conversation_id).copied().unwrap_or(0);

        match self.policy.evaluate(error, attempts) {
            HealingGate::HumanReview { reason_code, reasoning } => {
                warn!(
                    event_name = "healing.review.required",
                    conversation_id = %error.conversation_id,
                    turn_id = %error.turn_id,
                    error_type = error.error_type.as_str(),
                    reason_code,
                    "healing gated to human review"
                );
                self.result(error, None, false, true, reasoning, attempts)
            }
            HealingGate::Proceed => {
                let response_language = self.signals.language(&turn.agent_response);
                let context = ActionContext { turn, response_language: &response_language };
                let mut candidates = actions::candidates(error, &context);
                actions::rank(&mut candidates);
                let candidate_count = candidates.len();
                let action = candidates.into_iter().next().unwrap_or_else(|| {
                    HealingAction::escalation(format!(
                        "no automated remediation for {}",
                        error.error_type
                    ))
                });

                let attempt = attempts + 1;
                state.attempts.insert(error.conversation_id.clone(), attempt);

                let automated = action.action_type != HealingActionType::HumanEscalation;
                info!(
                    event_name = "healing.action.selected",
                    conversation_id = %error.conversation_id,
                    turn_id = %error.turn_id,
                    error_type = error.error_type.as_str(),
                    action_type = action.action_type.as_str(),
                    priority = action.priority,
                    candidate_count,
                    attempt,
                    "healing action selected"
                );
                let reasoning = format!(
                    "selected {} (priority {}, fix probability {:.2}) from {} candidate(s) for {}",
                    action.action_type.as_str(),
                    action.priority,
                    action.expected_impact.fix_probability,
                    candidate_count,
                    error.error_type
                );
                self.result(error, Some(action), automated, !automated, reasoning, attempt)
            }
        }
    }

    fn superseded(
        &self,
        state: &OrchestratorState,
        error: &DetectedError,
        winner: &HealingResult,
    ) -> HealingResult {
        let attempts = state.attempts.get(&error.conversation_id).copied().unwrap_or(0);
        let reasoning = format!(
            "superseded by {} remediation already applied on this turn",
            winner.error_type
        );
        self.result(error, None, false, false, reasoning, attempts)
    }

    fn result(
        &self,
        error: &DetectedError,
        action: Option<HealingAction>,
        success: bool,
        requires_human_review: bool,
        reasoning: String,
        attempt: u32,
    ) -> HealingResult {
        HealingResult {
            error_id: error.id.clone(),
            turn_id: error.turn_id.clone(),
            conversation_id: error.conversation_id.clone(),
            error_type: error.error_type,
            action,
            success,
            requires_human_review,
            reasoning,
            attempt,
            recorded_at: self.clock.now(),
        }
    }

    fn store(&self, state: &mut OrchestratorState, result: HealingResult) {
        state.order.push_back(result.error_id.clone());
        state.results.insert(result.error_id.clone(), result);
        while state.order.len() > self.retention {
            if let Some(evicted) = state.order.pop_front() {
                state.results.remove(&evicted);
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, OrchestratorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
