use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::ErrorType;
use crate::domain::turn::{ConversationId, TurnId};
use crate::signals::Intent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingActionType {
    LanguageSwitch,
    RouteSwitch,
    Clarification,
    PromptRefinement,
    HumanEscalation,
}

impl HealingActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LanguageSwitch => "language_switch",
            Self::RouteSwitch => "route_switch",
            Self::Clarification => "clarification",
            Self::PromptRefinement => "prompt_refinement",
            Self::HumanEscalation => "human_escalation",
        }
    }
}

/// Booking detail a clarification question asks the user for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingField {
    Date,
    Location,
    PassengerCount,
    Intent,
}

/// Instruction consumed by the host agent runtime to alter its next response.
/// The monitor never rewrites conversation text itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    SwitchLanguage { language: String, acknowledgment: String },
    SwitchRoute { route: String, intent: Intent },
    AskClarification { field: MissingField, question: String },
    RefinePrompt { instruction: String },
    EscalateToHuman { reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpectedImpact {
    pub fix_probability: f64,
    pub satisfaction_delta: f64,
    pub time_to_resolve_secs: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealingAction {
    pub id: String,
    pub action_type: HealingActionType,
    /// 0..=10, higher ranks first.
    pub priority: u8,
    pub directive: Directive,
    pub expected_impact: ExpectedImpact,
}

impl HealingAction {
    pub fn new(
        action_type: HealingActionType,
        priority: u8,
        directive: Directive,
        expected_impact: ExpectedImpact,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action_type,
            priority: priority.min(10),
            directive,
            expected_impact,
        }
    }

    pub fn escalation(reason: impl Into<String>) -> Self {
        Self::new(
            HealingActionType::HumanEscalation,
            1,
            Directive::EscalateToHuman { reason: reason.into() },
            ExpectedImpact {
                fix_probability: 0.8,
                satisfaction_delta: 0.1,
                time_to_resolve_secs: 300,
            },
        )
    }
}

/// Outcome record linking one detected error to the action selected for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealingResult {
    pub error_id: String,
    pub turn_id: TurnId,
    pub conversation_id: ConversationId,
    pub error_type: ErrorType,
    pub action: Option<HealingAction>,
    pub success: bool,
    pub requires_human_review: bool,
    pub reasoning: String,
    /// Attempt counter of the conversation after this result was recorded.
    pub attempt: u32,
    pub recorded_at: DateTime<Utc>,
}

impl HealingResult {
    pub fn applied(&self) -> bool {
        self.action.is_some()
    }
}
