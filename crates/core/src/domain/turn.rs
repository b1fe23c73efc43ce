use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::signals::{Entities, Intent, SentimentLabel, SignalReport};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl TurnId {
    pub fn new(conversation_id: &ConversationId, sequence: u64) -> Self {
        Self(format!("{}#{sequence}", conversation_id.0))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Booking funnel position of a conversation, in funnel order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    #[default]
    Greeting,
    Discovery,
    Searching,
    Presenting,
    Booking,
    Completed,
    Abandoned,
}

impl ConversationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Discovery => "discovery",
            Self::Searching => "searching",
            Self::Presenting => "presenting",
            Self::Booking => "booking",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub abandoned: bool,
    #[serde(default)]
    pub booked: bool,
    #[serde(default)]
    pub booking_value: Option<Decimal>,
}

impl TurnOutcome {
    pub fn converted(&self) -> bool {
        self.booked || self.completed
    }
}

/// Exchange record as supplied by the hosting agent runtime after each turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnInput {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub session_id: SessionId,
    pub user_message: String,
    pub agent_response: String,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub stage: ConversationStage,
    #[serde(default)]
    pub language_hint: Option<String>,
    #[serde(default)]
    pub intent_hint: Option<Intent>,
    #[serde(default)]
    pub outcome: TurnOutcome,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl TurnInput {
    pub fn new(
        conversation_id: impl Into<String>,
        user_message: impl Into<String>,
        agent_response: impl Into<String>,
    ) -> Self {
        let conversation_id = conversation_id.into();
        Self {
            session_id: SessionId(format!("session-{conversation_id}")),
            conversation_id: ConversationId(conversation_id),
            user_message: user_message.into(),
            agent_response: agent_response.into(),
            latency_ms: 0,
            stage: ConversationStage::default(),
            language_hint: None,
            intent_hint: None,
            outcome: TurnOutcome::default(),
            recorded_at: None,
        }
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_stage(mut self, stage: ConversationStage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_language_hint(mut self, language: impl Into<String>) -> Self {
        self.language_hint = Some(language.into());
        self
    }

    pub fn with_outcome(mut self, outcome: TurnOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn recorded_at(mut self, at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(at);
        self
    }
}

/// One user-message/agent-response exchange plus everything the extractors derived
/// from it. Immutable once appended to the telemetry bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub conversation_id: ConversationId,
    pub session_id: SessionId,
    pub sequence: u64,
    pub user_message: String,
    pub agent_response: String,
    pub language: String,
    pub language_confidence: f64,
    pub language_hint: Option<String>,
    pub intent: Intent,
    pub intent_confidence: f64,
    pub entities: Entities,
    pub sentiment: SentimentLabel,
    pub sentiment_confidence: f64,
    pub frustration_level: f64,
    pub satisfaction: f64,
    pub latency_ms: u64,
    pub stage: ConversationStage,
    pub outcome: TurnOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl Turn {
    /// Builds the bus record for `input` from the signals extracted off its user
    /// message. Host hints fill in only where the extractors found nothing.
    pub fn from_input(
        input: TurnInput,
        sequence: u64,
        signals: &SignalReport,
        now: DateTime<Utc>,
    ) -> Self {
        let (language, language_confidence) = match &input.language_hint {
            Some(hint) if signals.language.confidence <= 0.0 => (hint.clone(), 0.0),
            _ => (signals.language.language.clone(), signals.language.confidence),
        };
        let intent = match input.intent_hint {
            Some(hint) if !signals.intent.intent.is_concrete() => hint,
            _ => signals.intent.intent,
        };
        let satisfaction = estimate_satisfaction(
            signals.sentiment.label,
            signals.sentiment.confidence,
            signals.sentiment.frustration_level,
            &input.outcome,
        );

        Self {
            id: TurnId::new(&input.conversation_id, sequence),
            conversation_id: input.conversation_id,
            session_id: input.session_id,
            sequence,
            user_message: input.user_message,
            agent_response: input.agent_response,
            language,
            language_confidence,
            language_hint: input.language_hint,
            intent,
            intent_confidence: signals.intent.confidence,
            entities: signals.intent.entities.clone(),
            sentiment: signals.sentiment.label,
            sentiment_confidence: signals.sentiment.confidence,
            frustration_level: signals.sentiment.frustration_level,
            satisfaction,
            latency_ms: input.latency_ms,
            stage: input.stage,
            outcome: input.outcome,
            recorded_at: input.recorded_at.unwrap_or(now),
        }
    }
}

/// Satisfaction proxy derived from the sentiment signal and the turn outcome.
pub fn estimate_satisfaction(
    sentiment: SentimentLabel,
    confidence: f64,
    frustration_level: f64,
    outcome: &TurnOutcome,
) -> f64 {
    let confidence = confidence.clamp(0.0, 1.0);
    let base = match sentiment {
        SentimentLabel::Positive => 0.7 + 0.3 * confidence,
        SentimentLabel::Neutral => 0.6,
        SentimentLabel::Negative => 0.4 - 0.2 * confidence,
        SentimentLabel::Frustrated => 0.3 * (1.0 - frustration_level.clamp(0.0, 1.0)),
    };

    let adjusted = if outcome.booked {
        base.max(0.9)
    } else if outcome.abandoned {
        base.min(0.2)
    } else {
        base
    };
    adjusted.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{estimate_satisfaction, ConversationId, ConversationStage, TurnId, TurnOutcome};
    use crate::signals::SentimentLabel;

    #[test]
    fn turn_id_embeds_conversation_and_sequence() {
        let id = TurnId::new(&ConversationId("conv-7".to_string()), 3);
        assert_eq!(id.0, "conv-7#3");
    }

    #[test]
    fn stages_are_ordered_along_the_funnel() {
        assert!(ConversationStage::Greeting < ConversationStage::Searching);
        assert!(ConversationStage::Booking < ConversationStage::Completed);
        assert!(ConversationStage::Abandoned.is_terminal());
        assert!(!ConversationStage::Presenting.is_terminal());
    }

    #[test]
    fn booked_outcome_lifts_satisfaction_floor() {
        let outcome = TurnOutcome {
            booked: true,
            booking_value: Some(Decimal::new(45_000, 2)),
            ..TurnOutcome::default()
        };
        let satisfaction = estimate_satisfaction(SentimentLabel::Negative, 1.0, 0.0, &outcome);
        assert!((satisfaction - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn frustration_drives_satisfaction_toward_zero() {
        let mild = estimate_satisfaction(SentimentLabel::Frustrated, 0.5, 0.2, &TurnOutcome::default());
        let severe =
            estimate_satisfaction(SentimentLabel::Frustrated, 1.0, 1.0, &TurnOutcome::default());
        assert!(mild > severe);
        assert!(severe.abs() < f64::EPSILON);
    }

    #[test]
    fn abandoned_outcome_caps_satisfaction() {
        let outcome = TurnOutcome { abandoned: true, ..TurnOutcome::default() };
        let satisfaction = estimate_satisfaction(SentimentLabel::Positive, 1.0, 0.0, &outcome);
        assert!(satisfaction <= 0.2);
    }
}
