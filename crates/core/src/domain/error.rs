use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::turn::{ConversationId, TurnId};

/// Closed taxonomy of conversation failure modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorType {
    ParsingFailure,
    IntentMisunderstanding,
    LanguageMismatch,
    Hallucination,
    OutOfScope,
    ApiFailure,
    Timeout,
    Abandonment,
    LowConfidence,
    UserFrustration,
}

impl ErrorType {
    pub const ALL: [ErrorType; 10] = [
        ErrorType::ParsingFailure,
        ErrorType::IntentMisunderstanding,
        ErrorType::LanguageMismatch,
        ErrorType::Hallucination,
        ErrorType::OutOfScope,
        ErrorType::ApiFailure,
        ErrorType::Timeout,
        ErrorType::Abandonment,
        ErrorType::LowConfidence,
        ErrorType::UserFrustration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParsingFailure => "parsing-failure",
            Self::IntentMisunderstanding => "intent-misunderstanding",
            Self::LanguageMismatch => "language-mismatch",
            Self::Hallucination => "hallucination",
            Self::OutOfScope => "out-of-scope",
            Self::ApiFailure => "api-failure",
            Self::Timeout => "timeout",
            Self::Abandonment => "abandonment",
            Self::LowConfidence => "low-confidence",
            Self::UserFrustration => "user-frustration",
        }
    }

    /// Severity assigned to every instance unless a detector rule escalates it.
    pub fn base_severity(&self) -> Severity {
        match self {
            Self::LanguageMismatch | Self::Hallucination => Severity::Critical,
            Self::IntentMisunderstanding
            | Self::ApiFailure
            | Self::Abandonment
            | Self::UserFrustration => Severity::High,
            Self::ParsingFailure | Self::Timeout => Severity::Medium,
            Self::OutOfScope | Self::LowConfidence => Severity::Low,
        }
    }

    /// Static property of the type: whether remediation may run without a human.
    pub fn auto_fixable(&self) -> bool {
        !matches!(self, Self::Hallucination | Self::ApiFailure)
    }

    pub fn expected_behavior(&self) -> &'static str {
        match self {
            Self::ParsingFailure => "agent uses the details the user already provided",
            Self::IntentMisunderstanding => "agent responds to the intent the user expressed",
            Self::LanguageMismatch => "agent replies in the user's language",
            Self::Hallucination => "agent states only verifiable inventory and policy facts",
            Self::OutOfScope => "agent redirects out-of-scope requests back to travel booking",
            Self::ApiFailure => "agent returns results from upstream inventory services",
            Self::Timeout => "agent responds within the latency budget",
            Self::Abandonment => "conversation progresses toward a booking",
            Self::LowConfidence => "agent acts on a clearly classified request",
            Self::UserFrustration => "user remains satisfied with the exchange",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedError {
    pub id: String,
    pub turn_id: TurnId,
    pub conversation_id: ConversationId,
    pub error_type: ErrorType,
    pub severity: Severity,
    /// Per-type match score normalized to `[0, 1]`; not a calibrated probability.
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub expected_behavior: String,
    pub actual_behavior: String,
    pub auto_fixable: bool,
    pub detected_at: DateTime<Utc>,
}

impl DetectedError {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        turn_id: TurnId,
        conversation_id: ConversationId,
        error_type: ErrorType,
        severity: Severity,
        confidence: f64,
        evidence: Vec<String>,
        actual_behavior: impl Into<String>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            turn_id,
            conversation_id,
            error_type,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            evidence,
            expected_behavior: error_type.expected_behavior().to_string(),
            actual_behavior: actual_behavior.into(),
            auto_fixable: error_type.auto_fixable(),
            detected_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorType, Severity};

    #[test]
    fn taxonomy_serializes_as_kebab_case() {
        let encoded = serde_json::to_string(&ErrorType::LanguageMismatch).unwrap_or_default();
        assert_eq!(encoded, "\"language-mismatch\"");
        for error_type in ErrorType::ALL {
            let encoded = serde_json::to_string(&error_type).unwrap_or_default();
            assert_eq!(encoded, format!("\"{}\"", error_type.as_str()));
        }
    }

    #[test]
    fn severity_orders_from_low_to_critical() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn fabricated_facts_and_upstream_failures_need_a_human() {
        assert!(!ErrorType::Hallucination.auto_fixable());
        assert!(!ErrorType::ApiFailure.auto_fixable());
        assert!(ErrorType::LanguageMismatch.auto_fixable());
        assert_eq!(ErrorType::LanguageMismatch.base_severity(), Severity::Critical);
    }
}
