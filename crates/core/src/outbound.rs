use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{DetectedError, Severity};
use crate::domain::turn::{ConversationId, Turn};

/// Payload for the critical-alert endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CriticalAlert {
    pub conversation_id: ConversationId,
    pub errors: Vec<DetectedError>,
    pub timestamp: DateTime<Utc>,
}

impl CriticalAlert {
    /// Alert for the critical subset of `errors`, if there is one.
    pub fn from_errors(
        conversation_id: &ConversationId,
        errors: &[DetectedError],
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        let critical: Vec<DetectedError> =
            errors.iter().filter(|error| error.severity == Severity::Critical).cloned().collect();
        (!critical.is_empty()).then(|| Self {
            conversation_id: conversation_id.clone(),
            errors: critical,
            timestamp,
        })
    }
}

/// Fire-and-forget delivery of turns and alerts to external systems.
/// Implementations swallow and log their own failures.
pub trait OutboundSink: Send + Sync {
    fn publish_turn(&self, turn: &Turn);
    fn raise_alert(&self, alert: &CriticalAlert);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopOutboundSink;

impl OutboundSink for NoopOutboundSink {
    fn publish_turn(&self, _turn: &Turn) {}

    fn raise_alert(&self, _alert: &CriticalAlert) {}
}

#[derive(Clone, Default)]
pub struct InMemoryOutboundSink {
    turns: Arc<Mutex<Vec<Turn>>>,
    alerts: Arc<Mutex<Vec<CriticalAlert>>>,
}

impl InMemoryOutboundSink {
    pub fn turns(&self) -> Vec<Turn> {
        match self.turns.lock() {
            Ok(turns) => turns.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn alerts(&self) -> Vec<CriticalAlert> {
        match self.alerts.lock() {
            Ok(alerts) => alerts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl OutboundSink for InMemoryOutboundSink {
    fn publish_turn(&self, turn: &Turn) {
        match self.turns.lock() {
            Ok(mut turns) => turns.push(turn.clone()),
            Err(poisoned) => poisoned.into_inner().push(turn.clone()),
        }
    }

    fn raise_alert(&self, alert: &CriticalAlert) {
        match self.alerts.lock() {
            Ok(mut alerts) => alerts.push(alert.clone()),
            Err(poisoned) => poisoned.into_inner().push(alert.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{CriticalAlert, InMemoryOutboundSink, OutboundSink};
    use crate::domain::error::{DetectedError, ErrorType};
    use crate::domain::turn::{ConversationId, TurnId};

    fn error(error_type: ErrorType) -> DetectedError {
        DetectedError::new(
            TurnId("c-9#1".to_owned()),
            ConversationId("c-9".to_owned()),
            error_type,
            error_type.base_severity(),
            0.9,
            vec!["cue".to_owned()],
            "observed",
            Utc::now(),
        )
    }

    #[test]
    fn alert_keeps_only_critical_errors() {
        let conversation = ConversationId("c-9".to_owned());
        let errors = vec![error(ErrorType::Timeout), error(ErrorType::LanguageMismatch)];
        let alert = CriticalAlert::from_errors(&conversation, &errors, Utc::now()).expect("critical");
        assert_eq!(alert.errors.len(), 1);
        assert_eq!(alert.errors[0].error_type, ErrorType::LanguageMismatch);

        assert!(CriticalAlert::from_errors(&conversation, &errors[..1], Utc::now()).is_none());
    }

    #[test]
    fn in_memory_sink_records_alerts() {
        let sink = InMemoryOutboundSink::default();
        let alert = CriticalAlert {
            conversation_id: ConversationId("c-9".to_owned()),
            errors: vec![error(ErrorType::Hallucination)],
            timestamp: Utc::now(),
        };
        sink.raise_alert(&alert);
        assert_eq!(sink.alerts(), vec![alert]);
        assert!(sink.turns().is_empty());
    }
}
