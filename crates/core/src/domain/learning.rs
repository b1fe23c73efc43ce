use serde::{Deserialize, Serialize};

use crate::domain::error::ErrorType;
use crate::domain::turn::TurnId;
use crate::signals::Intent;

/// Compact per-turn projection consumed by the learning miner. Derived from bus
/// records and healing outcomes; never authoritative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearningDataPoint {
    pub turn_id: TurnId,
    pub intent: Intent,
    pub language: String,
    pub had_error: bool,
    pub error_type: Option<ErrorType>,
    pub was_healed: bool,
    pub satisfaction: f64,
    pub converted: bool,
    pub abandoned: bool,
    pub abandonment_prevented: bool,
}

/// Data point paired with the agent text phrase mining runs over.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MiningSample {
    pub point: LearningDataPoint,
    pub agent_response: String,
}

impl MiningSample {
    pub fn is_success(&self) -> bool {
        self.point.converted || self.point.satisfaction > 0.7
    }

    pub fn is_failure(&self) -> bool {
        self.point.had_error && !self.point.was_healed
    }
}
