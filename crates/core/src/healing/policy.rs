use crate::config::HealingConfig;
use crate::domain::error::{DetectedError, Severity};

#[derive(Clone, Debug, PartialEq)]
pub struct HealingPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub require_approval_for_critical: bool,
}

impl Default for HealingPolicy {
    fn default() -> Self {
        Self { enabled: true, max_attempts: 3, require_approval_for_critical: false }
    }
}

impl From<&HealingConfig> for HealingPolicy {
    fn from(config: &HealingConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            require_approval_for_critical: config.require_approval_for_critical,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HealingGate {
    Proceed,
    HumanReview { reason_code: &'static str, reasoning: String },
}

impl HealingPolicy {
    /// Decides whether automated remediation may run for `error` given the
    /// conversation's current attempt count.
    pub fn evaluate(&self, error: &DetectedError, attempts: u32) -> HealingGate {
        if !self.enabled {
            return HealingGate::HumanReview {
                reason_code: "healing_disabled",
                reasoning: "automated healing is disabled; routing to human review".to_string(),
            };
        }
        if !error.auto_fixable {
            return HealingGate::HumanReview {
                reason_code: "not_auto_fixable",
                reasoning: format!(
                    "{} errors are not auto-fixable; a human must verify the response",
                    error.error_type
                ),
            };
        }
        if error.severity == Severity::Critical && self.require_approval_for_critical {
            return HealingGate::HumanReview {
                reason_code: "critical_requires_approval",
                reasoning: format!(
                    "critical {} requires human approval before remediation",
                    error.error_type
                ),
            };
        }
        if attempts >= self.max_attempts {
            return HealingGate::HumanReview {
                reason_code: "attempts_exhausted",
                reasoning: format!(
                    "healing attempts exhausted ({attempts}/{}); escalating",
                    self.max_attempts
                ),
            };
        }
        HealingGate::Proceed
    }
}
