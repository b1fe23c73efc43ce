//! Offline mining of accumulated turns: phrase patterns, detection accuracy,
//! and threshold refinement. A/B experiments live alongside but run on their
//! own cadence.

pub mod accuracy;
pub mod experiments;
pub mod patterns;
pub mod schedule;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::LearningConfig;
use crate::domain::learning::MiningSample;

pub use self::accuracy::DetectionAccuracy;
pub use self::experiments::{
    AbTest, ExperimentRegistry, ExperimentStatus, VariantKind, VariantMetrics, VariantSpec,
};
pub use self::patterns::{FailurePattern, SuccessPattern};
pub use self::schedule::{spawn_schedule, MiningSchedule, MiningSource};

/// Cooperative cancellation checked between mining steps.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiningStep {
    Partition,
    SuccessPatterns,
    FailurePatterns,
    Accuracy,
}

/// Current pattern snapshot. Replaced as a whole by a completed pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MinedPatterns {
    pub success: Vec<SuccessPattern>,
    pub failure: Vec<FailurePattern>,
    pub accuracy: Option<DetectionAccuracy>,
    pub sample_count: usize,
    pub mined_at: Option<DateTime<Utc>>,
}

impl MinedPatterns {
    pub fn is_empty(&self) -> bool {
        self.success.is_empty() && self.failure.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MiningReport {
    pub sample_count: usize,
    pub success_samples: usize,
    pub failure_samples: usize,
    pub success_patterns: usize,
    pub failure_patterns: usize,
    pub accuracy: DetectionAccuracy,
    pub completed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MiningOutcome {
    Skipped { reason: String },
    Cancelled { step: MiningStep },
    Completed(MiningReport),
}

#[derive(Clone, Debug, PartialEq)]
struct MinerSettings {
    max_turns: usize,
    min_samples: usize,
    min_group_samples: usize,
    accuracy_window: usize,
}

#[derive(Default)]
struct MinerState {
    patterns: MinedPatterns,
    last_outcome: Option<MiningOutcome>,
    last_run_at: Option<DateTime<Utc>>,
}

pub struct LearningMiner {
    settings: MinerSettings,
    clock: Arc<dyn Clock>,
    state: Mutex<MinerState>,
}

impl LearningMiner {
    pub fn new(config: &LearningConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings: MinerSettings {
                max_turns: config.max_turns,
                min_samples: config.min_samples,
                min_group_samples: config.min_group_samples,
                accuracy_window: config.accuracy_window,
            },
            clock,
            state: Mutex::new(MinerState::default()),
        }
    }

    pub fn max_turns(&self) -> usize {
        self.settings.max_turns
    }

    pub fn patterns(&self) -> MinedPatterns {
        self.lock_state().patterns.clone()
    }

    pub fn last_outcome(&self) -> Option<MiningOutcome> {
        self.lock_state().last_outcome.clone()
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.lock_state().last_run_at
    }

    pub fn run_once(&self, samples: &[MiningSample]) -> MiningOutcome {
        self.run_cancellable(samples, &CancellationFlag::default())
    }

    /// One mining pass. On `Skipped` or `Cancelled` the previous snapshot is
    /// left untouched.
    pub fn run_cancellable(&self, samples: &[MiningSample], cancel: &CancellationFlag) -> MiningOutcome {
        let outcome = self.mine(samples, cancel);
        let mut state = self.lock_state();
        state.last_run_at = Some(self.clock.now());
        match &outcome {
            MiningOutcome::Skipped { reason } => {
                debug!(event_name = "learning.mining.skipped", %reason, "mining pass skipped");
            }
            MiningOutcome::Cancelled { step } => {
                warn!(event_name = "learning.mining.cancelled", step = ?step, "mining pass cancelled");
            }
            MiningOutcome::Completed(report) => {
                info!(
                    event_name = "learning.mining.completed",
                    samples = report.sample_count,
                    success_patterns = report.success_patterns,
                    failure_patterns = report.failure_patterns,
                    accuracy = report.accuracy.accuracy,
                    "mining pass completed"
                );
            }
        }
        state.last_outcome = Some(outcome.clone());
        outcome
    }

    fn mine(&self, samples: &[MiningSample], cancel: &CancellationFlag) -> MiningOutcome {
        let settings = &self.settings;
        let start = samples.len().saturating_sub(settings.max_turns);
        let samples = &samples[start..];

        if cancel.is_cancelled() {
            return MiningOutcome::Cancelled { step: MiningStep::Partition };
        }
        let successes: Vec<&MiningSample> = samples.iter().filter(|s| s.is_success()).collect();
        let failures: Vec<&MiningSample> = samples.iter().filter(|s| s.is_failure()).collect();
        if samples.len() < settings.min_samples {
            return MiningOutcome::Skipped {
                reason: format!("{} samples, need {}", samples.len(), settings.min_samples),
            };
        }
        if successes.len() < settings.min_group_samples || failures.len() < settings.min_group_samples {
            return MiningOutcome::Skipped {
                reason: format!(
                    "{} successful and {} failed samples, need {} of each",
                    successes.len(),
                    failures.len(),
                    settings.min_group_samples
                ),
            };
        }

        if cancel.is_cancelled() {
            return MiningOutcome::Cancelled { step: MiningStep::SuccessPatterns };
        }
        let context: Vec<&MiningSample> = samples.iter().collect();
        let success = patterns::mine_success(&successes, &context, settings.min_group_samples);

        if cancel.is_cancelled() {
            return MiningOutcome::Cancelled { step: MiningStep::FailurePatterns };
        }
        let failure = patterns::mine_failure(&failures, settings.min_group_samples);

        if cancel.is_cancelled() {
            return MiningOutcome::Cancelled { step: MiningStep::Accuracy };
        }
        let accuracy = DetectionAccuracy::measure(samples, settings.accuracy_window);

        let completed_at = self.clock.now();
        let report = MiningReport {
            sample_count: samples.len(),
            success_samples: successes.len(),
            failure_samples: failures.len(),
            success_patterns: success.len(),
            failure_patterns: failure.len(),
            accuracy: accuracy.clone(),
            completed_at,
        };
        self.lock_state().patterns = MinedPatterns {
            success,
            failure,
            accuracy: Some(accuracy),
            sample_count: samples.len(),
            mined_at: Some(completed_at),
        };
        MiningOutcome::Completed(report)
    }

    fn lock_state(&self) -> MutexGuard<'_, MinerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
