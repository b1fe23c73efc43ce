//! Synthetic conversation scenarios replayed through the extractors and the
//! detector to measure coverage and catch regressions.

pub mod templates;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::detector::{DetectionContext, ErrorDetector};
use crate::domain::error::ErrorType;
use crate::domain::turn::{ConversationStage, Turn, TurnInput};
use crate::errors::DomainError;
use crate::signals::{Intent, SignalSuite};

use self::templates::{Bindings, ScenarioTemplate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioCategory {
    EdgeCase,
    StressTest,
    Adversarial,
    Multilingual,
    Ambiguous,
}

impl ScenarioCategory {
    pub const ALL: [ScenarioCategory; 5] = [
        ScenarioCategory::EdgeCase,
        ScenarioCategory::StressTest,
        ScenarioCategory::Adversarial,
        ScenarioCategory::Multilingual,
        ScenarioCategory::Ambiguous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EdgeCase => "edge_case",
            Self::StressTest => "stress_test",
            Self::Adversarial => "adversarial",
            Self::Multilingual => "multilingual",
            Self::Ambiguous => "ambiguous",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptedTurn {
    pub user_message: String,
    pub agent_response: String,
    pub latency_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyntheticScenario {
    pub id: String,
    pub category: ScenarioCategory,
    pub difficulty: Difficulty,
    pub turns: Vec<ScriptedTurn>,
    pub expected_intent: Intent,
    pub expected_language: String,
    pub expected_errors: Vec<ErrorType>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchCoverage {
    pub languages: BTreeSet<String>,
    pub intents: BTreeSet<Intent>,
    pub error_types: BTreeSet<ErrorType>,
    pub categories: BTreeMap<ScenarioCategory, usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_id: String,
    pub category: ScenarioCategory,
    pub passed: bool,
    pub detected_intent: Intent,
    pub intent_confidence: f64,
    pub detected_language: String,
    pub detected_errors: Vec<ErrorType>,
    pub failures: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchTestReport {
    pub batch_id: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub accuracy: f64,
    /// Error types actually detected across the replay.
    pub detected_error_types: BTreeSet<ErrorType>,
    pub results: Vec<ScenarioResult>,
    pub tested_at: DateTime<Utc>,
}

impl BatchTestReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingBatch {
    pub id: String,
    pub seed: u64,
    pub scenarios: Vec<SyntheticScenario>,
    pub coverage: BatchCoverage,
    pub created_at: DateTime<Utc>,
    pub last_report: Option<BatchTestReport>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub per_category: usize,
    #[serde(default = "all_categories")]
    pub categories: Vec<ScenarioCategory>,
    #[serde(default)]
    pub seed: u64,
}

fn all_categories() -> Vec<ScenarioCategory> {
    ScenarioCategory::ALL.to_vec()
}

impl Default for BatchRequest {
    fn default() -> Self {
        Self { per_category: 5, categories: all_categories(), seed: 0 }
    }
}

/// Batches kept when no retention is configured.
pub const DEFAULT_BATCH_RETENTION: usize = 20;

pub struct ScenarioGenerator {
    signals: Arc<SignalSuite>,
    detector: Arc<ErrorDetector>,
    clock: Arc<dyn Clock>,
    retention: usize,
    batches: Mutex<VecDeque<TrainingBatch>>,
}

impl ScenarioGenerator {
    pub fn new(signals: Arc<SignalSuite>, detector: Arc<ErrorDetector>, clock: Arc<dyn Clock>) -> Self {
        Self {
            signals,
            detector,
            clock,
            retention: DEFAULT_BATCH_RETENTION,
            batches: Mutex::new(VecDeque::new()),
        }
    }

    /// Keeps at most `retention` batches, evicting the oldest first.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    /// Expands `per_category` scenarios for each requested category. The same
    /// seed always yields the same scenario texts.
    pub fn generate_batch(&self, request: &BatchRequest) -> TrainingBatch {
        let mut rng = StdRng::seed_from_u64(request.seed);
        let mut scenarios = Vec::new();
        for category in &request.categories {
            let family = templates::family(*category);
            let offset = rng.gen_range(0..family.len());
            for index in 0..request.per_category {
                let template = &family[(offset + index) % family.len()];
                scenarios.push(expand(template, &mut rng));
            }
        }

        let batch = TrainingBatch {
            id: Uuid::new_v4().to_string(),
            seed: request.seed,
            coverage: coverage(&scenarios),
            scenarios,
            created_at: self.clock.now(),
            last_report: None,
        };
        info!(
            event_name = "scenarios.batch.generated",
            batch_id = %batch.id,
            scenarios = batch.scenarios.len(),
            seed = request.seed,
            "synthetic batch generated"
        );
        let mut batches = self.lock();
        batches.push_back(batch.clone());
        while batches.len() > self.retention {
            if let Some(evicted) = batches.pop_front() {
                debug!(
                    event_name = "scenarios.batch.evicted",
                    batch_id = %evicted.id,
                    "oldest synthetic batch evicted"
                );
            }
        }
        batch
    }

    pub fn batch(&self, batch_id: &str) -> Option<TrainingBatch> {
        self.lock().iter().find(|batch| batch.id == batch_id).cloned()
    }

    /// Retained batches, oldest first.
    pub fn batches(&self) -> Vec<TrainingBatch> {
        self.lock().iter().cloned().collect()
    }

    /// Replays each scenario's first exchange and stores the report on the batch.
    pub fn test_batch(&self, batch_id: &str) -> Result<BatchTestReport, DomainError> {
        let scenarios = self
            .batch(batch_id)
            .map(|batch| batch.scenarios)
            .ok_or_else(|| DomainError::UnknownBatch(batch_id.to_string()))?;

        let results: Vec<ScenarioResult> =
            scenarios.iter().map(|scenario| self.replay(scenario)).collect();
        let total = results.len();
        let passed = results.iter().filter(|result| result.passed).count();
        let detected_error_types =
            results.iter().flat_map(|result| result.detected_errors.iter().copied()).collect();
        let report = BatchTestReport {
            batch_id: batch_id.to_string(),
            total,
            passed,
            failed: total - passed,
            accuracy: if total == 0 { 0.0 } else { passed as f64 / total as f64 },
            detected_error_types,
            results,
            tested_at: self.clock.now(),
        };

        info!(
            event_name = "scenarios.batch.tested",
            batch_id,
            total,
            passed,
            accuracy = report.accuracy,
            "synthetic batch replayed"
        );
        if let Some(batch) = self.lock().iter_mut().find(|batch| batch.id == batch_id) {
            batch.last_report = Some(report.clone());
        }
        Ok(report)
    }

    pub fn replay(&self, scenario: &SyntheticScenario) -> ScenarioResult {
        let mut failures = Vec::new();
        let Some(first) = scenario.turns.first() else {
            return ScenarioResult {
                scenario_id: scenario.id.clone(),
                category: scenario.category,
                passed: false,
                detected_intent: Intent::Unknown,
                intent_confidence: 0.0,
                detected_language: String::new(),
                detected_errors: Vec::new(),
                failures: vec!["scenario has no turns".to_string()],
            };
        };

        let input = TurnInput::new(
            format!("synthetic-{}", scenario.id),
            first.user_message.clone(),
            first.agent_response.clone(),
        )
        .with_latency_ms(first.latency_ms)
        .with_stage(ConversationStage::Discovery);
        let report = self.signals.analyze(&input.user_message);
        let turn = Turn::from_input(input, 1, &report, self.clock.now());
        let detection = self.detector.detect(&turn, &DetectionContext::default());
        let detected_errors = detection.error_types();

        if scenario.expected_intent == Intent::Unknown {
            if report.intent.intent.is_concrete() {
                failures.push(format!(
                    "expected no concrete intent, classifier chose {} at {:.2}",
                    report.intent.intent.as_str(),
                    report.intent.confidence
                ));
            }
        } else if report.intent.intent != scenario.expected_intent {
            failures.push(format!(
                "expected intent {}, detected {}",
                scenario.expected_intent.as_str(),
                report.intent.intent.as_str()
            ));
        }
        if report.language.language != scenario.expected_language {
            failures.push(format!(
                "expected language {}, detected {}",
                scenario.expected_language, report.language.language
            ));
        }
        if !scenario.expected_errors.is_empty()
            && !scenario.expected_errors.iter().any(|expected| detected_errors.contains(expected))
        {
            let expected: Vec<&str> = scenario.expected_errors.iter().map(ErrorType::as_str).collect();
            failures.push(format!("none of the expected errors detected: {}", expected.join(", ")));
        }

        ScenarioResult {
            scenario_id: scenario.id.clone(),
            category: scenario.category,
            passed: failures.is_empty(),
            detected_intent: report.intent.intent,
            intent_confidence: report.intent.confidence,
            detected_language: report.language.language,
            detected_errors,
            failures,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TrainingBatch>> {
        match self.batches.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn expand(template: &ScenarioTemplate, rng: &mut StdRng) -> SyntheticScenario {
    let bindings = Bindings::draw(rng);
    let mut turns = vec![ScriptedTurn {
        user_message: bindings.fill(template.user),
        agent_response: bindings.fill(template.agent),
        latency_ms: template.latency_ms,
    }];
    if let Some((user, agent)) = template.follow_up {
        turns.push(ScriptedTurn {
            user_message: bindings.fill(user),
            agent_response: bindings.fill(agent),
            latency_ms: template.latency_ms,
        });
    }
    SyntheticScenario {
        id: format!("{}-{:08x}", template.category.as_str(), rng.gen::<u32>()),
        category: template.category,
        difficulty: template.difficulty,
        turns,
        expected_intent: template.expected_intent,
        expected_language: template.expected_language.to_string(),
        expected_errors: template.expected_errors.to_vec(),
    }
}

fn coverage(scenarios: &[SyntheticScenario]) -> BatchCoverage {
    let mut coverage = BatchCoverage::default();
    for scenario in scenarios {
        coverage.languages.insert(scenario.expected_language.clone());
        coverage.intents.insert(scenario.expected_intent);
        coverage.error_types.extend(scenario.expected_errors.iter().copied());
        *coverage.categories.entry(scenario.category).or_default() += 1;
    }
    coverage
}
