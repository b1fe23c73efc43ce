use serde::{Deserialize, Serialize};

use crate::domain::learning::MiningSample;

/// Ground-truth proxy: a turn below this satisfaction "was actually an error".
pub const GROUND_TRUTH_SATISFACTION: f64 = 0.5;
pub const TARGET_PRECISION: f64 = 0.6;
pub const TARGET_RECALL: f64 = 0.6;
pub const THRESHOLD_STEP: f64 = 0.05;
pub const MAX_MIN_ERROR_CONFIDENCE: f64 = 0.5;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionAccuracy {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    pub sample_count: usize,
}

impl DetectionAccuracy {
    /// Scores the detector over the last `window` samples.
    pub fn measure(samples: &[MiningSample], window: usize) -> Self {
        let start = samples.len().saturating_sub(window);
        let mut metrics = Self::default();
        for sample in &samples[start..] {
            let actual = sample.point.satisfaction < GROUND_TRUTH_SATISFACTION;
            match (sample.point.had_error, actual) {
                (true, true) => metrics.true_positives += 1,
                (true, false) => metrics.false_positives += 1,
                (false, false) => metrics.true_negatives += 1,
                (false, true) => metrics.false_negatives += 1,
            }
        }
        metrics.sample_count = samples.len() - start;
        if metrics.sample_count == 0 {
            return metrics;
        }

        let tp = metrics.true_positives as f64;
        metrics.accuracy =
            (tp + metrics.true_negatives as f64) / metrics.sample_count as f64;
        metrics.precision = ratio(tp, tp + metrics.false_positives as f64);
        metrics.recall = ratio(tp, tp + metrics.false_negatives as f64);
        metrics.f1_score = ratio(
            2.0 * metrics.precision * metrics.recall,
            metrics.precision + metrics.recall,
        );
        metrics
    }

    /// Suggested detector emission floor. Low precision raises it, low recall
    /// lowers it; precision wins when both are short.
    pub fn recommend_min_error_confidence(&self, current: f64) -> Option<f64> {
        if self.sample_count == 0 {
            return None;
        }
        let proposed = if self.precision < TARGET_PRECISION {
            (current + THRESHOLD_STEP).min(MAX_MIN_ERROR_CONFIDENCE)
        } else if self.recall < TARGET_RECALL {
            (current - THRESHOLD_STEP).max(0.0)
        } else {
            return None;
        };
        ((proposed - current).abs() > f64::EPSILON).then_some(proposed)
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
