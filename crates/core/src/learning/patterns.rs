//! Trigram phrase mining over agent responses grouped by (intent, language).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::learning::MiningSample;
use crate::signals::lexicon;
use crate::signals::Intent;

/// Share of a group's responses a trigram must appear in.
pub const MIN_DOCUMENT_FREQUENCY: f64 = 0.2;
pub const MAX_SUCCESS_PATTERNS: usize = 50;
pub const MAX_FAILURE_PATTERNS: usize = 30;
/// Samples at which a success pattern reaches full confidence.
pub const CONFIDENCE_SAMPLES: f64 = 20.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuccessPattern {
    pub phrase: String,
    pub intent: Intent,
    pub language: String,
    pub success_rate: f64,
    pub sample_size: usize,
    pub confidence: f64,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailurePattern {
    pub phrase: String,
    pub intent: Intent,
    pub language: String,
    pub avg_satisfaction: f64,
    pub abandonment_rate: f64,
    pub sample_size: usize,
    pub impact: f64,
}

type GroupKey = (Intent, String);

struct Document<'a> {
    sample: &'a MiningSample,
    trigrams: BTreeSet<String>,
}

fn trigrams(text: &str) -> BTreeSet<String> {
    let words = lexicon::words(text);
    words.windows(3).map(|window| window.join(" ")).collect()
}

fn group<'a>(samples: &[&'a MiningSample]) -> BTreeMap<GroupKey, Vec<Document<'a>>> {
    let mut groups: BTreeMap<GroupKey, Vec<Document<'a>>> = BTreeMap::new();
    for sample in samples {
        groups
            .entry((sample.point.intent, sample.point.language.clone()))
            .or_default()
            .push(Document { sample, trigrams: trigrams(&sample.agent_response) });
    }
    groups
}

/// Trigrams present in at least [`MIN_DOCUMENT_FREQUENCY`] of `documents`.
fn frequent_phrases(documents: &[Document<'_>]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for document in documents {
        for phrase in &document.trigrams {
            *counts.entry(phrase.as_str()).or_default() += 1;
        }
    }
    let total = documents.len() as f64;
    counts
        .into_iter()
        .filter(|(_, count)| *count as f64 / total >= MIN_DOCUMENT_FREQUENCY)
        .map(|(phrase, _)| phrase.to_string())
        .collect()
}

/// Phrases frequent among successful responses, rated by how often a response
/// containing them in the same (intent, language) context succeeded.
pub fn mine_success(
    successes: &[&MiningSample],
    context: &[&MiningSample],
    min_group_samples: usize,
) -> Vec<SuccessPattern> {
    let context_groups = group(context);
    let mut patterns = Vec::new();

    for ((intent, language), documents) in group(successes) {
        if documents.len() < min_group_samples {
            continue;
        }
        let Some(peers) = context_groups.get(&(intent, language.clone())) else {
            continue;
        };
        for phrase in frequent_phrases(&documents) {
            let containing: Vec<&Document<'_>> =
                peers.iter().filter(|peer| peer.trigrams.contains(&phrase)).collect();
            if containing.is_empty() {
                continue;
            }
            let sample_size = containing.len();
            let succeeded = containing.iter().filter(|peer| peer.sample.is_success()).count();
            let success_rate = succeeded as f64 / sample_size as f64;
            let confidence = (sample_size as f64 / CONFIDENCE_SAMPLES).min(1.0);
            patterns.push(SuccessPattern {
                phrase,
                intent,
                language: language.clone(),
                success_rate,
                sample_size,
                confidence,
                score: success_rate * confidence,
            });
        }
    }

    patterns.sort_by(|left, right| {
        right.score.total_cmp(&left.score).then_with(|| left.phrase.cmp(&right.phrase))
    });
    patterns.truncate(MAX_SUCCESS_PATTERNS);
    patterns
}

/// Phrases frequent among unhealed failures, ranked by outcome impact.
pub fn mine_failure(failures: &[&MiningSample], min_group_samples: usize) -> Vec<FailurePattern> {
    let mut patterns = Vec::new();

    for ((intent, language), documents) in group(failures) {
        if documents.len() < min_group_samples {
            continue;
        }
        for phrase in frequent_phrases(&documents) {
            let containing: Vec<&MiningSample> = documents
                .iter()
                .filter(|document| document.trigrams.contains(&phrase))
                .map(|document| document.sample)
                .collect();
            let sample_size = containing.len();
            let avg_satisfaction =
                containing.iter().map(|sample| sample.point.satisfaction).sum::<f64>()
                    / sample_size as f64;
            let abandonment_rate =
                containing.iter().filter(|sample| sample.point.abandoned).count() as f64
                    / sample_size as f64;
            patterns.push(FailurePattern {
                phrase,
                intent,
                language: language.clone(),
                avg_satisfaction,
                abandonment_rate,
                sample_size,
                impact: 0.5 * (1.0 - avg_satisfaction) + 0.5 * abandonment_rate,
            });
        }
    }

    patterns.sort_by(|left, right| {
        right.impact.total_cmp(&left.impact).then_with(|| left.phrase.cmp(&right.phrase))
    });
    patterns.truncate(MAX_FAILURE_PATTERNS);
    patterns
}

#[cfg(test)]
mod tests {
    use super::{mine_failure, mine_success, trigrams};
    use crate::domain::learning::{LearningDataPoint, MiningSample};
    use crate::domain::turn::TurnId;
    use crate::signals::Intent;

    fn sample(index: usize, response: &str, converted: bool, error: bool, sat: f64) -> MiningSample {
        MiningSample {
            point: LearningDataPoint {
                turn_id: TurnId(format!("c-{index}#1")),
                intent: Intent::FlightSearch,
                language: "en".to_string(),
                had_error: error,
                error_type: None,
                was_healed: false,
                satisfaction: sat,
                converted,
                abandoned: error && sat < 0.2,
                abandonment_prevented: false,
            },
            agent_response: response.to_string(),
        }
    }

    #[test]
    fn trigrams_are_lowercased_word_windows() {
        let grams = trigrams("Great choice, I found THREE flights");
        assert!(grams.contains("great choice i"));
        assert!(grams.contains("found three flights"));
        assert_eq!(grams.len(), 4);
    }

    #[test]
    fn success_phrases_carry_rate_and_capped_confidence() {
        let mut samples: Vec<MiningSample> = (0..8)
            .map(|index| sample(index, "Great choice, I found three flights for you", true, false, 0.9))
            .collect();
        samples.push(sample(8, "Sorry, I found three flights but none fit", false, true, 0.3));
        let successes: Vec<&MiningSample> = samples.iter().filter(|s| s.is_success()).collect();
        let context: Vec<&MiningSample> = samples.iter().collect();

        let patterns = mine_success(&successes, &context, 5);
        let found = patterns
            .iter()
            .find(|pattern| pattern.phrase == "i found three")
            .expect("shared phrase mined");
        assert_eq!(found.sample_size, 9);
        assert!((found.success_rate - 8.0 / 9.0).abs() < 1e-9);
        assert!((found.confidence - 0.45).abs() < 1e-9);
        assert!(patterns.windows(2).all(|pair| pair[0].score >= pair[1].score));
    }

    #[test]
    fn small_groups_are_not_mined() {
        let samples: Vec<MiningSample> =
            (0..4).map(|index| sample(index, "when would you like to travel", false, true, 0.1)).collect();
        let failures: Vec<&MiningSample> = samples.iter().collect();
        assert!(mine_failure(&failures, 5).is_empty());
    }

    #[test]
    fn failure_impact_blends_dissatisfaction_and_abandonment() {
        let samples: Vec<MiningSample> = (0..6)
            .map(|index| {
                let sat = if index % 2 == 0 { 0.1 } else { 0.5 };
                sample(index, "when would you like to travel again", false, true, sat)
            })
            .collect();
        let failures: Vec<&MiningSample> = samples.iter().collect();
        let patterns = mine_failure(&failures, 5);
        let pattern = patterns
            .iter()
            .find(|pattern| pattern.phrase == "would you like")
            .expect("failure phrase");
        // avg satisfaction 0.3, half abandoned
        assert!((pattern.impact - (0.5 * 0.7 + 0.5 * 0.5)).abs() < 1e-9);
    }
}
