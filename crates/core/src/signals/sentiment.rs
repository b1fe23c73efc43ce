use std::sync::OnceLock;

use crate::errors::SignalError;
use crate::signals::lexicon::{compile_table, score_table, WeightedPattern};
use crate::signals::{saturate, SentimentLabel, SentimentScore, SentimentScorer};

const POSITIVE: &[(&str, f64, &str)] = &[
    (r"(?i)\b(thanks|thank you|thx|gracias|merci|danke|obrigad[oa]|grazie)\b", 1.0, "gratitude"),
    (r"(?i)\b(great|perfect|excellent|awesome|wonderful|amazing|fantastic|love it)\b", 1.0, "praise"),
    (r"(?i)\b(good|nice|helpful|sounds good|works for me)\b", 0.5, "approval"),
    (r"(?i)\b(book it|let'?s do it|i'?ll take it|yes please)\b", 1.0, "commitment"),
    (r"(?i)\b(perfecto|genial|parfait|super|perfekt|ótimo|perfetto)\b", 1.0, "praise-intl"),
];

const NEGATIVE: &[(&str, f64, &str)] = &[
    (r"(?i)\b(bad|wrong|disappointed|unhappy|problem|annoying)\b", 1.0, "complaint"),
    (r"(?i)\b(too expensive|too much|overpriced|not good|not great)\b", 1.0, "rejection"),
    (r"(?i)\b(don'?t like|doesn'?t work|not working|confusing|confused)\b", 1.0, "dissatisfaction"),
    (r"(?i)\b(no|nope|nah)\b", 0.25, "refusal"),
];

const FRUSTRATED: &[(&str, f64, &str)] = &[
    (r"(?i)\b(ridiculous|useless|terrible|awful|horrible|stupid|pathetic|waste of (my )?time)\b", 1.5, "hostility"),
    (r"(?i)(i already (told|said|gave|mentioned)|i just said|how many times|are you (even )?listening|not what i asked)", 1.5, "repetition"),
    (r"(?i)\b(forget it|never ?mind|give up|i'?m done)\b", 1.0, "disengagement"),
    (r"(?i)\b(again\?|seriously\?|what\?!)", 0.75, "exasperation"),
    (r"!{2,}", 0.75, "exclamations"),
    (r"\?{2,}", 0.5, "repeated-questions"),
];

/// Pattern-table sentiment scorer.
#[derive(Debug)]
pub struct RuleSentimentScorer {
    positive: &'static [WeightedPattern],
    negative: &'static [WeightedPattern],
    frustrated: &'static [WeightedPattern],
}

impl Default for RuleSentimentScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSentimentScorer {
    pub fn new() -> Self {
        static TABLES: OnceLock<[Vec<WeightedPattern>; 3]> = OnceLock::new();
        let [positive, negative, frustrated] = TABLES.get_or_init(|| {
            [compile_table(POSITIVE), compile_table(NEGATIVE), compile_table(FRUSTRATED)]
        });
        Self { positive, negative, frustrated }
    }

    pub fn score(&self, text: &str) -> SentimentScore {
        let (positive, mut evidence) = score_table(self.positive, text);
        let (negative, negative_cues) = score_table(self.negative, text);
        let (mut frustrated, frustrated_cues) = score_table(self.frustrated, text);
        evidence.extend(negative_cues);
        evidence.extend(frustrated_cues);

        if shouting_words(text) >= 2 {
            frustrated += 1.0;
            evidence.push("shouting".to_string());
        }

        let frustration_level = saturate(frustrated);
        let (label, confidence) = if frustrated >= 1.0 && frustrated >= negative {
            (SentimentLabel::Frustrated, saturate(frustrated))
        } else if positive == 0.0 && negative == 0.0 && frustrated == 0.0 {
            (SentimentLabel::Neutral, 0.5)
        } else if positive > negative + frustrated {
            (SentimentLabel::Positive, saturate(positive))
        } else if negative + frustrated > positive {
            (SentimentLabel::Negative, saturate(negative + frustrated))
        } else {
            (SentimentLabel::Neutral, 0.5)
        };

        SentimentScore { label, confidence, frustration_level, evidence }
    }
}

impl SentimentScorer for RuleSentimentScorer {
    fn score_sentiment(&self, text: &str) -> Result<SentimentScore, SignalError> {
        Ok(self.score(text))
    }
}

fn shouting_words(text: &str) -> usize {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphabetic()))
        .filter(|word| word.chars().count() >= 4)
        .filter(|word| word.chars().all(|c| c.is_uppercase()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::{RuleSentimentScorer, FRUSTRATED, NEGATIVE, POSITIVE};
    use crate::signals::lexicon::compile_table;
    use crate::signals::SentimentLabel;

    #[test]
    fn every_pattern_compiles() {
        assert_eq!(compile_table(POSITIVE).len(), POSITIVE.len());
        assert_eq!(compile_table(NEGATIVE).len(), NEGATIVE.len());
        assert_eq!(compile_table(FRUSTRATED).len(), FRUSTRATED.len());
    }

    #[test]
    fn gratitude_reads_positive() {
        let score = RuleSentimentScorer::new().score("Perfect, thank you so much!");
        assert_eq!(score.label, SentimentLabel::Positive);
        assert!(score.confidence > 0.6);
        assert!(score.frustration_level.abs() < f64::EPSILON);
    }

    #[test]
    fn plain_request_is_neutral() {
        let score = RuleSentimentScorer::new().score("I need a flight to Madrid");
        assert_eq!(score.label, SentimentLabel::Neutral);
        assert!((score.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn repeated_details_read_frustrated() {
        let score = RuleSentimentScorer::new()
            .score("I ALREADY TOLD you the date, this is ridiculous!!");
        assert_eq!(score.label, SentimentLabel::Frustrated);
        assert!(score.frustration_level >= 0.9);
        assert!(score.evidence.iter().any(|cue| cue == "repetition"));
    }

    #[test]
    fn mild_complaint_is_negative() {
        let score = RuleSentimentScorer::new().score("That hotel is too expensive");
        assert_eq!(score.label, SentimentLabel::Negative);
        assert!(score.frustration_level < 0.34);
    }
}
