//! One rule per error type. Each returns the weighted match score for its type
//! together with the cues that produced it; the detector normalizes scores.

use std::sync::OnceLock;

use crate::detector::{DetectionContext, DetectorConfig};
use crate::domain::error::{ErrorType, Severity};
use crate::domain::turn::{ConversationStage, Turn};
use crate::signals::lexicon::{self, compile_table, score_table, WeightedPattern};
use crate::signals::{IntentClassification, LanguageGuess, SentimentLabel, SATURATION};

/// Minimum language-detector confidence before a language difference counts.
const LANGUAGE_EVIDENCE_FLOOR: f64 = 0.3;

pub struct RuleInput<'a> {
    pub turn: &'a Turn,
    pub context: &'a DetectionContext,
    pub config: &'a DetectorConfig,
    pub response_language: &'a LanguageGuess,
    pub response_intent: &'a IntentClassification,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Finding {
    pub score: f64,
    pub evidence: Vec<String>,
    pub severity: Severity,
    pub actual_behavior: String,
}

impl Finding {
    fn new(error_type: ErrorType) -> Self {
        Self {
            score: 0.0,
            evidence: Vec::new(),
            severity: error_type.base_severity(),
            actual_behavior: String::new(),
        }
    }

    fn add(&mut self, weight: f64, evidence: impl Into<String>) {
        self.score += weight;
        self.evidence.push(evidence.into());
    }

    fn add_table(&mut self, table: &[WeightedPattern], text: &str, prefix: &str) {
        let (score, cues) = score_table(table, text);
        self.score += score;
        self.evidence.extend(cues.into_iter().map(|cue| format!("{prefix}: {cue}")));
    }

    fn finish(mut self, actual_behavior: impl Into<String>) -> Option<Self> {
        if self.score > 0.0 {
            self.actual_behavior = actual_behavior.into();
            Some(self)
        } else {
            None
        }
    }
}

pub fn evaluate(error_type: ErrorType, input: &RuleInput<'_>) -> Option<Finding> {
    match error_type {
        ErrorType::ParsingFailure => parsing_failure(input),
        ErrorType::IntentMisunderstanding => intent_misunderstanding(input),
        ErrorType::LanguageMismatch => language_mismatch(input),
        ErrorType::Hallucination => hallucination(input),
        ErrorType::OutOfScope => out_of_scope(input),
        ErrorType::ApiFailure => api_failure(input),
        ErrorType::Timeout => timeout(input),
        ErrorType::Abandonment => abandonment(input),
        ErrorType::LowConfidence => low_confidence(input),
        ErrorType::UserFrustration => user_frustration(input),
    }
}

struct Tables {
    asks_date: Vec<WeightedPattern>,
    asks_location: Vec<WeightedPattern>,
    asks_passengers: Vec<WeightedPattern>,
    rephrase: Vec<WeightedPattern>,
    user_correction: Vec<WeightedPattern>,
    agent_confusion: Vec<WeightedPattern>,
    cannot_understand: Vec<WeightedPattern>,
    fabricated_claims: Vec<WeightedPattern>,
    premature_confirmation: Vec<WeightedPattern>,
    offers_inventory: Vec<WeightedPattern>,
    off_topic_request: Vec<WeightedPattern>,
    scope_refusal: Vec<WeightedPattern>,
    upstream_failure: Vec<WeightedPattern>,
    walking_away: Vec<WeightedPattern>,
    hedging: Vec<WeightedPattern>,
}

const ASKS_DATE: &[(&str, f64, &str)] = &[(
    r"(?i)\b(when would you like|what dates?|which dates?|when (do|are) you (want|plan|planning)|what day|your travel dates?|when are you (leaving|traveling|travelling|flying))\b",
    1.0,
    "asks-date",
)];

const ASKS_LOCATION: &[(&str, f64, &str)] = &[(
    r"(?i)\b(where (would|do) you (like|want)|which (city|destination|airport)|where are you (flying|traveling|travelling|going|headed)|what('?s| is) your destination|where to)\b",
    1.0,
    "asks-location",
)];

const ASKS_PASSENGERS: &[(&str, f64, &str)] = &[(
    r"(?i)\b(how many (people|passengers|travell?ers|guests|adults|tickets)|number of (passengers|travell?ers|guests)|who('?s| is) traveling)\b",
    1.0,
    "asks-passengers",
)];

const REPHRASE: &[(&str, f64, &str)] = &[(
    r"(?i)\b(i didn'?t (understand|catch|get) that|could you (rephrase|repeat)|can you (say|repeat) that again|please rephrase|sorry,? i don'?t follow)\b",
    1.5,
    "rephrase-request",
)];

const USER_CORRECTION: &[(&str, f64, &str)] = &[
    (
        r"(?i)(that'?s not what i (asked|meant|want)|not what i asked|i (said|meant|asked for) an?\b|no,? i (want|need|asked)|wrong (thing|answer))",
        1.5,
        "user-correction",
    ),
    (r"(?i)\bnot an? (hotel|flight|car|package)\b", 1.0, "rejected-offer-type"),
];

const AGENT_CONFUSION: &[(&str, f64, &str)] = &[(
    r"(?i)\b(i'?m not sure what you mean|what do you mean|could you clarify what you('re| are) looking for)\b",
    1.0,
    "agent-confusion",
)];

const CANNOT_UNDERSTAND: &[(&str, f64, &str)] = &[
    (
        r"(?i)(no entiendo|no hablo|je ne comprends pas|ich verstehe (sie )?nicht|não entendo|non capisco)",
        3.0,
        "cannot-understand",
    ),
    (
        r"(?i)\b(i (only|can only) speak english|please (write|speak) in english|i don'?t (speak|understand) (spanish|french|german|portuguese|italian))\b",
        3.0,
        "english-only",
    ),
];

const FABRICATED_CLAIMS: &[(&str, f64, &str)] = &[
    (
        r"(?i)\b(guaranteed?|100% (sure|certain)|always available|never (sold out|delayed)|free upgrade|lowest price (ever|guaranteed))\b",
        1.5,
        "unverifiable-guarantee",
    ),
    (r"(?i)\b(unlimited (baggage|luggage)|no fees? (at all|whatsoever))\b", 1.0, "unverifiable-policy"),
];

const PREMATURE_CONFIRMATION: &[(&str, f64, &str)] = &[(
    r"(?i)\b(your booking is confirmed|you'?re (all )?booked|confirmation (number|code) is|i'?ve (booked|reserved))\b",
    2.0,
    "confirmation-before-booking",
)];

const OFFERS_INVENTORY: &[(&str, f64, &str)] = &[(
    r"(?i)\b(i found|here are|available (flights?|hotels?|seats?)|departs? at|flights? (to|from)|prices? (start|from))\b",
    1.0,
    "offers-inventory",
)];

const OFF_TOPIC_REQUEST: &[(&str, f64, &str)] = &[(
    r"(?i)\b(weather forecast|stock (price|market)|recipe|homework|write (me )?an? (poem|essay|story|program)|bitcoin|crypto|diagnos\w*|legal advice|politics|lottery)\b",
    1.5,
    "non-travel-topic",
)];

const SCOPE_REFUSAL: &[(&str, f64, &str)] = &[(
    r"(?i)\b(i can only help with travel|outside (of )?(my|what i can)|not able to help with that|i can'?t help with that)\b",
    1.0,
    "scope-refusal",
)];

const UPSTREAM_FAILURE: &[(&str, f64, &str)] = &[
    (
        r"(?i)\b(something went wrong|service (is )?(currently )?unavailable|try again later|unable to (retrieve|fetch|load|connect|reach)|system (error|outage))\b",
        2.0,
        "upstream-error-message",
    ),
    (r"(?i)\b(internal server error|bad gateway|error code \d+|5\d\d error)\b", 1.5, "upstream-error-code"),
];

const WALKING_AWAY: &[(&str, f64, &str)] = &[(
    r"(?i)(forget it|never ?mind|i'?ll (go|look|book) (elsewhere|somewhere else)|i give up|this is pointless|i'?m leaving)",
    1.5,
    "walking-away",
)];

const HEDGING: &[(&str, f64, &str)] = &[(
    r"(?i)\b(i think|maybe|perhaps|i'?m not (sure|certain)|possibly|might be)\b",
    0.75,
    "hedging",
)];

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| Tables {
        asks_date: compile_table(ASKS_DATE),
        asks_location: compile_table(ASKS_LOCATION),
        asks_passengers: compile_table(ASKS_PASSENGERS),
        rephrase: compile_table(REPHRASE),
        user_correction: compile_table(USER_CORRECTION),
        agent_confusion: compile_table(AGENT_CONFUSION),
        cannot_understand: compile_table(CANNOT_UNDERSTAND),
        fabricated_claims: compile_table(FABRICATED_CLAIMS),
        premature_confirmation: compile_table(PREMATURE_CONFIRMATION),
        offers_inventory: compile_table(OFFERS_INVENTORY),
        off_topic_request: compile_table(OFF_TOPIC_REQUEST),
        scope_refusal: compile_table(SCOPE_REFUSAL),
        upstream_failure: compile_table(UPSTREAM_FAILURE),
        walking_away: compile_table(WALKING_AWAY),
        hedging: compile_table(HEDGING),
    })
}

fn any_match(table: &[WeightedPattern], text: &str) -> bool {
    table.iter().any(|row| row.regex.is_match(text))
}

fn parsing_failure(input: &RuleInput<'_>) -> Option<Finding> {
    let tables = tables();
    let turn = input.turn;
    let response = turn.agent_response.as_str();
    let mut finding = Finding::new(ErrorType::ParsingFailure);

    finding.add_table(&tables.rephrase, response, "response");

    if turn.entities.has_date() && any_match(&tables.asks_date, response) {
        finding.add(
            SATURATION,
            format!("user provided date ({}) but agent asked again", turn.entities.dates.join(", ")),
        );
    }
    if lexicon::mentions_place(&turn.user_message) && any_match(&tables.asks_location, response) {
        let places: Vec<String> = turn
            .entities
            .destinations
            .iter()
            .chain(turn.entities.airport_codes.iter())
            .cloned()
            .collect();
        let shown = if places.is_empty() { "a place".to_string() } else { places.join(", ") };
        finding.add(SATURATION, format!("user provided location ({shown}) but agent asked again"));
    }
    if let Some(passengers) = turn.entities.passengers {
        if any_match(&tables.asks_passengers, response) {
            finding.add(
                SATURATION,
                format!("user provided passenger count ({passengers}) but agent asked again"),
            );
        }
    }

    finding.finish("agent asked again for details already present in the user message")
}

fn intent_misunderstanding(input: &RuleInput<'_>) -> Option<Finding> {
    let tables = tables();
    let turn = input.turn;
    let mut finding = Finding::new(ErrorType::IntentMisunderstanding);

    let answered = input.response_intent;
    if turn.intent.is_concrete() && answered.intent.is_concrete() && answered.intent != turn.intent
    {
        finding.add(
            1.5,
            format!(
                "user asked about {}, agent answered {}",
                turn.intent.as_str(),
                answered.intent.as_str()
            ),
        );
    }
    finding.add_table(&tables.user_correction, &turn.user_message, "user");
    finding.add_table(&tables.agent_confusion, &turn.agent_response, "response");

    finding.finish(format!("agent response targeted {}", answered.intent.label()))
}

fn language_mismatch(input: &RuleInput<'_>) -> Option<Finding> {
    let tables = tables();
    let turn = input.turn;
    let replied = input.response_language;
    let mut finding = Finding::new(ErrorType::LanguageMismatch);

    finding.add_table(&tables.cannot_understand, &turn.agent_response, "response");

    if turn.language != replied.language
        && turn.language_confidence >= LANGUAGE_EVIDENCE_FLOOR
        && replied.confidence >= LANGUAGE_EVIDENCE_FLOOR
    {
        finding.add(
            2.0,
            format!("user wrote {}, agent replied in {}", turn.language, replied.language),
        );
    }
    if let Some(hint) = &turn.language_hint {
        if hint != &replied.language && replied.confidence >= LANGUAGE_EVIDENCE_FLOOR {
            finding.add(
                1.5,
                format!("conversation language is {hint}, agent replied in {}", replied.language),
            );
        }
    }

    finding.finish(format!("agent replied in {}", replied.language))
}

fn hallucination(input: &RuleInput<'_>) -> Option<Finding> {
    let tables = tables();
    let turn = input.turn;
    let response = turn.agent_response.as_str();
    let mut finding = Finding::new(ErrorType::Hallucination);

    finding.add_table(&tables.fabricated_claims, response, "response");
    if turn.stage < ConversationStage::Booking && !turn.outcome.booked {
        finding.add_table(&tables.premature_confirmation, response, "response");
    }
    let impossible = lexicon::impossible_destinations(response);
    if !impossible.is_empty() && any_match(&tables.offers_inventory, response) {
        finding.add(2.0, format!("agent offered travel to {}", impossible.join(", ")));
    }

    finding.finish("agent stated facts no inventory or policy source supports")
}

fn out_of_scope(input: &RuleInput<'_>) -> Option<Finding> {
    let tables = tables();
    let turn = input.turn;
    let mut finding = Finding::new(ErrorType::OutOfScope);

    let impossible = lexicon::impossible_destinations(&turn.user_message);
    if !impossible.is_empty() {
        finding.add(1.5, format!("request for unreachable destination: {}", impossible.join(", ")));
    }
    finding.add_table(&tables.off_topic_request, &turn.user_message, "user");
    if finding.score > 0.0 {
        finding.add_table(&tables.scope_refusal, &turn.agent_response, "response");
    }

    finding.finish("user request falls outside travel booking")
}

fn api_failure(input: &RuleInput<'_>) -> Option<Finding> {
    let tables = tables();
    let mut finding = Finding::new(ErrorType::ApiFailure);
    finding.add_table(&tables.upstream_failure, &input.turn.agent_response, "response");
    finding.finish("agent surfaced an upstream service failure")
}

fn timeout(input: &RuleInput<'_>) -> Option<Finding> {
    let latency = input.turn.latency_ms;
    let threshold = input.config.timeout_threshold_ms;
    let mut finding = Finding::new(ErrorType::Timeout);

    if latency > threshold {
        finding.add(SATURATION, format!("latency {latency}ms exceeded {threshold}ms threshold"));
        if latency >= threshold.saturating_mul(2) {
            finding.severity = Severity::High;
        }
    }

    finding.finish(format!("agent took {latency}ms to respond"))
}

fn abandonment(input: &RuleInput<'_>) -> Option<Finding> {
    let tables = tables();
    let turn = input.turn;
    let mut finding = Finding::new(ErrorType::Abandonment);
    if turn.outcome.converted() {
        return None;
    }

    let prior = input.context.prior_error_count;
    let limit = input.config.abandonment_error_threshold;
    if prior > limit && turn.sentiment == SentimentLabel::Frustrated {
        finding.add(
            2.0,
            format!("{prior} prior errors exceed {limit} while the user is frustrated"),
        );
    }
    finding.add_table(&tables.walking_away, &turn.user_message, "user");
    if turn.stage == ConversationStage::Abandoned || turn.outcome.abandoned {
        finding.add(SATURATION, "conversation marked abandoned");
    }

    finding.finish("user is leaving without completing a booking")
}

fn low_confidence(input: &RuleInput<'_>) -> Option<Finding> {
    let tables = tables();
    let turn = input.turn;
    let threshold = input.config.low_confidence_threshold;
    let mut finding = Finding::new(ErrorType::LowConfidence);

    let substantive = lexicon::words(&turn.user_message).len() >= 3;
    if turn.stage != ConversationStage::Greeting
        && substantive
        && turn.intent_confidence < threshold
    {
        finding.add(
            1.5,
            format!("intent confidence {:.2} below {threshold:.2}", turn.intent_confidence),
        );
    }
    finding.add_table(&tables.hedging, &turn.agent_response, "response");

    finding.finish("agent acted on an unclear request")
}

fn user_frustration(input: &RuleInput<'_>) -> Option<Finding> {
    let turn = input.turn;
    let mut finding = Finding::new(ErrorType::UserFrustration);

    if turn.sentiment == SentimentLabel::Frustrated {
        finding.add(
            SATURATION * turn.frustration_level.max(1.0 / SATURATION),
            format!("frustration level {:.2}", turn.frustration_level),
        );
        if turn.frustration_level >= 0.9 {
            finding.severity = Severity::Critical;
        }
    }

    finding.finish("user expressed frustration")
}

#[cfg(test)]
mod tests {
    use super::{
        AGENT_CONFUSION, ASKS_DATE, ASKS_LOCATION, ASKS_PASSENGERS, CANNOT_UNDERSTAND,
        FABRICATED_CLAIMS, HEDGING, OFFERS_INVENTORY, OFF_TOPIC_REQUEST, PREMATURE_CONFIRMATION,
        REPHRASE, SCOPE_REFUSAL, UPSTREAM_FAILURE, USER_CORRECTION, WALKING_AWAY,
    };
    use crate::signals::lexicon::compile_table;

    #[test]
    fn every_rule_pattern_compiles() {
        for rows in [
            ASKS_DATE,
            ASKS_LOCATION,
            ASKS_PASSENGERS,
            REPHRASE,
            USER_CORRECTION,
            AGENT_CONFUSION,
            CANNOT_UNDERSTAND,
            FABRICATED_CLAIMS,
            PREMATURE_CONFIRMATION,
            OFFERS_INVENTORY,
            OFF_TOPIC_REQUEST,
            SCOPE_REFUSAL,
            UPSTREAM_FAILURE,
            WALKING_AWAY,
            HEDGING,
        ] {
            assert_eq!(compile_table(rows).len(), rows.len());
        }
    }
}
