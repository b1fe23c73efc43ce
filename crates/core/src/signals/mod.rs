//! Signal extractors: stateless scorers turning raw turn text into sentiment,
//! intent and language signals.
//!
//! The rule-based implementations score text against static weighted pattern
//! tables. Their `confidence` values are match-count normalizations
//! (`min(weighted_matches / SATURATION, 1.0)`, so three full-weight cues saturate),
//! not calibrated probabilities. Callers must keep treating them on that scale
//! unless a calibrated model is plugged in through the same traits.

pub mod intent;
pub mod language;
pub mod lexicon;
pub mod sentiment;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::SignalError;

pub use intent::RuleIntentClassifier;
pub use language::LexiconLanguageDetector;
pub use sentiment::RuleSentimentScorer;

/// Weighted match sum that maps to full confidence.
pub const SATURATION: f64 = 3.0;

/// Minimum confidence for a concrete intent to be reported instead of `unknown`.
pub const INTENT_MATCH_THRESHOLD: f64 = 0.4;

pub const DEFAULT_LANGUAGE: &str = "en";

pub fn saturate(weighted_matches: f64) -> f64 {
    (weighted_matches / SATURATION).clamp(0.0, 1.0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
    Frustrated,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::Frustrated => "frustrated",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: SentimentLabel,
    pub confidence: f64,
    pub frustration_level: f64,
    pub evidence: Vec<String>,
}

impl SentimentScore {
    pub fn neutral() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            confidence: 0.5,
            frustration_level: 0.0,
            evidence: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    FlightSearch,
    HotelSearch,
    CarRental,
    PackageSearch,
    BookingModification,
    Cancellation,
    PriceInquiry,
    GeneralInquiry,
    Unknown,
}

impl Intent {
    pub const CONCRETE: [Intent; 8] = [
        Intent::FlightSearch,
        Intent::HotelSearch,
        Intent::CarRental,
        Intent::PackageSearch,
        Intent::BookingModification,
        Intent::Cancellation,
        Intent::PriceInquiry,
        Intent::GeneralInquiry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlightSearch => "flight_search",
            Self::HotelSearch => "hotel_search",
            Self::CarRental => "car_rental",
            Self::PackageSearch => "package_search",
            Self::BookingModification => "booking_modification",
            Self::Cancellation => "cancellation",
            Self::PriceInquiry => "price_inquiry",
            Self::GeneralInquiry => "general_inquiry",
            Self::Unknown => "unknown",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::FlightSearch => "a flight",
            Self::HotelSearch => "a hotel",
            Self::CarRental => "a rental car",
            Self::PackageSearch => "a vacation package",
            Self::BookingModification => "a change to an existing booking",
            Self::Cancellation => "a cancellation",
            Self::PriceInquiry => "pricing information",
            Self::GeneralInquiry => "general travel information",
            Self::Unknown => "something else",
        }
    }

    /// Consultant route the host runtime should hand this intent to.
    pub fn route(&self) -> &'static str {
        match self {
            Self::FlightSearch => "flights",
            Self::HotelSearch => "hotels",
            Self::CarRental => "cars",
            Self::PackageSearch => "packages",
            Self::BookingModification | Self::Cancellation => "bookings",
            Self::PriceInquiry => "pricing",
            Self::GeneralInquiry | Self::Unknown => "general",
        }
    }

    pub fn is_concrete(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    pub destinations: Vec<String>,
    pub airport_codes: Vec<String>,
    pub dates: Vec<String>,
    pub passengers: Option<u32>,
    pub budget: Option<Decimal>,
}

impl Entities {
    pub fn has_location(&self) -> bool {
        !self.destinations.is_empty() || !self.airport_codes.is_empty()
    }

    pub fn has_date(&self) -> bool {
        !self.dates.is_empty()
    }

    pub fn has_passengers(&self) -> bool {
        self.passengers.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentCandidate {
    pub intent: Intent,
    pub confidence: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f64,
    pub recommended_route: String,
    pub entities: Entities,
    /// Remaining candidates, highest confidence first.
    pub alternates: Vec<IntentCandidate>,
}

impl IntentClassification {
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
            recommended_route: Intent::Unknown.route().to_string(),
            entities: Entities::default(),
            alternates: Vec::new(),
        }
    }

    /// Highest confidence reached by any concrete intent, selected or not.
    pub fn best_concrete_confidence(&self) -> f64 {
        let selected = if self.intent.is_concrete() { self.confidence } else { 0.0 };
        self.alternates
            .iter()
            .filter(|candidate| candidate.intent.is_concrete())
            .map(|candidate| candidate.confidence)
            .fold(selected, f64::max)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LanguageGuess {
    pub language: String,
    pub confidence: f64,
}

impl LanguageGuess {
    pub fn default_language() -> Self {
        Self { language: DEFAULT_LANGUAGE.to_string(), confidence: 0.0 }
    }

    pub fn is_english(&self) -> bool {
        self.language == DEFAULT_LANGUAGE
    }
}

pub trait SentimentScorer: Send + Sync {
    fn score_sentiment(&self, text: &str) -> Result<SentimentScore, SignalError>;
}

pub trait IntentClassifier: Send + Sync {
    fn classify_intent(&self, text: &str) -> Result<IntentClassification, SignalError>;
}

pub trait LanguageDetector: Send + Sync {
    fn detect_language(&self, text: &str) -> Result<LanguageGuess, SignalError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalReport {
    pub sentiment: SentimentScore,
    pub intent: IntentClassification,
    pub language: LanguageGuess,
}

/// The three extractors behind their strategy traits. Every accessor converts an
/// extractor failure (error or panic) into the neutral "no signal" value.
#[derive(Clone)]
pub struct SignalSuite {
    sentiment: Arc<dyn SentimentScorer>,
    intent: Arc<dyn IntentClassifier>,
    language: Arc<dyn LanguageDetector>,
}

impl Default for SignalSuite {
    fn default() -> Self {
        Self::rule_based()
    }
}

impl SignalSuite {
    pub fn new(
        sentiment: Arc<dyn SentimentScorer>,
        intent: Arc<dyn IntentClassifier>,
        language: Arc<dyn LanguageDetector>,
    ) -> Self {
        Self { sentiment, intent, language }
    }

    pub fn rule_based() -> Self {
        Self::new(
            Arc::new(RuleSentimentScorer::new()),
            Arc::new(RuleIntentClassifier::new()),
            Arc::new(LexiconLanguageDetector::new()),
        )
    }

    pub fn analyze(&self, text: &str) -> SignalReport {
        SignalReport {
            sentiment: self.sentiment(text),
            intent: self.intent(text),
            language: self.language(text),
        }
    }

    pub fn sentiment(&self, text: &str) -> SentimentScore {
        guarded("sentiment", SentimentScore::neutral, || self.sentiment.score_sentiment(text))
    }

    pub fn intent(&self, text: &str) -> IntentClassification {
        guarded("intent", IntentClassification::unknown, || self.intent.classify_intent(text))
    }

    pub fn language(&self, text: &str) -> LanguageGuess {
        guarded("language", LanguageGuess::default_language, || {
            self.language.detect_language(text)
        })
    }
}

fn guarded<T>(
    scorer: &'static str,
    fallback: impl FnOnce() -> T,
    call: impl FnOnce() -> Result<T, SignalError>,
) -> T {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => value,
        Ok(Err(error)) => {
            warn!(
                event_name = "signals.extractor.failed",
                scorer,
                error = %error,
                "signal extractor failed; treating as no signal"
            );
            fallback()
        }
        Err(_) => {
            warn!(
                event_name = "signals.extractor.panicked",
                scorer, "signal extractor panicked; treating as no signal"
            );
            fallback()
        }
    }
}
