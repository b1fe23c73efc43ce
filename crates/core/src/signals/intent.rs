use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::errors::SignalError;
use crate::signals::lexicon::{self, compile_table, score_table, WeightedPattern};
use crate::signals::{
    saturate, Intent, IntentCandidate, IntentClassification, IntentClassifier,
    INTENT_MATCH_THRESHOLD,
};

type IntentTable = (Intent, &'static [(&'static str, f64, &'static str)]);

const INTENT_TABLES: &[IntentTable] = &[
    (
        Intent::FlightSearch,
        &[
            (r"(?i)\b(flights?|fly|flying|plane|airfare|airline)\b", 1.25, "flight"),
            (r"(?i)\b(one-?way|round-?trip|non-?stop|layover|direct flight)\b", 0.75, "itinerary"),
            (r"(?i)\b(vuelos?|vols?|flug|flüge|voos?|voli|volo)\b", 1.25, "flight-intl"),
        ],
    ),
    (
        Intent::HotelSearch,
        &[
            (r"(?i)\b(hotels?|hostel|resort|accommodation|lodging|airbnb)\b", 1.25, "hotel"),
            (r"(?i)\b(rooms?|suite|stay|nights?|check-?in)\b", 0.5, "stay"),
            (r"(?i)\b(hotel|alojamiento|hôtel|unterkunft|albergo)\b", 0.25, "hotel-intl"),
        ],
    ),
    (
        Intent::CarRental,
        &[
            (r"(?i)\b(car rental|rent(al)? a car|rental car|hire a car|car hire)\b", 1.5, "car-rental"),
            (r"(?i)\b(cars?|suv|minivan|vehicle)\b", 0.75, "vehicle"),
            (r"(?i)\b(pick-?up|drop-?off)\b", 0.25, "handover"),
        ],
    ),
    (
        Intent::PackageSearch,
        &[
            (r"(?i)\b(packages?|all-?inclusive|bundle)\b", 1.25, "package"),
            (r"(?i)\b(flight (and|\+|&) hotel|hotel (and|\+|&) flight)\b", 1.0, "combo"),
            (r"(?i)\b(vacation|holiday|getaway|honeymoon)\b", 0.75, "vacation"),
        ],
    ),
    (
        Intent::BookingModification,
        &[
            (
                r"(?i)\b(change|modify|reschedule|update|move|switch)\b.*\b(booking|reservation|flight|dates?|ticket)\b",
                1.5,
                "modify-booking",
            ),
            (r"(?i)\b(upgrade|seat selection|add (a )?bag(gage)?)\b", 0.75, "amend"),
            (r"(?i)\b(my booking|my reservation|confirmation number)\b", 0.5, "existing-booking"),
        ],
    ),
    (
        Intent::Cancellation,
        &[
            (r"(?i)\b(cancel|cancellation|cancelled|canceled)\b", 1.5, "cancel"),
            (r"(?i)\b(refund|money back)\b", 1.0, "refund"),
            (r"(?i)\b(cancelar|annuler|stornieren)\b", 1.5, "cancel-intl"),
        ],
    ),
    (
        Intent::PriceInquiry,
        &[
            (r"(?i)\b(how much|price|prices|pricing|cost|costs|fare)\b", 1.0, "price"),
            (r"(?i)\b(cheap|cheapest|cheaper|budget|deal|deals|discount)\b", 0.75, "bargain"),
            (r"(?i)\b(cuánto|cuesta|combien|wie viel|quanto)\b", 1.0, "price-intl"),
        ],
    ),
    (
        Intent::GeneralInquiry,
        &[
            (r"(?i)\b(baggage|luggage|carry-?on|visa|passport|pets?|wifi|insurance)\b", 1.0, "travel-info"),
            (r"(?i)\b(policy|policies|requirements?|allowed|rules)\b", 0.75, "policy"),
            (r"(?i)\b(what time|opening hours|how early)\b", 0.5, "logistics"),
        ],
    ),
];

/// Verbs that reinforce an intent already indicated by its own cues.
const BOOKING_VERBS: &str = r"(?i)\b(book|booking|reserve|reservation|find me|looking for|need|want)\b";

/// Keyword-table intent classifier with entity boosts.
#[derive(Debug)]
pub struct RuleIntentClassifier {
    tables: &'static [(Intent, Vec<WeightedPattern>)],
    booking_verbs: &'static [WeightedPattern],
}

impl Default for RuleIntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleIntentClassifier {
    pub fn new() -> Self {
        static TABLES: OnceLock<Vec<(Intent, Vec<WeightedPattern>)>> = OnceLock::new();
        static VERBS: OnceLock<Vec<WeightedPattern>> = OnceLock::new();
        let tables = TABLES.get_or_init(|| {
            INTENT_TABLES.iter().map(|(intent, rows)| (*intent, compile_table(rows))).collect()
        });
        let booking_verbs =
            VERBS.get_or_init(|| compile_table(&[(BOOKING_VERBS, 0.5, "booking-verb")]));
        Self { tables, booking_verbs }
    }

    pub fn classify(&self, text: &str) -> IntentClassification {
        let entities = lexicon::extract_entities(text);
        let (verb_boost, _) = score_table(self.booking_verbs, text);

        let mut scores: BTreeMap<Intent, f64> = BTreeMap::new();
        for (intent, table) in self.tables {
            let (mut score, _) = score_table(table, text);
            if *intent == Intent::FlightSearch && !entities.airport_codes.is_empty() {
                score += 1.0;
            }
            if score > 0.0 {
                if entities.has_location()
                    && matches!(
                        intent,
                        Intent::FlightSearch | Intent::HotelSearch | Intent::PackageSearch
                    )
                {
                    score += 0.5;
                }
                if entities.has_date() || entities.has_passengers() {
                    score += 0.5;
                }
                if entities.budget.is_some() && *intent == Intent::PriceInquiry {
                    score += 0.5;
                }
                score += verb_boost;
            }
            if score > 0.0 {
                scores.insert(*intent, score);
            }
        }

        if !lexicon::impossible_destinations(text).is_empty() {
            for score in scores.values_mut() {
                *score *= 0.5;
            }
        }

        let mut ranked: Vec<IntentCandidate> = scores
            .into_iter()
            .map(|(intent, score)| IntentCandidate { intent, confidence: saturate(score) })
            .collect();
        ranked.sort_by(|left, right| {
            right.confidence.total_cmp(&left.confidence).then(left.intent.cmp(&right.intent))
        });

        let selected = ranked
            .first()
            .filter(|best| best.confidence >= INTENT_MATCH_THRESHOLD)
            .cloned();
        match selected {
            Some(best) => IntentClassification {
                intent: best.intent,
                confidence: best.confidence,
                recommended_route: best.intent.route().to_string(),
                entities,
                alternates: ranked.into_iter().skip(1).collect(),
            },
            None => IntentClassification {
                intent: Intent::Unknown,
                confidence: ranked.first().map(|best| best.confidence).unwrap_or(0.0),
                recommended_route: Intent::Unknown.route().to_string(),
                entities,
                alternates: ranked,
            },
        }
    }
}

impl IntentClassifier for RuleIntentClassifier {
    fn classify_intent(&self, text: &str) -> Result<IntentClassification, SignalError> {
        Ok(self.classify(text))
    }
}
