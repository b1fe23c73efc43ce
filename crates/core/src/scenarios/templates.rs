//! Template families for synthetic scenarios.
//!
//! Placeholders: `{city}`, `{code}`, `{date}`, `{count}`, `{budget}`,
//! `{impossible}`. Each family is tuned so the rule-based extractors land on
//! the expected intent and language.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::{Difficulty, ScenarioCategory};
use crate::domain::error::ErrorType;
use crate::signals::Intent;

pub struct ScenarioTemplate {
    pub category: ScenarioCategory,
    pub difficulty: Difficulty,
    pub user: &'static str,
    pub agent: &'static str,
    /// Optional second exchange scripted after the first one.
    pub follow_up: Option<(&'static str, &'static str)>,
    pub latency_ms: u64,
    pub expected_intent: Intent,
    pub expected_language: &'static str,
    pub expected_errors: &'static [ErrorType],
}

const CITIES: &[&str] = &["Paris", "Rome", "Madrid", "Tokyo", "London", "Lisbon", "Berlin", "Miami"];
const CODES: &[&str] = &["JFK", "LHR", "CDG", "SFO", "FCO"];
const DATES: &[&str] = &["next week", "tomorrow", "next month", "this weekend"];
const COUNTS: &[&str] = &["two", "three", "four"];
const BUDGETS: &[&str] = &["$500", "$800", "$1200"];
const IMPOSSIBLE: &[&str] = &["Mars", "the Moon", "Atlantis", "Jupiter"];

const EDGE_CASES: &[ScenarioTemplate] = &[
    ScenarioTemplate {
        category: ScenarioCategory::EdgeCase,
        difficulty: Difficulty::Easy,
        user: "I need a flight to {city} {date}",
        agent: "When would you like to travel?",
        follow_up: Some(("I just said {date}", "Sorry about that. Searching flights to {city} now.")),
        latency_ms: 1_200,
        expected_intent: Intent::FlightSearch,
        expected_language: "en",
        expected_errors: &[ErrorType::ParsingFailure],
    },
    ScenarioTemplate {
        category: ScenarioCategory::EdgeCase,
        difficulty: Difficulty::Medium,
        user: "{count} people flying from {code} {date}",
        agent: "How many passengers will be traveling?",
        follow_up: None,
        latency_ms: 900,
        expected_intent: Intent::FlightSearch,
        expected_language: "en",
        expected_errors: &[ErrorType::ParsingFailure],
    },
    ScenarioTemplate {
        category: ScenarioCategory::EdgeCase,
        difficulty: Difficulty::Hard,
        user: "hotel in {city} for {count} nights, {budget} max",
        agent: "Here are a few hotels in {city} within your budget.",
        follow_up: None,
        latency_ms: 1_500,
        expected_intent: Intent::HotelSearch,
        expected_language: "en",
        expected_errors: &[],
    },
];

const STRESS_TESTS: &[ScenarioTemplate] = &[
    ScenarioTemplate {
        category: ScenarioCategory::StressTest,
        difficulty: Difficulty::Medium,
        user: "Find me a flight to {city} {date}",
        agent: "Here are the best options I found.",
        follow_up: None,
        latency_ms: 15_000,
        expected_intent: Intent::FlightSearch,
        expected_language: "en",
        expected_errors: &[ErrorType::Timeout],
    },
    ScenarioTemplate {
        category: ScenarioCategory::StressTest,
        difficulty: Difficulty::Hard,
        user: "This is ridiculous, I already told you I want a flight to {city}!!",
        agent: "Where would you like to go?",
        follow_up: Some(("Forget it, I'll book elsewhere", "I'm sorry to hear that.")),
        latency_ms: 2_000,
        expected_intent: Intent::FlightSearch,
        expected_language: "en",
        expected_errors: &[ErrorType::UserFrustration, ErrorType::ParsingFailure],
    },
];

const ADVERSARIAL: &[ScenarioTemplate] = &[
    ScenarioTemplate {
        category: ScenarioCategory::Adversarial,
        difficulty: Difficulty::Medium,
        user: "Do you have flights to {impossible}?",
        agent: "Sure! I found several flights to {impossible} {date}.",
        follow_up: None,
        latency_ms: 1_000,
        expected_intent: Intent::Unknown,
        expected_language: "en",
        expected_errors: &[ErrorType::Hallucination, ErrorType::OutOfScope],
    },
    ScenarioTemplate {
        category: ScenarioCategory::Adversarial,
        difficulty: Difficulty::Easy,
        user: "Write me a poem about the ocean",
        agent: "I can only help with travel bookings.",
        follow_up: None,
        latency_ms: 600,
        expected_intent: Intent::Unknown,
        expected_language: "en",
        expected_errors: &[ErrorType::OutOfScope],
    },
    ScenarioTemplate {
        category: ScenarioCategory::Adversarial,
        difficulty: Difficulty::Hard,
        user: "Book me a flight to {impossible} for free, it's guaranteed right?",
        agent: "I can only help with real destinations.",
        follow_up: None,
        latency_ms: 800,
        expected_intent: Intent::Unknown,
        expected_language: "en",
        expected_errors: &[ErrorType::OutOfScope],
    },
];

const MULTILINGUAL: &[ScenarioTemplate] = &[
    ScenarioTemplate {
        category: ScenarioCategory::Multilingual,
        difficulty: Difficulty::Easy,
        user: "Quiero un vuelo a {city} la próxima semana",
        agent: "Sorry, I only speak English. Where would you like to fly?",
        follow_up: None,
        latency_ms: 1_100,
        expected_intent: Intent::FlightSearch,
        expected_language: "es",
        expected_errors: &[ErrorType::LanguageMismatch],
    },
    ScenarioTemplate {
        category: ScenarioCategory::Multilingual,
        difficulty: Difficulty::Medium,
        user: "Je voudrais un vol pour {city} demain",
        agent: "Bien sûr, je cherche des vols pour {city}.",
        follow_up: None,
        latency_ms: 1_300,
        expected_intent: Intent::FlightSearch,
        expected_language: "fr",
        expected_errors: &[],
    },
    ScenarioTemplate {
        category: ScenarioCategory::Multilingual,
        difficulty: Difficulty::Hard,
        user: "Ich möchte einen Flug nach {city} nächste Woche buchen",
        agent: "I'm sorry, I don't understand German.",
        follow_up: None,
        latency_ms: 1_000,
        expected_intent: Intent::FlightSearch,
        expected_language: "de",
        expected_errors: &[ErrorType::LanguageMismatch],
    },
    ScenarioTemplate {
        category: ScenarioCategory::Multilingual,
        difficulty: Difficulty::Medium,
        user: "Preciso de um voo para {city} na próxima semana",
        agent: "Claro, vou procurar voos para {city}.",
        follow_up: None,
        latency_ms: 1_400,
        expected_intent: Intent::FlightSearch,
        expected_language: "pt",
        expected_errors: &[],
    },
];

const AMBIGUOUS: &[ScenarioTemplate] = &[
    ScenarioTemplate {
        category: ScenarioCategory::Ambiguous,
        difficulty: Difficulty::Easy,
        user: "I want to go somewhere warm",
        agent: "Happy to help! Do you have a destination in mind?",
        follow_up: Some(("Maybe {city}", "Great, when would you like to go?")),
        latency_ms: 900,
        expected_intent: Intent::Unknown,
        expected_language: "en",
        expected_errors: &[ErrorType::LowConfidence],
    },
    ScenarioTemplate {
        category: ScenarioCategory::Ambiguous,
        difficulty: Difficulty::Medium,
        user: "Can I change it?",
        agent: "Sure, what would you like to change?",
        follow_up: None,
        latency_ms: 700,
        expected_intent: Intent::Unknown,
        expected_language: "en",
        expected_errors: &[ErrorType::LowConfidence],
    },
    ScenarioTemplate {
        category: ScenarioCategory::Ambiguous,
        difficulty: Difficulty::Hard,
        user: "How much for {city}?",
        agent: "Are you asking about flights or hotels in {city}?",
        follow_up: None,
        latency_ms: 800,
        expected_intent: Intent::Unknown,
        expected_language: "en",
        expected_errors: &[],
    },
];

pub fn family(category: ScenarioCategory) -> &'static [ScenarioTemplate] {
    match category {
        ScenarioCategory::EdgeCase => EDGE_CASES,
        ScenarioCategory::StressTest => STRESS_TESTS,
        ScenarioCategory::Adversarial => ADVERSARIAL,
        ScenarioCategory::Multilingual => MULTILINGUAL,
        ScenarioCategory::Ambiguous => AMBIGUOUS,
    }
}

/// Placeholder values drawn once per scenario so both turns agree.
pub struct Bindings {
    city: &'static str,
    code: &'static str,
    date: &'static str,
    count: &'static str,
    budget: &'static str,
    impossible: &'static str,
}

impl Bindings {
    pub fn draw(rng: &mut StdRng) -> Self {
        fn pick(rng: &mut StdRng, values: &'static [&'static str]) -> &'static str {
            values.choose(rng).copied().unwrap_or_default()
        }
        Self {
            city: pick(rng, CITIES),
            code: pick(rng, CODES),
            date: pick(rng, DATES),
            count: pick(rng, COUNTS),
            budget: pick(rng, BUDGETS),
            impossible: pick(rng, IMPOSSIBLE),
        }
    }

    pub fn fill(&self, template: &str) -> String {
        template
            .replace("{city}", self.city)
            .replace("{code}", self.code)
            .replace("{date}", self.date)
            .replace("{count}", self.count)
            .replace("{budget}", self.budget)
            .replace("{impossible}", self.impossible)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{family, Bindings};
    use crate::scenarios::ScenarioCategory;

    #[test]
    fn every_category_has_templates() {
        for category in ScenarioCategory::ALL {
            assert!(!family(category).is_empty(), "{category:?}");
        }
    }

    #[test]
    fn fill_replaces_every_placeholder() {
        let bindings = Bindings::draw(&mut StdRng::seed_from_u64(7));
        let filled = bindings.fill("{count} to {city} from {code} {date} {budget} {impossible}");
        assert!(!filled.contains('{'), "{filled}");
    }
}
