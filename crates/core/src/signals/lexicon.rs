//! Shared travel lexicon: gazetteers, date/passenger/budget cues and the
//! pattern-table plumbing used by every rule-based extractor.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::signals::Entities;

/// Compiled regex paired with its match weight and a short evidence label.
#[derive(Debug)]
pub struct WeightedPattern {
    pub regex: Regex,
    pub weight: f64,
    pub cue: &'static str,
}

/// Compiles a static `(pattern, weight, cue)` table. Patterns are literals
/// covered by tests, so a failed compile only drops that row.
pub fn compile_table(rows: &[(&str, f64, &'static str)]) -> Vec<WeightedPattern> {
    rows.iter()
        .filter_map(|(pattern, weight, cue)| {
            Regex::new(pattern).ok().map(|regex| WeightedPattern { regex, weight: *weight, cue: *cue })
        })
        .collect()
}

/// Sum of weights of matching rows and the cues that fired.
pub fn score_table(table: &[WeightedPattern], text: &str) -> (f64, Vec<String>) {
    let mut total = 0.0;
    let mut cues = Vec::new();
    for row in table {
        if row.regex.is_match(text) {
            total += row.weight;
            cues.push(row.cue.to_string());
        }
    }
    (total, cues)
}

pub fn normalize(text: &str) -> String {
    text.to_lowercase()
}

/// Lowercased word tokens; apostrophes stay inside words.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|word| !word.is_empty())
        .map(|word| word.to_lowercase())
        .collect()
}

const DESTINATIONS: &[&str] = &[
    "amsterdam",
    "athens",
    "atlanta",
    "bangkok",
    "barcelona",
    "berlin",
    "boston",
    "buenos aires",
    "cancun",
    "chicago",
    "dubai",
    "dublin",
    "lisbon",
    "london",
    "los angeles",
    "madrid",
    "mexico city",
    "miami",
    "milan",
    "munich",
    "new york",
    "orlando",
    "paris",
    "prague",
    "rio de janeiro",
    "rome",
    "san francisco",
    "seattle",
    "singapore",
    "sydney",
    "tokyo",
    "toronto",
    "venice",
    "vienna",
];

const AIRPORT_CODES: &[&str] = &[
    "AMS", "ATL", "BCN", "BOS", "CDG", "CUN", "DXB", "EWR", "EZE", "FCO", "FRA", "GRU", "HND",
    "JFK", "LAX", "LGA", "LHR", "LIS", "MAD", "MEX", "MIA", "MUC", "NRT", "ORD", "SEA", "SFO",
    "SIN", "SYD", "YYZ",
];

/// Codes that never collide with an ordinary word, so lowercase mentions count.
const UNAMBIGUOUS_CODES: &[&str] = &[
    "jfk", "lhr", "cdg", "sfo", "lga", "ewr", "fco", "dxb", "nrt", "hnd", "bcn", "gru", "eze",
    "cun", "yyz", "muc",
];

/// Places no travel inventory can serve.
pub const IMPOSSIBLE_DESTINATIONS: &[&str] = &[
    "mars",
    "the moon",
    "jupiter",
    "venus",
    "saturn",
    "pluto",
    "atlantis",
    "narnia",
    "hogwarts",
    "middle earth",
    "neverland",
];

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn date_regex() -> Option<&'static Regex> {
    static DATE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(
        &DATE,
        r"(?i)\b(today|tonight|tomorrow|this weekend|next (week|month|weekend|year|monday|tuesday|wednesday|thursday|friday|saturday|sunday)|(this|on) (monday|tuesday|wednesday|thursday|friday|saturday|sunday)|(january|february|march|april|june|july|august|september|october|november|december)( \d{1,2}(st|nd|rd|th)?)?|may \d{1,2}(st|nd|rd|th)?|\d{1,2}/\d{1,2}(/\d{2,4})?|\d{4}-\d{2}-\d{2}|in \d+ (days|weeks|months)|mañana|próxima semana|la semana que viene|demain|la semaine prochaine|morgen|nächste woche)\b",
    )
}

fn passenger_regex() -> Option<&'static Regex> {
    static PASSENGERS: OnceLock<Option<Regex>> = OnceLock::new();
    cached(
        &PASSENGERS,
        r"(?i)\b(\d{1,2}|one|two|three|four|five|six|seven|eight|nine|ten)\s+(people|persons|passengers|adults|travell?ers|guests|tickets|seats|of us)\b|\bfor (\d{1,2}|two|three|four|five|six)\b|\b(just me|only me|myself|solo)\b|\b(my (wife|husband|partner) and (i|me))\b",
    )
}

fn budget_regex() -> Option<&'static Regex> {
    static BUDGET: OnceLock<Option<Regex>> = OnceLock::new();
    cached(
        &BUDGET,
        r"(?i)(?:[$€£]\s?(\d+(?:[.,]\d{1,2})?))|(?:\b(\d+(?:\.\d{1,2})?)\s?(?:dollars|euros|usd|eur|bucks)\b)",
    )
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    normalized.match_indices(phrase).any(|(start, _)| {
        let before = normalized[..start].chars().next_back();
        let after = normalized[start + phrase.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

pub fn destinations(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    DESTINATIONS
        .iter()
        .filter(|city| contains_phrase(&normalized, city))
        .map(|city| city.to_string())
        .collect()
}

pub fn impossible_destinations(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    IMPOSSIBLE_DESTINATIONS
        .iter()
        .filter(|place| contains_phrase(&normalized, place))
        .map(|place| place.to_string())
        .collect()
}

pub fn airport_codes(text: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for token in text.split(|c: char| !c.is_ascii_alphanumeric()) {
        if token.len() != 3 {
            continue;
        }
        let upper = token.to_ascii_uppercase();
        let explicit = token == upper && AIRPORT_CODES.contains(&upper.as_str());
        let lowercase_safe = UNAMBIGUOUS_CODES.contains(&token.to_ascii_lowercase().as_str());
        if (explicit || lowercase_safe) && !codes.contains(&upper) {
            codes.push(upper);
        }
    }
    codes
}

pub fn dates(text: &str) -> Vec<String> {
    date_regex()
        .map(|regex| regex.find_iter(text).map(|found| found.as_str().to_lowercase()).collect())
        .unwrap_or_default()
}

pub fn passenger_count(text: &str) -> Option<u32> {
    let captures = passenger_regex()?.captures(text)?;
    if let Some(count) = captures.get(1).or_else(|| captures.get(3)) {
        return number_word(count.as_str());
    }
    if captures.get(4).is_some() {
        return Some(1);
    }
    captures.get(5).map(|_| 2)
}

fn number_word(raw: &str) -> Option<u32> {
    let value = match raw.to_lowercase().as_str() {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        digits => digits.parse().ok()?,
    };
    (value > 0).then_some(value)
}

pub fn budget(text: &str) -> Option<Decimal> {
    let captures = budget_regex()?.captures(text)?;
    let raw = captures.get(1).or_else(|| captures.get(2))?.as_str().replace(',', ".");
    Decimal::from_str(&raw).ok()
}

pub fn extract_entities(text: &str) -> Entities {
    Entities {
        destinations: destinations(text),
        airport_codes: airport_codes(text),
        dates: dates(text),
        passengers: passenger_count(text),
        budget: budget(text),
    }
}

/// Capitalized place name after a travel preposition ("to Reykjavik").
pub fn mentions_place(text: &str) -> bool {
    static PLACE: OnceLock<Option<Regex>> = OnceLock::new();
    let explicit = cached(&PLACE, r"\b(to|from|in|at|near)\s+[A-Z][a-z]{2,}")
        .is_some_and(|regex| regex.is_match(text));
    explicit
        || !destinations(text).is_empty()
        || !airport_codes(text).is_empty()
        || !impossible_destinations(text).is_empty()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        airport_codes, budget, compile_table, dates, destinations, extract_entities,
        impossible_destinations, mentions_place, passenger_count, words,
    };

    #[test]
    fn pattern_tables_drop_nothing_when_valid() {
        let table = compile_table(&[(r"\bflights?\b", 1.0, "flight"), (r"\bhotel\b", 1.0, "hotel")]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn extracts_destinations_and_codes() {
        let entities = extract_entities("Fly me from JFK to Paris next week, 2 adults, under $900");
        assert_eq!(entities.destinations, vec!["paris".to_string()]);
        assert_eq!(entities.airport_codes, vec!["JFK".to_string()]);
        assert_eq!(entities.dates, vec!["next week".to_string()]);
        assert_eq!(entities.passengers, Some(2));
        assert_eq!(entities.budget, Some(Decimal::new(900, 0)));
    }

    #[test]
    fn ambiguous_codes_require_uppercase() {
        assert!(airport_codes("I'm so mad about this").is_empty());
        assert_eq!(airport_codes("from MAD to lhr"), vec!["MAD".to_string(), "LHR".to_string()]);
    }

    #[test]
    fn city_names_match_on_word_boundaries() {
        assert!(destinations("parisian cafes").is_empty());
        assert_eq!(destinations("New York or Rome?"), vec!["new york".to_string(), "rome".to_string()]);
    }

    #[test]
    fn recognizes_impossible_destinations() {
        assert_eq!(impossible_destinations("flights to Mars"), vec!["mars".to_string()]);
        assert!(impossible_destinations("flights to Marseille").is_empty());
        assert!(mentions_place("Do you have flights to Mars?"));
    }

    #[test]
    fn parses_passenger_phrasings() {
        assert_eq!(passenger_count("three travelers please"), Some(3));
        assert_eq!(passenger_count("a table for two"), Some(2));
        assert_eq!(passenger_count("just me this time"), Some(1));
        assert_eq!(passenger_count("my wife and I"), Some(2));
        assert_eq!(passenger_count("a flight to Rome"), None);
    }

    #[test]
    fn budget_and_dates() {
        assert_eq!(budget("around 450 euros"), Some(Decimal::new(450, 0)));
        assert_eq!(budget("€99,50 max"), Some(Decimal::new(9950, 2)));
        assert_eq!(dates("leaving tomorrow, back on 2026-11-03"), vec!["tomorrow", "2026-11-03"]);
    }

    #[test]
    fn tokenizer_keeps_accents_and_apostrophes() {
        assert_eq!(words("No entiendo inglés, don't"), vec!["no", "entiendo", "inglés", "don't"]);
    }
}
