use crate::errors::SignalError;
use crate::signals::lexicon::words;
use crate::signals::{saturate, LanguageDetector, LanguageGuess, DEFAULT_LANGUAGE};

/// Supported languages in tie-break order.
pub const SUPPORTED_LANGUAGES: [&str; 6] = ["en", "es", "fr", "de", "pt", "it"];

const STOPWORDS: [(&str, &[&str]); 6] = [
    (
        "en",
        &[
            "the", "and", "you", "your", "is", "are", "to", "for", "i", "i'm", "want", "need",
            "flight", "please", "would", "like", "what", "when", "where", "how", "my", "with",
            "can", "book", "travel", "next", "week", "thanks", "thank", "hello", "hi", "english",
            "understand", "help", "find", "this", "that", "do", "have", "of", "it", "we", "me",
            "from", "trip", "cheap", "there", "any", "available", "which", "sorry", "sure",
            "speak", "only", "don't", "it's",
        ],
    ),
    (
        "es",
        &[
            "el", "los", "las", "que", "y", "en", "un", "una", "quiero", "necesito", "vuelo",
            "vuelos", "por", "favor", "para", "gracias", "hola", "entiendo", "inglés", "ingles",
            "semana", "próxima", "viaje", "reservar", "cuándo", "dónde", "con", "mi", "usted",
            "puedo", "habla", "hablo", "español", "buscar", "barato", "tengo", "es", "está",
            "del", "al", "lo", "sí", "también", "quisiera", "fecha",
        ],
    ),
    (
        "fr",
        &[
            "le", "les", "des", "du", "je", "vous", "est", "une", "pour", "avec", "vol", "vols",
            "bonjour", "merci", "voyage", "réserver", "semaine", "prochaine", "comprends",
            "pas", "anglais", "français", "où", "quand", "billet", "voudrais", "suis", "et",
            "nous", "mon", "ma", "parlez", "parle", "avez", "c'est",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "ich", "sie", "nicht", "ein", "eine", "für", "mit",
            "flug", "flüge", "bitte", "danke", "hallo", "reise", "buchen", "woche", "nächste",
            "verstehe", "englisch", "deutsch", "wann", "wo", "möchte", "brauche", "ist", "haben",
            "sprechen", "spreche", "kein", "nach",
        ],
    ),
    (
        "pt",
        &[
            "os", "eu", "você", "voo", "voos", "obrigado", "obrigada", "olá", "viagem", "quero",
            "preciso", "não", "inglês", "português", "entendo", "falo", "fala", "uma", "em",
            "passagem", "semana", "próxima", "para", "com", "meu", "minha",
        ],
    ),
    (
        "it",
        &[
            "il", "gli", "di", "che", "io", "voglio", "volo", "voli", "per", "grazie", "ciao",
            "viaggio", "prenotare", "settimana", "prossima", "capisco", "inglese", "italiano",
            "non", "quando", "dove", "sono", "parlo", "parla", "vorrei", "biglietto", "della",
        ],
    ),
];

/// Stopword-frequency language detector over a fixed set of languages.
///
/// Confidence is the saturated hit count of the winning language discounted by
/// how much of that count the runner-up also matched.
#[derive(Clone, Debug, Default)]
pub struct LexiconLanguageDetector;

impl LexiconLanguageDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, text: &str) -> LanguageGuess {
        let tokens = words(text);
        let mut hits: Vec<(&'static str, usize)> = STOPWORDS
            .iter()
            .map(|(language, lexicon)| {
                let count = tokens.iter().filter(|token| lexicon.contains(&token.as_str())).count();
                (*language, count)
            })
            .collect();
        // Stable sort keeps the supported-language order for ties.
        hits.sort_by(|left, right| right.1.cmp(&left.1));

        let (best_language, best) = hits.first().copied().unwrap_or((DEFAULT_LANGUAGE, 0));
        if best == 0 {
            return LanguageGuess::default_language();
        }
        let runner_up = hits.get(1).map(|(_, count)| *count).unwrap_or(0);
        let tied_with_english = best == runner_up
            && hits.iter().any(|(language, count)| *language == DEFAULT_LANGUAGE && *count == best);
        let language = if tied_with_english { DEFAULT_LANGUAGE } else { best_language };
        let margin = (best - runner_up) as f64 / best as f64;

        LanguageGuess { language: language.to_string(), confidence: saturate(best as f64) * margin }
    }
}

impl LanguageDetector for LexiconLanguageDetector {
    fn detect_language(&self, text: &str) -> Result<LanguageGuess, SignalError> {
        Ok(self.detect(text))
    }
}
