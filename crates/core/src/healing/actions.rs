//! Candidate remediation actions per error type.

use crate::domain::error::{DetectedError, ErrorType};
use crate::domain::healing::{
    Directive, ExpectedImpact, HealingAction, HealingActionType, MissingField,
};
use crate::domain::turn::Turn;
use crate::signals::lexicon;
use crate::signals::{Intent, LanguageGuess, DEFAULT_LANGUAGE};

/// Signals about the agent response the generators need beyond the turn.
pub struct ActionContext<'a> {
    pub turn: &'a Turn,
    pub response_language: &'a LanguageGuess,
}

pub fn candidates(error: &DetectedError, context: &ActionContext<'_>) -> Vec<HealingAction> {
    let turn = context.turn;
    match error.error_type {
        ErrorType::LanguageMismatch => vec![language_switch(context)],
        ErrorType::IntentMisunderstanding => {
            let mut actions = Vec::new();
            if turn.intent.is_concrete() {
                actions.push(route_switch(turn.intent, 8, 0.75));
            }
            actions.push(clarify(MissingField::Intent, 6, 0.6));
            actions
        }
        ErrorType::ParsingFailure => {
            let mut actions = vec![refine(
                format!(
                    "Use the details the user already gave ({}) instead of asking for them again.",
                    summarize_entities(turn)
                ),
                7,
                0.7,
                0.15,
            )];
            if let Some(field) = missing_field(turn) {
                actions.push(clarify(field, 6, 0.65));
            }
            actions
        }
        ErrorType::LowConfidence => {
            let field =
                if turn.intent.is_concrete() { missing_field(turn) } else { Some(MissingField::Intent) };
            field.map(|field| vec![clarify(field, 6, 0.6)]).unwrap_or_default()
        }
        ErrorType::OutOfScope => vec![
            refine(
                "Explain briefly that this request is outside travel booking and offer the closest travel help instead."
                    .to_string(),
                5,
                0.6,
                0.05,
            ),
            route_switch(Intent::GeneralInquiry, 4, 0.5),
        ],
        ErrorType::UserFrustration => vec![
            refine(
                "Acknowledge the user's frustration, apologize once, and restate what you already know before asking anything new."
                    .to_string(),
                8,
                0.65,
                0.25,
            ),
            escalate("user frustration persists", 5, 0.8),
        ],
        ErrorType::Abandonment => vec![
            refine(
                "Offer to finish the booking now: hold the best option found so far or propose a flexible-fare alternative."
                    .to_string(),
                9,
                0.5,
                0.3,
            ),
            escalate("conversation at risk of abandonment", 7, 0.7),
        ],
        ErrorType::Timeout => vec![refine(
            "Acknowledge the wait and lead with a concise answer before any detail.".to_string(),
            6,
            0.6,
            0.1,
        )],
        // Never auto-fixable; the policy gate stops these before generation.
        ErrorType::Hallucination | ErrorType::ApiFailure => Vec::new(),
    }
}

/// Highest priority first, then highest fix probability.
pub fn rank(actions: &mut [HealingAction]) {
    actions.sort_by(|left, right| {
        right.priority.cmp(&left.priority).then(
            right.expected_impact.fix_probability.total_cmp(&left.expected_impact.fix_probability),
        )
    });
}

/// Non-English conversation language, preferring the host's hint.
pub fn switch_target(context: &ActionContext<'_>) -> String {
    let turn = context.turn;
    if let Some(hint) = turn.language_hint.as_deref().filter(|hint| *hint != DEFAULT_LANGUAGE) {
        return hint.to_string();
    }
    if turn.language != DEFAULT_LANGUAGE {
        return turn.language.clone();
    }
    if !context.response_language.is_english() {
        return context.response_language.language.clone();
    }
    DEFAULT_LANGUAGE.to_string()
}

pub fn acknowledgment(language: &str) -> &'static str {
    match language {
        "es" => "Disculpe la confusión, continuaré en español.",
        "fr" => "Désolé pour la confusion, je vais continuer en français.",
        "de" => "Entschuldigung für das Missverständnis, ich mache auf Deutsch weiter.",
        "pt" => "Desculpe a confusão, vou continuar em português.",
        "it" => "Mi scusi per la confusione, continuerò in italiano.",
        _ => "Sorry about that, I'll continue in English.",
    }
}

/// First booking detail absent from the user message.
pub fn missing_field(turn: &Turn) -> Option<MissingField> {
    if !turn.entities.has_date() && lexicon::dates(&turn.user_message).is_empty() {
        Some(MissingField::Date)
    } else if !lexicon::mentions_place(&turn.user_message) {
        Some(MissingField::Location)
    } else if lexicon::passenger_count(&turn.user_message).is_none() {
        Some(MissingField::PassengerCount)
    } else {
        None
    }
}

pub fn question(field: MissingField) -> &'static str {
    match field {
        MissingField::Date => "What dates are you planning to travel?",
        MissingField::Location => "Which city or airport are you traveling to?",
        MissingField::PassengerCount => "How many travelers will be on this trip?",
        MissingField::Intent => {
            "Are you looking for flights, a hotel, a rental car, or a vacation package?"
        }
    }
}

fn language_switch(context: &ActionContext<'_>) -> HealingAction {
    let language = switch_target(context);
    let acknowledgment = acknowledgment(&language).to_string();
    HealingAction::new(
        HealingActionType::LanguageSwitch,
        9,
        Directive::SwitchLanguage { language, acknowledgment },
        impact(0.9, 0.3, 5),
    )
}

fn route_switch(intent: Intent, priority: u8, fix_probability: f64) -> HealingAction {
    HealingAction::new(
        HealingActionType::RouteSwitch,
        priority,
        Directive::SwitchRoute { route: intent.route().to_string(), intent },
        impact(fix_probability, 0.2, 15),
    )
}

fn clarify(field: MissingField, priority: u8, fix_probability: f64) -> HealingAction {
    HealingAction::new(
        HealingActionType::Clarification,
        priority,
        Directive::AskClarification { field, question: question(field).to_string() },
        impact(fix_probability, 0.1, 30),
    )
}

fn refine(instruction: String, priority: u8, fix_probability: f64, delta: f64) -> HealingAction {
    HealingAction::new(
        HealingActionType::PromptRefinement,
        priority,
        Directive::RefinePrompt { instruction },
        impact(fix_probability, delta, 20),
    )
}

fn escalate(reason: &str, priority: u8, fix_probability: f64) -> HealingAction {
    HealingAction::new(
        HealingActionType::HumanEscalation,
        priority,
        Directive::EscalateToHuman { reason: reason.to_string() },
        impact(fix_probability, 0.15, 300),
    )
}

fn impact(fix_probability: f64, satisfaction_delta: f64, time_to_resolve_secs: u32) -> ExpectedImpact {
    ExpectedImpact { fix_probability, satisfaction_delta, time_to_resolve_secs }
}

fn summarize_entities(turn: &Turn) -> String {
    let entities = &turn.entities;
    let mut parts: Vec<String> = Vec::new();
    parts.extend(entities.destinations.iter().cloned());
    parts.extend(entities.airport_codes.iter().cloned());
    parts.extend(entities.dates.iter().cloned());
    if let Some(passengers) = entities.passengers {
        parts.push(format!("{passengers} travelers"));
    }
    if let Some(budget) = entities.budget {
        parts.push(format!("budget {budget}"));
    }
    if parts.is_empty() {
        "see the previous user message".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{candidates, missing_field, rank, switch_target, ActionContext};
    use crate::domain::error::{DetectedError, ErrorType};
    use crate::domain::healing::{Directive, HealingActionType, MissingField};
    use crate::domain::turn::{Turn, TurnInput};
    use crate::signals::{LanguageGuess, SignalSuite};

    fn turn(input: TurnInput) -> Turn {
        let report = SignalSuite::rule_based().analyze(&input.user_message);
        Turn::from_input(input, 1, &report, Utc::now())
    }

    fn error_for(turn: &Turn, error_type: ErrorType) -> DetectedError {
        DetectedError::new(
            turn.id.clone(),
            turn.conversation_id.clone(),
            error_type,
            error_type.base_severity(),
            0.9,
            vec![],
            "observed",
            Utc::now(),
        )
    }

    #[test]
    fn language_switch_targets_the_non_english_side() {
        let turn = turn(TurnInput::new("c", "I need a flight to Madrid", "No entiendo inglés"));
        let replied = LanguageGuess { language: "es".to_string(), confidence: 0.67 };
        let context = ActionContext { turn: &turn, response_language: &replied };
        assert_eq!(switch_target(&context), "es");

        let actions = candidates(&error_for(&turn, ErrorType::LanguageMismatch), &context);
        assert!(matches!(
            &actions[0].directive,
            Directive::SwitchLanguage { language, acknowledgment }
                if language == "es" && acknowledgment.contains("español")
        ));
    }

    #[test]
    fn language_hint_wins_over_detection() {
        let turn = turn(
            TurnInput::new("c", "I need a flight", "Sure, where to?").with_language_hint("pt"),
        );
        let replied = LanguageGuess { language: "en".to_string(), confidence: 1.0 };
        let context = ActionContext { turn: &turn, response_language: &replied };
        assert_eq!(switch_target(&context), "pt");
    }

    #[test]
    fn infers_the_first_missing_field() {
        assert_eq!(missing_field(&turn(TurnInput::new("c", "flight to Rome", ""))), Some(MissingField::Date));
        assert_eq!(
            missing_field(&turn(TurnInput::new("c", "a flight tomorrow", ""))),
            Some(MissingField::Location)
        );
        assert_eq!(
            missing_field(&turn(TurnInput::new("c", "flight to Rome tomorrow", ""))),
            Some(MissingField::PassengerCount)
        );
        assert_eq!(missing_field(&turn(TurnInput::new("c", "flight to Rome tomorrow for two", ""))), None);
    }

    #[test]
    fn ranking_orders_by_priority_then_fix_probability() {
        let turn = turn(TurnInput::new("c", "forget it, this is useless", "Okay."));
        let replied = LanguageGuess { language: "en".to_string(), confidence: 1.0 };
        let context = ActionContext { turn: &turn, response_language: &replied };
        let mut actions = candidates(&error_for(&turn, ErrorType::Abandonment), &context);
        rank(&mut actions);
        assert_eq!(actions[0].action_type, HealingActionType::PromptRefinement);
        assert_eq!(actions[1].action_type, HealingActionType::HumanEscalation);
    }

    #[test]
    fn unfixable_types_have_no_candidates() {
        let turn = turn(TurnInput::new("c", "hotel in Rome", "Guaranteed lowest price ever!"));
        let replied = LanguageGuess { language: "en".to_string(), confidence: 1.0 };
        let context = ActionContext { turn: &turn, response_language: &replied };
        assert!(candidates(&error_for(&turn, ErrorType::Hallucination), &context).is_empty());
    }
}
