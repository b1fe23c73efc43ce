use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::error::ErrorType;
use crate::domain::turn::ConversationStage;
use crate::telemetry::TurnRecord;

const TOP_ERROR_TYPES: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorTypeCount {
    pub error_type: ErrorType,
    pub count: usize,
}

/// Trailing-window aggregate over bus records. Rates are fractions in `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BusMetrics {
    pub window_hours: i64,
    pub generated_at: DateTime<Utc>,
    pub turn_count: usize,
    pub conversation_count: usize,
    pub completion_rate: f64,
    pub booking_rate: f64,
    pub mean_satisfaction: f64,
    pub mean_latency_ms: f64,
    pub error_rate: f64,
    pub healing_success_rate: f64,
    pub top_error_types: Vec<ErrorTypeCount>,
}

pub(crate) fn aggregate(records: &[&TurnRecord], period: Duration, now: DateTime<Utc>) -> BusMetrics {
    let turn_count = records.len();

    let mut conversations: HashMap<&str, (bool, bool)> = HashMap::new();
    for record in records {
        let entry = conversations.entry(record.turn.conversation_id.0.as_str()).or_default();
        let outcome = &record.turn.outcome;
        entry.0 |= outcome.completed || record.turn.stage == ConversationStage::Completed;
        entry.1 |= outcome.booked;
    }
    let conversation_count = conversations.len();
    let completed = conversations.values().filter(|(completed, _)| *completed).count();
    let booked = conversations.values().filter(|(_, booked)| *booked).count();

    let errored_turns = records.iter().filter(|record| record.had_error()).count();

    let mut error_counts: BTreeMap<ErrorType, usize> = BTreeMap::new();
    let mut seen_error_ids: HashSet<&str> = HashSet::new();
    for error in records.iter().flat_map(|record| record.errors.iter()) {
        if seen_error_ids.insert(error.id.as_str()) {
            *error_counts.entry(error.error_type).or_default() += 1;
        }
    }
    let mut top_error_types: Vec<ErrorTypeCount> = error_counts
        .into_iter()
        .map(|(error_type, count)| ErrorTypeCount { error_type, count })
        .collect();
    top_error_types.sort_by(|left, right| {
        right.count.cmp(&left.count).then(left.error_type.cmp(&right.error_type))
    });
    top_error_types.truncate(TOP_ERROR_TYPES);

    let applied: Vec<bool> = records
        .iter()
        .flat_map(|record| record.healing.iter())
        .filter(|result| result.applied())
        .map(|result| result.success)
        .collect();

    BusMetrics {
        window_hours: period.num_hours(),
        generated_at: now,
        turn_count,
        conversation_count,
        completion_rate: ratio(completed, conversation_count),
        booking_rate: ratio(booked, conversation_count),
        mean_satisfaction: mean(records.iter().map(|record| record.turn.satisfaction)),
        mean_latency_ms: mean(records.iter().map(|record| record.turn.latency_ms as f64)),
        error_rate: ratio(errored_turns, turn_count),
        healing_success_rate: ratio(
            applied.iter().filter(|success| **success).count(),
            applied.len(),
        ),
        top_error_types,
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::aggregate;
    use crate::domain::turn::TurnOutcome;
    use crate::telemetry::test_support::turn;
    use crate::telemetry::TurnRecord;

    #[test]
    fn empty_window_reports_zero_rates() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).single().unwrap_or_default();
        let metrics = aggregate(&[], Duration::hours(24), now);
        assert_eq!(metrics.turn_count, 0);
        assert!(metrics.completion_rate.abs() < f64::EPSILON);
        assert!(metrics.mean_latency_ms.abs() < f64::EPSILON);
        assert!(metrics.top_error_types.is_empty());
    }

    #[test]
    fn booking_rate_is_per_conversation() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).single().unwrap_or_default();
        let mut booked_turn = turn("a", 2, now);
        booked_turn.outcome = TurnOutcome { booked: true, completed: true, ..TurnOutcome::default() };
        let records: Vec<TurnRecord> = [turn("a", 1, now), booked_turn, turn("b", 1, now)]
            .into_iter()
            .map(|base| TurnRecord { turn: Arc::new(base), errors: vec![], healing: vec![] })
            .collect();
        let refs: Vec<&TurnRecord> = records.iter().collect();

        let metrics = aggregate(&refs, Duration::hours(24), now);
        assert_eq!(metrics.turn_count, 3);
        assert_eq!(metrics.conversation_count, 2);
        assert!((metrics.booking_rate - 0.5).abs() < f64::EPSILON);
        assert!((metrics.completion_rate - 0.5).abs() < f64::EPSILON);
        assert!((metrics.mean_latency_ms - 800.0).abs() < f64::EPSILON);
    }
}
