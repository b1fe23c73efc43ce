//! Offline exports of the mining dataset and synthetic batches.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::learning::MiningSample;
use crate::scenarios::TrainingBatch;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Csv => "csv",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported export format `{0}` (expected json or csv)")]
    UnsupportedFormat(String),
    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
}

const DATASET_HEADER: [&str; 11] = [
    "turn_id",
    "intent",
    "language",
    "had_error",
    "error_type",
    "was_healed",
    "satisfaction",
    "converted",
    "abandoned",
    "abandonment_prevented",
    "agent_response",
];

const BATCH_HEADER: [&str; 10] = [
    "scenario_id",
    "category",
    "difficulty",
    "user_message",
    "agent_response",
    "expected_intent",
    "expected_language",
    "expected_errors",
    "passed",
    "failures",
];

pub fn export_dataset(samples: &[MiningSample], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(samples)?),
        ExportFormat::Csv => {
            let rows = samples.iter().map(|sample| {
                let point = &sample.point;
                vec![
                    point.turn_id.0.clone(),
                    point.intent.as_str().to_string(),
                    point.language.clone(),
                    point.had_error.to_string(),
                    point.error_type.map(|error_type| error_type.as_str().to_string()).unwrap_or_default(),
                    point.was_healed.to_string(),
                    format!("{:.3}", point.satisfaction),
                    point.converted.to_string(),
                    point.abandoned.to_string(),
                    point.abandonment_prevented.to_string(),
                    sample.agent_response.clone(),
                ]
            });
            Ok(to_csv(&DATASET_HEADER, rows))
        }
    }
}

/// Scenarios of `batch`, with the last replay verdict when one exists.
pub fn export_batch(batch: &TrainingBatch, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(batch)?),
        ExportFormat::Csv => {
            let verdict = |scenario_id: &str| {
                batch.last_report.as_ref().and_then(|report| {
                    report.results.iter().find(|result| result.scenario_id == scenario_id)
                })
            };
            let rows = batch.scenarios.iter().map(|scenario| {
                let first = scenario.turns.first();
                let result = verdict(&scenario.id);
                let expected: Vec<&str> =
                    scenario.expected_errors.iter().map(|error| error.as_str()).collect();
                vec![
                    scenario.id.clone(),
                    scenario.category.as_str().to_string(),
                    scenario.difficulty.as_str().to_string(),
                    first.map(|turn| turn.user_message.clone()).unwrap_or_default(),
                    first.map(|turn| turn.agent_response.clone()).unwrap_or_default(),
                    scenario.expected_intent.as_str().to_string(),
                    scenario.expected_language.clone(),
                    expected.join(";"),
                    result.map(|result| result.passed.to_string()).unwrap_or_default(),
                    result.map(|result| result.failures.join("; ")).unwrap_or_default(),
                ]
            });
            Ok(to_csv(&BATCH_HEADER, rows))
        }
    }
}

fn to_csv(header: &[&str], rows: impl Iterator<Item = Vec<String>>) -> String {
    let mut out = header.join(",");
    out.push('\n');
    for row in rows {
        let escaped: Vec<String> = row.iter().map(|field| csv_escape(field)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{csv_escape, export_dataset, ExportFormat};
    use crate::domain::error::ErrorType;
    use crate::domain::learning::{LearningDataPoint, MiningSample};
    use crate::domain::turn::TurnId;
    use crate::signals::Intent;

    fn sample() -> MiningSample {
        MiningSample {
            point: LearningDataPoint {
                turn_id: TurnId("c-1#2".to_owned()),
                intent: Intent::FlightSearch,
                language: "en".to_owned(),
                had_error: true,
                error_type: Some(ErrorType::ParsingFailure),
                was_healed: true,
                satisfaction: 0.45,
                converted: false,
                abandoned: false,
                abandonment_prevented: true,
            },
            agent_response: "Sure, \"Paris\" it is,\nwhen?".to_owned(),
        }
    }

    #[test]
    fn csv_quotes_fields_with_delimiters() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn dataset_csv_has_header_and_one_row_per_sample() {
        let csv = export_dataset(&[sample()], ExportFormat::Csv).expect("csv");
        let mut lines = csv.lines();
        assert_eq!(lines.next().map(|line| line.starts_with("turn_id,intent,language")), Some(true));
        let row = lines.next().expect("data row");
        assert!(row.starts_with("c-1#2,flight_search,en,true,parsing-failure,true,0.450,false,false,true,"));
        assert!(csv.contains("\"Sure, \"\"Paris\"\" it is,\nwhen?\""));
    }

    #[test]
    fn dataset_json_round_trips_fields() {
        let json = export_dataset(&[sample()], ExportFormat::Json).expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value[0]["point"]["error_type"], "parsing-failure");
        assert_eq!(value[0]["point"]["intent"], "flight_search");
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("CSV".parse::<ExportFormat>().ok(), Some(ExportFormat::Csv));
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
