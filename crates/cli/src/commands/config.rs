use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use sentinel_core::config::AppConfig;
use toml::Value;

use crate::commands::{load_config, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    CommandResult::rendered(0, render(&config))
}

pub fn render(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let outbound = &config.outbound;
    let alert_token = if outbound.alert_token.is_some() { "<redacted>" } else { "<unset>" };
    let entries: Vec<(&str, &str, String)> = vec![
        ("telemetry.capacity", "SENTINEL_TELEMETRY_CAPACITY", config.telemetry.capacity.to_string()),
        (
            "telemetry.metrics_window_hours",
            "SENTINEL_TELEMETRY_METRICS_WINDOW_HOURS",
            config.telemetry.metrics_window_hours.to_string(),
        ),
        (
            "detection.timeout_threshold_ms",
            "SENTINEL_DETECTION_TIMEOUT_THRESHOLD_MS",
            config.detection.timeout_threshold_ms.to_string(),
        ),
        (
            "detection.abandonment_error_threshold",
            "SENTINEL_DETECTION_ABANDONMENT_ERROR_THRESHOLD",
            config.detection.abandonment_error_threshold.to_string(),
        ),
        (
            "detection.low_confidence_threshold",
            "SENTINEL_DETECTION_LOW_CONFIDENCE_THRESHOLD",
            config.detection.low_confidence_threshold.to_string(),
        ),
        (
            "detection.min_error_confidence",
            "SENTINEL_DETECTION_MIN_ERROR_CONFIDENCE",
            config.detection.min_error_confidence.to_string(),
        ),
        ("healing.enabled", "SENTINEL_HEALING_ENABLED", config.healing.enabled.to_string()),
        (
            "healing.max_attempts",
            "SENTINEL_HEALING_MAX_ATTEMPTS",
            config.healing.max_attempts.to_string(),
        ),
        (
            "healing.require_approval_for_critical",
            "SENTINEL_HEALING_REQUIRE_APPROVAL_FOR_CRITICAL",
            config.healing.require_approval_for_critical.to_string(),
        ),
        ("learning.enabled", "SENTINEL_LEARNING_ENABLED", config.learning.enabled.to_string()),
        (
            "learning.interval_secs",
            "SENTINEL_LEARNING_INTERVAL_SECS",
            config.learning.interval_secs.to_string(),
        ),
        ("learning.max_turns", "SENTINEL_LEARNING_MAX_TURNS", config.learning.max_turns.to_string()),
        (
            "scenarios.max_per_category",
            "SENTINEL_SCENARIOS_MAX_PER_CATEGORY",
            config.scenarios.max_per_category.to_string(),
        ),
        (
            "scenarios.batch_retention",
            "SENTINEL_SCENARIOS_BATCH_RETENTION",
            config.scenarios.batch_retention.to_string(),
        ),
        (
            "outbound.analytics_enabled",
            "SENTINEL_OUTBOUND_ANALYTICS_ENABLED",
            outbound.analytics_enabled.to_string(),
        ),
        (
            "outbound.analytics_url",
            "SENTINEL_OUTBOUND_ANALYTICS_URL",
            outbound.analytics_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        (
            "outbound.alerts_enabled",
            "SENTINEL_OUTBOUND_ALERTS_ENABLED",
            outbound.alerts_enabled.to_string(),
        ),
        (
            "outbound.alert_url",
            "SENTINEL_OUTBOUND_ALERT_URL",
            outbound.alert_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("outbound.alert_token", "SENTINEL_OUTBOUND_ALERT_TOKEN", alert_token.to_string()),
        (
            "server.bind_address",
            "SENTINEL_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        ("server.port", "SENTINEL_SERVER_PORT", config.server.port.to_string()),
        ("logging.level", "SENTINEL_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "SENTINEL_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        entries
            .into_iter()
            .map(|(key, env_key, value)| render_line(key, &value, source(key, env_key))),
    );
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("sentinel.toml"), PathBuf::from("config/sentinel.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use super::contains_path;

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: toml::Value = "[healing]\nmax_attempts = 4\n".parse().expect("toml");
        assert!(contains_path(&doc, "healing.max_attempts"));
        assert!(!contains_path(&doc, "healing.enabled"));
        assert!(!contains_path(&doc, "learning.max_turns"));
    }
}
