use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telemetry: TelemetryConfig,
    pub detection: DetectionConfig,
    pub healing: HealingConfig,
    pub learning: LearningConfig,
    pub scenarios: ScenariosConfig,
    pub outbound: OutboundConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetryConfig {
    pub capacity: usize,
    pub metrics_window_hours: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionConfig {
    pub timeout_threshold_ms: u64,
    pub abandonment_error_threshold: u32,
    pub low_confidence_threshold: f64,
    pub min_error_confidence: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealingConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub require_approval_for_critical: bool,
    pub result_retention: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LearningConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub max_turns: usize,
    pub min_samples: usize,
    pub min_group_samples: usize,
    pub accuracy_window: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScenariosConfig {
    /// Largest `per_category` a batch request may ask for.
    pub max_per_category: usize,
    /// Generated batches kept for export; the oldest is evicted first.
    pub batch_retention: usize,
}

#[derive(Clone, Debug)]
pub struct OutboundConfig {
    pub analytics_enabled: bool,
    pub analytics_url: Option<String>,
    pub alerts_enabled: bool,
    pub alert_url: Option<String>,
    pub alert_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub max_attempts: Option<u32>,
    pub learning_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telemetry: TelemetryConfig::default(),
            detection: DetectionConfig::default(),
            healing: HealingConfig::default(),
            learning: LearningConfig::default(),
            scenarios: ScenariosConfig::default(),
            outbound: OutboundConfig {
                analytics_enabled: false,
                analytics_url: None,
                alerts_enabled: false,
                alert_url: None,
                alert_token: None,
                timeout_secs: 5,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { capacity: 10_000, metrics_window_hours: 24 }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            timeout_threshold_ms: 10_000,
            abandonment_error_threshold: 2,
            low_confidence_threshold: 0.3,
            min_error_confidence: 0.0,
        }
    }
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            require_approval_for_critical: false,
            result_retention: 10_000,
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 86_400,
            max_turns: 100_000,
            min_samples: 10,
            min_group_samples: 5,
            accuracy_window: 1_000,
        }
    }
}

impl Default for ScenariosConfig {
    fn default() -> Self {
        Self { max_per_category: 50, batch_retention: 20 }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Effective configuration as JSON with secrets replaced by a marker.
    pub fn redacted(&self) -> serde_json::Value {
        let outbound = &self.outbound;
        serde_json::json!({
            "telemetry": self.telemetry,
            "detection": self.detection,
            "healing": self.healing,
            "learning": self.learning,
            "scenarios": self.scenarios,
            "outbound": {
                "analytics_enabled": outbound.analytics_enabled,
                "analytics_url": outbound.analytics_url,
                "alerts_enabled": outbound.alerts_enabled,
                "alert_url": outbound.alert_url,
                "alert_token": outbound.alert_token.as_ref().map(|_| "[redacted]"),
                "timeout_secs": outbound.timeout_secs,
            },
            "server": self.server,
            "logging": self.logging,
        })
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(telemetry) = patch.telemetry {
            if let Some(capacity) = telemetry.capacity {
                self.telemetry.capacity = capacity;
            }
            if let Some(hours) = telemetry.metrics_window_hours {
                self.telemetry.metrics_window_hours = hours;
            }
        }

        if let Some(detection) = patch.detection {
            if let Some(threshold) = detection.timeout_threshold_ms {
                self.detection.timeout_threshold_ms = threshold;
            }
            if let Some(threshold) = detection.abandonment_error_threshold {
                self.detection.abandonment_error_threshold = threshold;
            }
            if let Some(threshold) = detection.low_confidence_threshold {
                self.detection.low_confidence_threshold = threshold;
            }
            if let Some(confidence) = detection.min_error_confidence {
                self.detection.min_error_confidence = confidence;
            }
        }

        if let Some(healing) = patch.healing {
            if let Some(enabled) = healing.enabled {
                self.healing.enabled = enabled;
            }
            if let Some(max_attempts) = healing.max_attempts {
                self.healing.max_attempts = max_attempts;
            }
            if let Some(required) = healing.require_approval_for_critical {
                self.healing.require_approval_for_critical = required;
            }
            if let Some(retention) = healing.result_retention {
                self.healing.result_retention = retention;
            }
        }

        if let Some(learning) = patch.learning {
            if let Some(enabled) = learning.enabled {
                self.learning.enabled = enabled;
            }
            if let Some(interval_secs) = learning.interval_secs {
                self.learning.interval_secs = interval_secs;
            }
            if let Some(max_turns) = learning.max_turns {
                self.learning.max_turns = max_turns;
            }
            if let Some(min_samples) = learning.min_samples {
                self.learning.min_samples = min_samples;
            }
            if let Some(min_group_samples) = learning.min_group_samples {
                self.learning.min_group_samples = min_group_samples;
            }
            if let Some(window) = learning.accuracy_window {
                self.learning.accuracy_window = window;
            }
        }

        if let Some(scenarios) = patch.scenarios {
            if let Some(max) = scenarios.max_per_category {
                self.scenarios.max_per_category = max;
            }
            if let Some(retention) = scenarios.batch_retention {
                self.scenarios.batch_retention = retention;
            }
        }

        if let Some(outbound) = patch.outbound {
            if let Some(enabled) = outbound.analytics_enabled {
                self.outbound.analytics_enabled = enabled;
            }
            if let Some(url) = outbound.analytics_url {
                self.outbound.analytics_url = Some(url);
            }
            if let Some(enabled) = outbound.alerts_enabled {
                self.outbound.alerts_enabled = enabled;
            }
            if let Some(url) = outbound.alert_url {
                self.outbound.alert_url = Some(url);
            }
            if let Some(alert_token_value) = outbound.alert_token {
                self.outbound.alert_token = Some(secret_value(alert_token_value));
            }
            if let Some(timeout_secs) = outbound.timeout_secs {
                self.outbound.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SENTINEL_TELEMETRY_CAPACITY") {
            self.telemetry.capacity = parse_env("SENTINEL_TELEMETRY_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("SENTINEL_TELEMETRY_METRICS_WINDOW_HOURS") {
            self.telemetry.metrics_window_hours =
                parse_env("SENTINEL_TELEMETRY_METRICS_WINDOW_HOURS", &value)?;
        }

        if let Some(value) = read_env("SENTINEL_DETECTION_TIMEOUT_THRESHOLD_MS") {
            self.detection.timeout_threshold_ms =
                parse_env("SENTINEL_DETECTION_TIMEOUT_THRESHOLD_MS", &value)?;
        }
        if let Some(value) = read_env("SENTINEL_DETECTION_ABANDONMENT_ERROR_THRESHOLD") {
            self.detection.abandonment_error_threshold =
                parse_env("SENTINEL_DETECTION_ABANDONMENT_ERROR_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("SENTINEL_DETECTION_LOW_CONFIDENCE_THRESHOLD") {
            self.detection.low_confidence_threshold =
                parse_env("SENTINEL_DETECTION_LOW_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("SENTINEL_DETECTION_MIN_ERROR_CONFIDENCE") {
            self.detection.min_error_confidence =
                parse_env("SENTINEL_DETECTION_MIN_ERROR_CONFIDENCE", &value)?;
        }

        if let Some(value) = read_env("SENTINEL_HEALING_ENABLED") {
            self.healing.enabled = parse_env("SENTINEL_HEALING_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SENTINEL_HEALING_MAX_ATTEMPTS") {
            self.healing.max_attempts = parse_env("SENTINEL_HEALING_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("SENTINEL_HEALING_REQUIRE_APPROVAL_FOR_CRITICAL") {
            self.healing.require_approval_for_critical =
                parse_env("SENTINEL_HEALING_REQUIRE_APPROVAL_FOR_CRITICAL", &value)?;
        }

        if let Some(value) = read_env("SENTINEL_LEARNING_ENABLED") {
            self.learning.enabled = parse_env("SENTINEL_LEARNING_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SENTINEL_LEARNING_INTERVAL_SECS") {
            self.learning.interval_secs = parse_env("SENTINEL_LEARNING_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("SENTINEL_LEARNING_MAX_TURNS") {
            self.learning.max_turns = parse_env("SENTINEL_LEARNING_MAX_TURNS", &value)?;
        }

        if let Some(value) = read_env("SENTINEL_SCENARIOS_MAX_PER_CATEGORY") {
            self.scenarios.max_per_category =
                parse_env("SENTINEL_SCENARIOS_MAX_PER_CATEGORY", &value)?;
        }
        if let Some(value) = read_env("SENTINEL_SCENARIOS_BATCH_RETENTION") {
            self.scenarios.batch_retention =
                parse_env("SENTINEL_SCENARIOS_BATCH_RETENTION", &value)?;
        }

        if let Some(value) = read_env("SENTINEL_OUTBOUND_ANALYTICS_ENABLED") {
            self.outbound.analytics_enabled =
                parse_env("SENTINEL_OUTBOUND_ANALYTICS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SENTINEL_OUTBOUND_ANALYTICS_URL") {
            self.outbound.analytics_url = Some(value);
        }
        if let Some(value) = read_env("SENTINEL_OUTBOUND_ALERTS_ENABLED") {
            self.outbound.alerts_enabled = parse_env("SENTINEL_OUTBOUND_ALERTS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SENTINEL_OUTBOUND_ALERT_URL") {
            self.outbound.alert_url = Some(value);
        }
        if let Some(value) = read_env("SENTINEL_OUTBOUND_ALERT_TOKEN") {
            self.outbound.alert_token = Some(secret_value(value));
        }

        if let Some(value) = read_env("SENTINEL_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SENTINEL_SERVER_PORT") {
            self.server.port = parse_env("SENTINEL_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SENTINEL_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("SENTINEL_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("SENTINEL_LOGGING_LEVEL").or_else(|| read_env("SENTINEL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SENTINEL_LOGGING_FORMAT").or_else(|| read_env("SENTINEL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.healing.max_attempts = max_attempts;
        }
        if let Some(enabled) = overrides.learning_enabled {
            self.learning.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_telemetry(&self.telemetry)?;
        validate_detection(&self.detection)?;
        validate_healing(&self.healing)?;
        validate_learning(&self.learning)?;
        validate_scenarios(&self.scenarios)?;
        validate_outbound(&self.outbound)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("sentinel.toml"), PathBuf::from("config/sentinel.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_telemetry(telemetry: &TelemetryConfig) -> Result<(), ConfigError> {
    if telemetry.capacity == 0 {
        return Err(ConfigError::Validation(
            "telemetry.capacity must be greater than zero".to_string(),
        ));
    }
    if telemetry.metrics_window_hours == 0 {
        return Err(ConfigError::Validation(
            "telemetry.metrics_window_hours must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_detection(detection: &DetectionConfig) -> Result<(), ConfigError> {
    if detection.timeout_threshold_ms == 0 {
        return Err(ConfigError::Validation(
            "detection.timeout_threshold_ms must be greater than zero".to_string(),
        ));
    }
    ensure_unit_interval("detection.low_confidence_threshold", detection.low_confidence_threshold)?;
    ensure_unit_interval("detection.min_error_confidence", detection.min_error_confidence)?;
    Ok(())
}

fn validate_healing(healing: &HealingConfig) -> Result<(), ConfigError> {
    if !(1..=20).contains(&healing.max_attempts) {
        return Err(ConfigError::Validation(
            "healing.max_attempts must be in range 1..=20".to_string(),
        ));
    }
    if healing.result_retention == 0 {
        return Err(ConfigError::Validation(
            "healing.result_retention must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_learning(learning: &LearningConfig) -> Result<(), ConfigError> {
    if learning.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "learning.interval_secs must be greater than zero".to_string(),
        ));
    }
    if learning.max_turns == 0 {
        return Err(ConfigError::Validation(
            "learning.max_turns must be greater than zero".to_string(),
        ));
    }
    if learning.min_group_samples == 0 {
        return Err(ConfigError::Validation(
            "learning.min_group_samples must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_scenarios(scenarios: &ScenariosConfig) -> Result<(), ConfigError> {
    if scenarios.max_per_category == 0 {
        return Err(ConfigError::Validation(
            "scenarios.max_per_category must be greater than zero".to_string(),
        ));
    }
    if scenarios.batch_retention == 0 {
        return Err(ConfigError::Validation(
            "scenarios.batch_retention must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_outbound(outbound: &OutboundConfig) -> Result<(), ConfigError> {
    if outbound.analytics_enabled {
        ensure_http_url("outbound.analytics_url", outbound.analytics_url.as_deref())?;
    }
    if outbound.alerts_enabled {
        ensure_http_url("outbound.alert_url", outbound.alert_url.as_deref())?;
        let blank_token = outbound
            .alert_token
            .as_ref()
            .map(|token| token.expose_secret().trim().is_empty())
            .unwrap_or(false);
        if blank_token {
            return Err(ConfigError::Validation(
                "outbound.alert_token must not be blank when set".to_string(),
            ));
        }
    }
    if outbound.timeout_secs == 0 || outbound.timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "outbound.timeout_secs must be in range 1..=60".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn ensure_unit_interval(key: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must be within 0.0..=1.0 (got {value})")))
    }
}

fn ensure_http_url(key: &str, value: Option<&str>) -> Result<(), ConfigError> {
    match value.map(str::trim) {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
        Some(_) => Err(ConfigError::Validation(format!(
            "{key} must start with http:// or https://"
        ))),
        None => Err(ConfigError::Validation(format!(
            "{key} is required when the channel is enabled"
        ))),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    telemetry: Option<TelemetryPatch>,
    detection: Option<DetectionPatch>,
    healing: Option<HealingPatch>,
    learning: Option<LearningPatch>,
    scenarios: Option<ScenariosPatch>,
    outbound: Option<OutboundPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TelemetryPatch {
    capacity: Option<usize>,
    metrics_window_hours: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DetectionPatch {
    timeout_threshold_ms: Option<u64>,
    abandonment_error_threshold: Option<u32>,
    low_confidence_threshold: Option<f64>,
    min_error_confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct HealingPatch {
    enabled: Option<bool>,
    max_attempts: Option<u32>,
    require_approval_for_critical: Option<bool>,
    result_retention: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LearningPatch {
    enabled: Option<bool>,
    interval_secs: Option<u64>,
    max_turns: Option<usize>,
    min_samples: Option<usize>,
    min_group_samples: Option<usize>,
    accuracy_window: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ScenariosPatch {
    max_per_category: Option<usize>,
    batch_retention: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct OutboundPatch {
    analytics_enabled: Option<bool>,
    analytics_url: Option<String>,
    alerts_enabled: Option<bool>,
    alert_url: Option<String>,
    alert_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
