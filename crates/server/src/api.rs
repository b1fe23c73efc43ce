//! JSON surface over the monitoring services.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use sentinel_core::detector::DetectionResult;
use sentinel_core::domain::healing::{HealingAction, HealingResult};
use sentinel_core::domain::turn::{ConversationId, TurnInput};
use sentinel_core::errors::{ApplicationError, InterfaceError};
use sentinel_core::export::{export_batch, export_dataset, ExportFormat};
use sentinel_core::learning::{
    AbTest, ExperimentRegistry, LearningMiner, MinedPatterns, MiningOutcome, VariantKind,
    VariantMetrics, VariantSpec,
};
use sentinel_core::monitor::QualityMonitor;
use sentinel_core::scenarios::{BatchRequest, BatchTestReport, ScenarioGenerator};
use sentinel_core::signals::Intent;
use sentinel_core::telemetry::BusMetrics;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::bootstrap::Application;
use crate::health::{self, HealthState};

/// Largest trailing window accepted by the metrics endpoint.
const MAX_WINDOW_HOURS: u32 = 24 * 90;

#[derive(Clone)]
pub struct ApiState {
    pub monitor: Arc<QualityMonitor>,
    pub miner: Arc<LearningMiner>,
    pub experiments: Arc<ExperimentRegistry>,
    pub generator: Arc<ScenarioGenerator>,
    pub default_window_hours: u32,
    pub max_per_category: usize,
}

impl ApiState {
    pub fn from_application(app: &Application) -> Self {
        Self {
            monitor: app.monitor.clone(),
            miner: app.miner.clone(),
            experiments: app.experiments.clone(),
            generator: app.generator.clone(),
            default_window_hours: app.config.telemetry.metrics_window_hours,
            max_per_category: app.config.scenarios.max_per_category,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    let health_state =
        HealthState { bus: state.monitor.bus().clone(), miner: state.miner.clone() };

    Router::new()
        .route("/v1/turns", post(ingest_turn))
        .route("/v1/metrics", get(metrics))
        .route("/v1/patterns", get(patterns))
        .route("/v1/conversations/{id}/reset", post(reset_conversation))
        .route("/v1/experiments", get(list_experiments).post(create_experiment))
        .route("/v1/experiments/{id}", get(get_experiment))
        .route("/v1/experiments/{id}/results", post(record_experiment_result))
        .route("/v1/experiments/{id}/assignments/{conversation_id}", get(assign_variant))
        .route("/v1/export/dataset", get(export_dataset_handler))
        .route("/v1/scenarios/batches", post(create_batch))
        .route("/v1/scenarios/batches/{id}/export", get(export_batch_handler))
        .with_state(state)
        .merge(Router::new().route("/health", get(health::health)).with_state(health_state))
}

/// [`InterfaceError`] rendered as a JSON body with the matching status.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    /// Request-specific detail, only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub correlation_id: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self(InterfaceError::BadRequest { message: message.into(), correlation_id: correlation_id() })
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self(InterfaceError::NotFound { message: message.into(), correlation_id: correlation_id() })
    }

    pub fn status(&self) -> StatusCode {
        match self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        Self(error.into_interface(correlation_id()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self.0 {
            InterfaceError::BadRequest { .. } => "bad_request",
            InterfaceError::NotFound { .. } => "not_found",
            InterfaceError::ServiceUnavailable { .. } => "service_unavailable",
            InterfaceError::Internal { .. } => "internal",
        };
        if status.is_server_error() {
            warn!(
                event_name = "api.request.failed",
                correlation_id = %self.0.correlation_id(),
                error = %self.0,
                "request failed"
            );
        }
        let detail = match &self.0 {
            InterfaceError::BadRequest { message, .. } | InterfaceError::NotFound { message, .. } => {
                Some(message.clone())
            }
            _ => None,
        };
        let body = ErrorBody {
            error,
            message: self.0.user_message().to_string(),
            detail,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub turn_id: String,
    pub conversation_id: String,
    pub sequence: u64,
    pub language: String,
    pub intent: Intent,
    pub satisfaction: f64,
    pub detection: DetectionResult,
    pub healing: Vec<HealingResult>,
    pub directive: Option<HealingAction>,
    pub requires_human_review: bool,
}

pub async fn ingest_turn(
    State(state): State<ApiState>,
    Json(input): Json<TurnInput>,
) -> Result<Json<TurnResponse>, ApiError> {
    if input.conversation_id.0.trim().is_empty() {
        return Err(ApiError::bad_request("conversation_id must not be empty"));
    }

    let outcome = state.monitor.ingest(input);
    let requires_human_review = outcome.requires_human_review();
    let turn = outcome.turn;
    Ok(Json(TurnResponse {
        turn_id: turn.id.0.clone(),
        conversation_id: turn.conversation_id.0.clone(),
        sequence: turn.sequence,
        language: turn.language.clone(),
        intent: turn.intent,
        satisfaction: turn.satisfaction,
        detection: outcome.detection,
        healing: outcome.healing,
        directive: outcome.directive,
        requires_human_review,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub window_hours: Option<u32>,
}

pub async fn metrics(
    State(state): State<ApiState>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<BusMetrics>, ApiError> {
    let hours = query.window_hours.unwrap_or(state.default_window_hours);
    if hours == 0 || hours > MAX_WINDOW_HOURS {
        return Err(ApiError::bad_request(format!(
            "window_hours must be in range 1..={MAX_WINDOW_HOURS}"
        )));
    }
    Ok(Json(state.monitor.bus().metrics(Duration::hours(i64::from(hours)))))
}

#[derive(Debug, Serialize)]
pub struct PatternsResponse {
    pub patterns: MinedPatterns,
    pub last_outcome: Option<MiningOutcome>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub min_error_confidence: f64,
}

pub async fn patterns(State(state): State<ApiState>) -> Json<PatternsResponse> {
    Json(PatternsResponse {
        patterns: state.miner.patterns(),
        last_outcome: state.miner.last_outcome(),
        last_run_at: state.miner.last_run_at(),
        min_error_confidence: state.monitor.services().detector.min_error_confidence(),
    })
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub conversation_id: String,
    pub previous_attempts: u32,
}

pub async fn reset_conversation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Json<ResetResponse> {
    let previous_attempts = state.monitor.reset_conversation(&ConversationId(id.clone()));
    Json(ResetResponse { conversation_id: id, previous_attempts })
}

#[derive(Debug, Deserialize)]
pub struct CreateExperimentRequest {
    pub name: String,
    pub control: VariantSpec,
    pub treatment: VariantSpec,
}

pub async fn create_experiment(
    State(state): State<ApiState>,
    Json(request): Json<CreateExperimentRequest>,
) -> Result<(StatusCode, Json<AbTest>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::bad_request("experiment name must not be empty"));
    }
    let test = state.experiments.create(request.name, request.control, request.treatment);
    Ok((StatusCode::CREATED, Json(test)))
}

pub async fn list_experiments(State(state): State<ApiState>) -> Json<Vec<AbTest>> {
    state.experiments.evaluate_all();
    Json(state.experiments.list())
}

/// Reading a test also runs its completion check.
pub async fn get_experiment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<AbTest>, ApiError> {
    let test = state.experiments.evaluate(&id).map_err(ApplicationError::from)?;
    Ok(Json(test))
}

#[derive(Debug, Deserialize)]
pub struct RecordResultRequest {
    pub variant: VariantKind,
    pub metrics: VariantMetrics,
}

pub async fn record_experiment_result(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<RecordResultRequest>,
) -> Result<Json<AbTest>, ApiError> {
    let test = state
        .experiments
        .record_result(&id, request.variant, &request.metrics)
        .map_err(ApplicationError::from)?;
    Ok(Json(test))
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub test_id: String,
    pub conversation_id: String,
    pub variant: VariantKind,
}

pub async fn assign_variant(
    State(state): State<ApiState>,
    Path((id, conversation_id)): Path<(String, String)>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let variant = state
        .experiments
        .assign(&id, &ConversationId(conversation_id.clone()))
        .map_err(ApplicationError::from)?;
    Ok(Json(AssignmentResponse { test_id: id, conversation_id, variant }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

impl ExportQuery {
    fn format(&self) -> Result<ExportFormat, ApiError> {
        match &self.format {
            Some(raw) => raw.parse().map_err(|error: sentinel_core::export::ExportError| {
                ApiError::bad_request(error.to_string())
            }),
            None => Ok(ExportFormat::default()),
        }
    }
}

pub async fn export_dataset_handler(
    State(state): State<ApiState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format = query.format()?;
    let samples = state.monitor.samples(state.miner.max_turns());
    let body = export_dataset(&samples, format)
        .map_err(|error| ApplicationError::Export(error.to_string()))?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub batch_id: String,
    pub seed: u64,
    pub scenario_count: usize,
    pub report: BatchTestReport,
}

pub async fn create_batch(
    State(state): State<ApiState>,
    Json(request): Json<BatchRequest>,
) -> Result<(StatusCode, Json<BatchResponse>), ApiError> {
    if request.per_category == 0 || request.categories.is_empty() {
        return Err(ApiError::bad_request(
            "per_category must be positive and categories must not be empty",
        ));
    }
    if request.per_category > state.max_per_category {
        return Err(ApiError::bad_request(format!(
            "per_category must not exceed {}",
            state.max_per_category
        )));
    }

    let generator = state.generator.clone();
    let (batch, report) = tokio::task::spawn_blocking(move || {
        let batch = generator.generate_batch(&request);
        generator.test_batch(&batch.id).map(|report| (batch, report))
    })
    .await
    .map_err(|error| ApplicationError::Integration(format!("scenario replay task failed: {error}")))?
    .map_err(ApplicationError::from)?;
    Ok((
        StatusCode::CREATED,
        Json(BatchResponse {
            batch_id: batch.id,
            seed: batch.seed,
            scenario_count: batch.scenarios.len(),
            report,
        }),
    ))
}

pub async fn export_batch_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format = query.format()?;
    let batch = state
        .generator
        .batch(&id)
        .ok_or_else(|| ApiError::not_found(format!("unknown training batch `{id}`")))?;
    let body = export_batch(&batch, format)
        .map_err(|error| ApplicationError::Export(error.to_string()))?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        extract::{Path, Query, State},
        http::{Request, StatusCode},
        response::IntoResponse,
        Json,
    };
    use sentinel_core::config::AppConfig;
    use sentinel_core::domain::healing::{Directive, HealingActionType};
    use sentinel_core::domain::turn::TurnInput;
    use sentinel_core::errors::InterfaceError;
    use sentinel_core::learning::{VariantKind, VariantMetrics, VariantSpec};
    use sentinel_core::scenarios::BatchRequest;
    use sentinel_core::{InMemoryOutboundSink, SystemClock};
    use std::sync::Arc;
    use tower::ServiceExt;

    use super::*;
    use crate::bootstrap::assemble;

    fn state() -> (ApiState, InMemoryOutboundSink) {
        let sink = InMemoryOutboundSink::default();
        let app = assemble(AppConfig::default(), Arc::new(sink.clone()), Arc::new(SystemClock));
        (ApiState::from_application(&app), sink)
    }

    fn spec(name: &str) -> VariantSpec {
        VariantSpec {
            name: name.to_string(),
            directive: Directive::RefinePrompt { instruction: format!("{name} phrasing") },
        }
    }

    #[tokio::test]
    async fn ingest_returns_the_language_switch_directive() {
        let (state, sink) = state();
        let Json(response) = ingest_turn(
            State(state),
            Json(TurnInput::new("conv-api", "I need a flight to Madrid", "No entiendo inglés")),
        )
        .await
        .expect("ingest");

        assert_eq!(response.sequence, 1);
        let directive = response.directive.expect("directive");
        assert_eq!(directive.action_type, HealingActionType::LanguageSwitch);
        assert_eq!(sink.alerts().len(), 1);
    }

    #[tokio::test]
    async fn ingest_rejects_blank_conversation_ids() {
        let (state, _) = state();
        let error = ingest_turn(State(state), Json(TurnInput::new("  ", "hi", "hello")))
            .await
            .err()
            .expect("bad request");
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn metrics_window_is_validated() {
        let (state, _) = state();
        let error = metrics(State(state.clone()), Query(MetricsQuery { window_hours: Some(0) }))
            .await
            .err()
            .expect("bad request");
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);

        let Json(snapshot) =
            metrics(State(state), Query(MetricsQuery::default())).await.expect("metrics");
        assert_eq!(snapshot.turn_count, 0);
        assert_eq!(snapshot.error_rate, 0.0);
    }

    #[tokio::test]
    async fn experiment_lifecycle_and_unknown_ids() {
        let (state, _) = state();
        let (status, Json(test)) = create_experiment(
            State(state.clone()),
            Json(CreateExperimentRequest {
                name: "greeting".to_string(),
                control: spec("control"),
                treatment: spec("treatment"),
            }),
        )
        .await
        .expect("create");
        assert_eq!(status, StatusCode::CREATED);

        let Json(updated) = record_experiment_result(
            State(state.clone()),
            Path(test.id.clone()),
            Json(RecordResultRequest {
                variant: VariantKind::Treatment,
                metrics: VariantMetrics { conversations: 10, bookings: 4, ..VariantMetrics::default() },
            }),
        )
        .await
        .expect("record");
        assert_eq!(updated.treatment.metrics.conversations, 10);

        let missing = get_experiment(State(state), Path("missing".to_string()))
            .await
            .err()
            .expect("not found");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dataset_export_honors_format() {
        let (state, _) = state();
        state.monitor.ingest(TurnInput::new("conv-x", "hello", "Hi! Where to?"));

        let response = export_dataset_handler(
            State(state.clone()),
            Query(ExportQuery { format: Some("csv".to_string()) }),
        )
        .await
        .expect("export");
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let text = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(text.starts_with("turn_id,intent,language"));
        assert_eq!(text.lines().count(), 2);

        let error = export_dataset_handler(
            State(state),
            Query(ExportQuery { format: Some("xml".to_string()) }),
        )
        .await
        .err()
        .expect("bad format");
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn scenario_batch_is_generated_and_replayed() {
        let (state, _) = state();
        let (status, Json(response)) =
            create_batch(State(state.clone()), Json(BatchRequest::default())).await.expect("batch");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(response.report.total, response.scenario_count);

        let exported = export_batch_handler(
            State(state),
            Path(response.batch_id),
            Query(ExportQuery::default()),
        )
        .await;
        assert!(exported.is_ok());
    }

    #[tokio::test]
    async fn oversized_batch_requests_are_rejected() {
        let (state, _) = state();
        let request = BatchRequest {
            per_category: state.max_per_category + 1,
            ..BatchRequest::default()
        };
        let error = create_batch(State(state.clone()), Json(request))
            .await
            .err()
            .expect("too large");
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert!(state.generator.batches().is_empty());
    }

    #[tokio::test]
    async fn router_serves_health_and_renders_errors_as_json() {
        let (state, _) = state();
        let app = router(state);

        let health = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(health.status(), StatusCode::OK);

        let missing = app
            .oneshot(
                Request::builder()
                    .uri("/v1/experiments/nope")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(missing.into_body(), usize::MAX).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload["error"], "not_found");
        assert!(payload["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[test]
    fn interface_errors_map_to_statuses() {
        let error = ApiError(InterfaceError::ServiceUnavailable {
            message: "alert endpoint down".to_string(),
            correlation_id: "c".to_string(),
        });
        assert_eq!(error.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
