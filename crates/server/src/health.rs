use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use sentinel_core::learning::{LearningMiner, MiningOutcome};
use sentinel_core::telemetry::TelemetryBus;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    pub bus: Arc<TelemetryBus>,
    pub miner: Arc<LearningMiner>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub telemetry: HealthCheck,
    pub learning: HealthCheck,
    pub checked_at: String,
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let telemetry = telemetry_check(&state.bus);
    let learning = learning_check(&state.miner);
    let ready = telemetry.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "sentinel-server runtime initialized".to_string(),
        },
        telemetry,
        learning,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn telemetry_check(bus: &TelemetryBus) -> HealthCheck {
    if bus.capacity() == 0 {
        return HealthCheck {
            status: "degraded",
            detail: "telemetry bus has no capacity".to_string(),
        };
    }
    HealthCheck {
        status: "ready",
        detail: format!("{} of {} turns buffered", bus.len(), bus.capacity()),
    }
}

fn learning_check(miner: &LearningMiner) -> HealthCheck {
    let detail = match (miner.last_run_at(), miner.last_outcome()) {
        (Some(at), Some(MiningOutcome::Completed(report))) => format!(
            "last pass completed at {} over {} samples",
            at.to_rfc3339(),
            report.sample_count
        ),
        (Some(at), Some(MiningOutcome::Skipped { reason })) => {
            format!("last pass skipped at {}: {reason}", at.to_rfc3339())
        }
        (Some(at), Some(MiningOutcome::Cancelled { .. })) => {
            format!("last pass cancelled at {}", at.to_rfc3339())
        }
        _ => "no mining pass has run yet".to_string(),
    };
    HealthCheck { status: "ready", detail }
}
