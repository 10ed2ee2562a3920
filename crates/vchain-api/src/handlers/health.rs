//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use vchain_models::JobId;

use crate::state::AppState;

/// Document ID probed by the readiness check; it is never created.
const PROBE_JOB_ID: &str = "_health_check";

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub job_store: CheckStatus,
    pub queue: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(started: Instant) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(started.elapsed().as_millis() as u64),
        }
    }

    fn skipped() -> Self {
        Self {
            status: "skipped".to_string(),
            error: None,
            latency_ms: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }

    fn is_healthy(&self) -> bool {
        self.status != "error"
    }
}

/// Readiness check endpoint (readiness probe).
/// Checks the job store and, when configured, Redis.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let job_store = {
        let start = Instant::now();
        match state.jobs.get(&JobId::from(PROBE_JOB_ID)).await {
            Ok(_) => CheckStatus::ok(start),
            // A clean NotFound means the store answered
            Err(e) if e.is_not_found() => CheckStatus::ok(start),
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    let queue = match &state.queue {
        Some(queue) => {
            let start = Instant::now();
            match queue.ping().await {
                Ok(()) => CheckStatus::ok(start),
                Err(e) => CheckStatus::error(e.to_string()),
            }
        }
        None => CheckStatus::skipped(),
    };

    let all_ok = job_store.is_healthy() && queue.is_healthy();
    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks { job_store, queue },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
