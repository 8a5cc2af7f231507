//! System endpoints: liveness, readiness and version info.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub struct HealthLiveResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthReadinessChecks {
    pub database: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthReadyResponse {
    pub ready: bool,
    pub checks: HealthReadinessChecks,
}

pub async fn health_live(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<HealthLiveResponse>> {
    Json(ApiResponse::success(HealthLiveResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    }))
}

pub async fn health_ready(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthReadyResponse>>) {
    let database = state.shared.store.ping().await.is_ok();

    let ready = database;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ApiResponse::success(HealthReadyResponse {
            ready,
            checks: HealthReadinessChecks { database },
        })),
    )
}
