use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::info;

use super::AppState;
use super::connections::CodeResponse;
use super::error::ApiError;
use super::extract::CaregiverAuth;
use super::types::{AnalysisDto, ApiResponse, DependentDto, LatestAnalysisDto};

pub async fn get_dependent(
    CaregiverAuth(user): CaregiverAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<DependentDto>>, ApiError> {
    let dep = state
        .shared
        .store
        .get_owned_dependent(id, user.id)
        .await?
        .ok_or_else(|| ApiError::dependent_not_found(id))?;

    Ok(Json(ApiResponse::success(dep.into())))
}

pub async fn delete_dependent(
    CaregiverAuth(user): CaregiverAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state
        .shared
        .store
        .get_owned_dependent(id, user.id)
        .await?
        .ok_or_else(|| ApiError::dependent_not_found(id))?;

    state.shared.store.dependent_repo().tombstone(id).await?;

    info!(dependent_id = id, caregiver_id = user.id, "Dependent removed");

    Ok(Json(ApiResponse::success(())))
}

/// Mint a short pre-bound pairing code for an owned dependent.
pub async fn create_pairing_code(
    CaregiverAuth(user): CaregiverAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<CodeResponse>>, ApiError> {
    state
        .shared
        .store
        .get_owned_dependent(id, user.id)
        .await?
        .ok_or_else(|| ApiError::dependent_not_found(id))?;

    let created = state.shared.pairing.create_bound_code(user.id, id).await?;

    Ok(Json(ApiResponse::success(CodeResponse {
        code: created.code,
        expires_at: created.expires_at,
    })))
}

/// Rolling snapshot from the dependent row itself: cheap to read on every
/// dashboard refresh, no join into the analysis history.
pub async fn latest_analysis(
    CaregiverAuth(user): CaregiverAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<LatestAnalysisDto>>, ApiError> {
    let dep = state
        .shared
        .store
        .get_owned_dependent(id, user.id)
        .await?
        .ok_or_else(|| ApiError::dependent_not_found(id))?;

    let risk_score = (dep.last_state >= 0.0).then_some(dep.last_state);
    let created_at = dep
        .last_exam_at
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    Ok(Json(ApiResponse::success(LatestAnalysisDto {
        dependent_id: dep.id,
        state: dep.last_state,
        risk_score,
        created_at,
        artifact: dep.last_artifact,
    })))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub dependent_id: i32,
    pub analyses: Vec<AnalysisDto>,
}

pub async fn analysis_history(
    CaregiverAuth(user): CaregiverAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<HistoryResponse>>, ApiError> {
    state
        .shared
        .store
        .get_owned_dependent(id, user.id)
        .await?
        .ok_or_else(|| ApiError::dependent_not_found(id))?;

    let rows = state.shared.store.analysis_history(id).await?;

    Ok(Json(ApiResponse::success(HistoryResponse {
        dependent_id: id,
        analyses: rows.into_iter().map(Into::into).collect(),
    })))
}
