//! Pairing endpoints. The device side (create, status poll, verify,
//! exchange) is anonymous by necessity; the code itself is the secret.
//! Accepting a code is caregiver-only.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::ApiError;
use super::extract::CaregiverAuth;
use super::types::ApiResponse;
use crate::db::NewDependent;
use crate::services::pairing::AcceptTarget;

#[derive(Debug, Serialize)]
pub struct CodeResponse {
    pub code: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
pub struct DependentInfo {
    pub name: String,
    pub birth_date: Option<String>,
    pub sex: Option<String>,
    pub preferred_call_time: Option<String>,
    pub retry_count: Option<i32>,
    pub retry_interval_min: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub code: String,
    pub dependent_id: Option<i32>,
    pub dependent: Option<DependentInfo>,
}

#[derive(Debug, Serialize)]
pub struct AcceptResponse {
    pub dependent_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    pub code: String,
    pub auth_code: String,
}

#[derive(Debug, Serialize)]
pub struct ExchangeResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub dependent_id: i32,
}

/// Device entry point: mint an anonymous pairing code.
pub async fn create_code(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<CodeResponse>>, ApiError> {
    let created = state.shared.pairing.create_device_code().await?;

    Ok(Json(ApiResponse::success(CodeResponse {
        code: created.code,
        expires_at: created.expires_at,
    })))
}

/// Device poll loop target. Exposes the exchange secret exactly while the
/// code is CONNECTED.
pub async fn code_status(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<StatusResponse>>, ApiError> {
    let view = state.shared.pairing.status(&code).await?;

    Ok(Json(ApiResponse::success(StatusResponse {
        status: view.status,
        auth_code: view.auth_code,
    })))
}

/// Pre-flight check used by UIs before showing the accept form. Always
/// 200; validity is in the body.
pub async fn verify_code(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<ApiResponse<VerifyResponse>>, ApiError> {
    let outcome = state.shared.pairing.verify(&req.code).await?;

    Ok(Json(ApiResponse::success(VerifyResponse {
        valid: outcome.reason().is_none(),
        reason: outcome.reason(),
    })))
}

pub async fn accept_code(
    CaregiverAuth(user): CaregiverAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<AcceptRequest>,
) -> Result<Json<ApiResponse<AcceptResponse>>, ApiError> {
    let target = match (req.dependent_id, req.dependent) {
        (Some(_), Some(_)) => {
            return Err(ApiError::validation(
                "Provide dependent_id or dependent info, not both",
            ));
        }
        (Some(id), None) => Some(AcceptTarget::Existing(id)),
        (None, Some(info)) => Some(AcceptTarget::New(NewDependent {
            name: info.name,
            birth_date: info.birth_date,
            sex: info.sex,
            preferred_call_time: info.preferred_call_time,
            retry_count: info.retry_count,
            retry_interval_min: info.retry_interval_min,
        })),
        (None, None) => None,
    };

    let dependent_id = state.shared.pairing.accept(&req.code, user.id, target).await?;

    Ok(Json(ApiResponse::success(AcceptResponse { dependent_id })))
}

/// Final hop of the device flow: trade the one-time secret for a dependent
/// bearer token.
pub async fn exchange(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExchangeRequest>,
) -> Result<Json<ApiResponse<ExchangeResponse>>, ApiError> {
    let grant = state
        .shared
        .pairing
        .exchange(&req.code, &req.auth_code)
        .await?;

    Ok(Json(ApiResponse::success(ExchangeResponse {
        access_token: grant.access_token,
        token_type: "bearer",
        expires_in: grant.expires_in_seconds,
        dependent_id: grant.dependent_id,
    })))
}
