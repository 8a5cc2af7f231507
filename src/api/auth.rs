use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ApiError;
use super::extract::CaregiverAuth;
use super::types::{ApiResponse, UserDto};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserDto,
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<ApiResponse<TokenResponse>>, ApiError> {
    let email = req.email.trim().to_lowercase();

    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::validation("A valid email is required"));
    }
    if req.name.trim().is_empty() {
        return Err(ApiError::validation("Name is required"));
    }
    let min_len = state.shared.config.auth.min_password_length;
    if req.password.len() < min_len {
        return Err(ApiError::validation(format!(
            "Password must be at least {min_len} characters"
        )));
    }

    if state.shared.store.get_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("Email is already registered".to_string()));
    }

    let user = state
        .shared
        .store
        .create_user(
            &email,
            req.name.trim(),
            &req.password,
            req.phone,
            &state.shared.config.security,
        )
        .await?;

    info!(user_id = user.id, "Caregiver account created");

    let access_token = state.shared.tokens.issue_caregiver(user.id, &user.role)?;

    Ok(Json(ApiResponse::success(TokenResponse {
        access_token,
        token_type: "bearer",
        expires_in: state.shared.tokens.caregiver_ttl_minutes() * 60,
        user: user.into(),
    })))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<TokenResponse>>, ApiError> {
    let email = req.email.trim().to_lowercase();

    // One message for both unknown email and wrong password.
    let user = state
        .shared
        .store
        .verify_user_password(&email, &req.password)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    if !user.is_active {
        return Err(ApiError::Unauthorized("Account is disabled".to_string()));
    }

    state.shared.store.user_repo().touch_last_login(user.id).await?;

    let access_token = state.shared.tokens.issue_caregiver(user.id, &user.role)?;

    info!(user_id = user.id, "Caregiver logged in");

    Ok(Json(ApiResponse::success(TokenResponse {
        access_token,
        token_type: "bearer",
        expires_in: state.shared.tokens.caregiver_ttl_minutes() * 60,
        user: user.into(),
    })))
}

pub async fn me(
    CaregiverAuth(user): CaregiverAuth,
) -> Json<ApiResponse<UserDto>> {
    Json(ApiResponse::success(user.into()))
}
