//! Route guards. Each protected handler names the principal kind it
//! requires as an extractor argument; a token of the other kind is
//! rejected with 403 rather than silently coerced.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::AppState;
use super::error::ApiError;
use crate::db::User;
use crate::entities::dependents;
use crate::services::token_issuer::Principal;

/// An authenticated caregiver with an active account.
pub struct CaregiverAuth(pub User);

/// An authenticated dependent device. Tombstoned dependents fail here, so
/// a deleted dependent's token dies with the record.
pub struct DependentAuth(pub dependents::Model);

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))
}

impl FromRequestParts<Arc<AppState>> for CaregiverAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let principal = state.shared.tokens.verify(token)?;

        let Principal::Caregiver { id, .. } = principal else {
            return Err(ApiError::Forbidden(
                "Caregiver credentials required".to_string(),
            ));
        };

        let user = state
            .shared
            .store
            .get_user_by_id(id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Unknown account".to_string()))?;

        if !user.is_active {
            return Err(ApiError::Unauthorized("Account is disabled".to_string()));
        }

        Ok(Self(user))
    }
}

impl FromRequestParts<Arc<AppState>> for DependentAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let principal = state.shared.tokens.verify(token)?;

        let Principal::Dependent { id } = principal else {
            return Err(ApiError::Forbidden(
                "Dependent credentials required".to_string(),
            ));
        };

        let dependent = state
            .shared
            .store
            .get_dependent(id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Unknown dependent".to_string()))?;

        Ok(Self(dependent))
    }
}
