//! Signed bearer tokens for the two principal kinds.
//!
//! Caregiver tokens carry `sub = "<id>"`; dependent device tokens carry
//! `sub = "dependent:<id>"`. The two are never interchangeable: route
//! guards require the expected kind and reject the other.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    /// Bad signature, malformed structure, unrecognized subject shape or
    /// expired `exp`. Deliberately not more specific than this.
    #[error("Invalid token")]
    Invalid,

    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

/// Resolved identity carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Caregiver { id: i32, role: String },
    Dependent { id: i32 },
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    exp: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    caregiver_ttl_minutes: i64,
    dependent_ttl_minutes: i64,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &str, caregiver_ttl_minutes: i64, dependent_ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            caregiver_ttl_minutes,
            dependent_ttl_minutes,
        }
    }

    #[must_use]
    pub const fn caregiver_ttl_minutes(&self) -> i64 {
        self.caregiver_ttl_minutes
    }

    #[must_use]
    pub const fn dependent_ttl_minutes(&self) -> i64 {
        self.dependent_ttl_minutes
    }

    pub fn issue_caregiver(&self, user_id: i32, role: &str) -> Result<String, TokenError> {
        self.issue(user_id.to_string(), Some(role.to_string()), self.caregiver_ttl_minutes)
    }

    pub fn issue_dependent(&self, dependent_id: i32) -> Result<String, TokenError> {
        self.issue(
            format!("dependent:{dependent_id}"),
            Some("dependent".to_string()),
            self.dependent_ttl_minutes,
        )
    }

    fn issue(
        &self,
        sub: String,
        role: Option<String>,
        ttl_minutes: i64,
    ) -> Result<String, TokenError> {
        let exp = (chrono::Utc::now() + chrono::Duration::minutes(ttl_minutes)).timestamp();
        let claims = Claims { sub, role, exp };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verify signature and expiry, then parse the subject into a principal.
    /// Every failure collapses to [`TokenError::Invalid`]; callers never see
    /// why a token was rejected.
    pub fn verify(&self, token: &str) -> Result<Principal, TokenError> {
        let validation = Validation::new(Algorithm::HS256);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| TokenError::Invalid)?;

        let claims = data.claims;

        if let Some(id_str) = claims.sub.strip_prefix("dependent:") {
            let id: i32 = id_str.parse().map_err(|_| TokenError::Invalid)?;
            return Ok(Principal::Dependent { id });
        }

        let id: i32 = claims.sub.parse().map_err(|_| TokenError::Invalid)?;
        let role = claims.role.unwrap_or_else(|| "CAREGIVER".to_string());
        Ok(Principal::Caregiver { id, role })
    }
}
