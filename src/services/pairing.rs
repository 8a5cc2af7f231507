//! Pairing-code lifecycle: create, poll, accept, exchange.
//!
//! One state machine serves both entry points. Device-initiated codes are
//! anonymous 128-bit secrets that walk PENDING -> CONNECTED -> USED, with
//! the final hop trading a one-time exchange secret for a dependent bearer
//! token. Caregiver-initiated codes are short human-entry secrets bound to
//! a dependent up front and collapse PENDING -> USED inside accept.
//!
//! Every state transition is a guarded single-statement UPDATE on the code
//! row, so no interleaving of concurrent callers can take a transition
//! twice. Expiry is re-derived from `expires_at` on every read; a stale
//! PENDING status past its TTL is already dead.

use std::sync::Arc;

use rand::Rng;
use thiserror::Error;
use tracing::info;

use crate::config::PairingConfig;
use crate::db::{NewDependent, Store};
use crate::entities::pairing_codes;
use crate::services::token_issuer::{TokenError, TokenIssuer};

const PREBOUND_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const EXCHANGE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("Pairing code not found")]
    NotFound,

    #[error("Pairing code expired")]
    Expired,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid exchange secret")]
    Unauthorized,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for PairingError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<TokenError> for PairingError {
    fn from(err: TokenError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result of code creation.
#[derive(Debug, Clone)]
pub struct CreatedCode {
    pub code: String,
    pub expires_at: String,
}

/// Read-only poll outcome for the anonymous/waiting side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Valid,
    NotFound,
    AlreadyUsed,
    Expired,
}

impl VerifyOutcome {
    #[must_use]
    pub const fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Valid => None,
            Self::NotFound => Some("not_found"),
            Self::AlreadyUsed => Some("already_used"),
            Self::Expired => Some("expired"),
        }
    }
}

/// Poll view for the device flow, revealing the one-time exchange secret
/// exactly while the code sits in CONNECTED.
#[derive(Debug, Clone)]
pub struct StatusView {
    pub status: String,
    pub auth_code: Option<String>,
}

/// Who the accepted code should bind to.
#[derive(Debug, Clone)]
pub enum AcceptTarget {
    Existing(i32),
    New(NewDependent),
}

#[derive(Debug, Clone)]
pub struct ExchangeGrant {
    pub access_token: String,
    pub expires_in_seconds: i64,
    pub dependent_id: i32,
}

pub struct PairingService {
    store: Store,
    tokens: Arc<TokenIssuer>,
    config: PairingConfig,
}

impl PairingService {
    #[must_use]
    pub fn new(store: Store, tokens: Arc<TokenIssuer>, config: PairingConfig) -> Self {
        Self {
            store,
            tokens,
            config,
        }
    }

    fn expires_at(&self) -> String {
        (chrono::Utc::now() + chrono::Duration::minutes(self.config.code_ttl_minutes)).to_rfc3339()
    }

    /// Anonymous device entry point. The code is the only secret standing
    /// between the device and an account takeover, so it carries 128 bits
    /// of entropy (22 chars of URL-safe base64).
    pub async fn create_device_code(&self) -> Result<CreatedCode, PairingError> {
        let code = gen_device_code();
        let expires_at = self.expires_at();

        self.store
            .pairing_repo()
            .insert(&code, "DEVICE", None, None, &expires_at)
            .await?;

        info!(kind = "DEVICE", "Pairing code created");

        Ok(CreatedCode { code, expires_at })
    }

    /// Caregiver entry point: a short human-readable code pre-bound to an
    /// owned dependent. The caregiver already holds an authenticated
    /// channel, so readability wins over entropy here; the TTL still keeps
    /// it out of guessing range.
    pub async fn create_bound_code(
        &self,
        caregiver_id: i32,
        dependent_id: i32,
    ) -> Result<CreatedCode, PairingError> {
        let dep = self
            .store
            .get_dependent(dependent_id)
            .await?
            .ok_or(PairingError::NotFound)?;

        if dep.caregiver_id.is_some_and(|c| c != caregiver_id) {
            return Err(PairingError::Conflict(
                "Dependent is linked to another caregiver".to_string(),
            ));
        }

        let code = gen_prebound_code(self.config.prebound_code_length);
        let expires_at = self.expires_at();

        self.store
            .pairing_repo()
            .insert(
                &code,
                "CAREGIVER",
                Some(dependent_id),
                Some(caregiver_id),
                &expires_at,
            )
            .await?;

        info!(kind = "CAREGIVER", dependent_id, "Pairing code created");

        Ok(CreatedCode { code, expires_at })
    }

    /// Read-only poll; never mutates and never reveals secrets.
    pub async fn verify(&self, code: &str) -> Result<VerifyOutcome, PairingError> {
        let Some(row) = self.store.get_pairing_code(&normalize(code)).await? else {
            return Ok(VerifyOutcome::NotFound);
        };

        if row.status == "USED" {
            return Ok(VerifyOutcome::AlreadyUsed);
        }

        if is_expired(&row.expires_at) {
            return Ok(VerifyOutcome::Expired);
        }

        Ok(VerifyOutcome::Valid)
    }

    /// Device-flow status poll. An expired or unknown code reads as
    /// "expired" so the waiting device cannot distinguish the two.
    pub async fn status(&self, code: &str) -> Result<StatusView, PairingError> {
        let row = self.store.get_pairing_code(&normalize(code)).await?;

        let Some(row) = row else {
            return Ok(StatusView {
                status: "expired".to_string(),
                auth_code: None,
            });
        };

        if row.status != "USED" && is_expired(&row.expires_at) {
            return Ok(StatusView {
                status: "expired".to_string(),
                auth_code: None,
            });
        }

        let auth_code = if row.status == "CONNECTED" {
            row.exchange_code
        } else {
            None
        };

        Ok(StatusView {
            status: row.status.to_lowercase(),
            auth_code,
        })
    }

    /// Caregiver accepts a code, binding (or creating) the dependent.
    ///
    /// The status transition is a guarded UPDATE filtered on PENDING; when
    /// two caregivers race on the same code, exactly one row update wins
    /// and the loser is told Conflict. Dependent relinking happens only on
    /// the winning path.
    pub async fn accept(
        &self,
        code: &str,
        caregiver_id: i32,
        target: Option<AcceptTarget>,
    ) -> Result<i32, PairingError> {
        let row = self
            .store
            .get_pairing_code(&normalize(code))
            .await?
            .ok_or(PairingError::NotFound)?;

        if is_expired(&row.expires_at) {
            return Err(PairingError::Expired);
        }

        if row.status != "PENDING" {
            return Err(PairingError::Conflict(
                "Code already connected or used".to_string(),
            ));
        }

        if row.kind == "CAREGIVER" {
            self.accept_prebound(&row, caregiver_id).await
        } else {
            self.accept_device(&row, caregiver_id, target).await
        }
    }

    async fn accept_prebound(
        &self,
        row: &pairing_codes::Model,
        caregiver_id: i32,
    ) -> Result<i32, PairingError> {
        let dependent_id = row.dependent_id.ok_or_else(|| {
            PairingError::Internal("Pre-bound code has no dependent".to_string())
        })?;

        let dep = self
            .store
            .get_dependent(dependent_id)
            .await?
            .ok_or(PairingError::NotFound)?;

        if dep.caregiver_id.is_some_and(|c| c != caregiver_id) {
            return Err(PairingError::Conflict(
                "Already linked to another caregiver".to_string(),
            ));
        }

        let won =
            crate::db::repositories::pairing::PairingRepository::claim_use_prebound(
                &self.store.conn,
                row.id,
                caregiver_id,
            )
            .await?;

        if !won {
            return Err(self.classify_lost_claim(&row.code).await);
        }

        if dep.caregiver_id.is_none() {
            let relinked = self
                .store
                .dependent_repo()
                .relink_caregiver(dependent_id, caregiver_id)
                .await?;

            if !relinked {
                // Somebody else linked the dependent between our read and
                // the guarded update.
                return Err(PairingError::Conflict(
                    "Already linked to another caregiver".to_string(),
                ));
            }
        }

        info!(code_id = row.id, dependent_id, "Pre-bound pairing code consumed");

        Ok(dependent_id)
    }

    async fn accept_device(
        &self,
        row: &pairing_codes::Model,
        caregiver_id: i32,
        target: Option<AcceptTarget>,
    ) -> Result<i32, PairingError> {
        // Resolve the dependent before claiming the code. A brand-new
        // dependent row created here is compensated (tombstoned) if the
        // claim is lost to a concurrent acceptor.
        let (dependent_id, created) = match target {
            Some(AcceptTarget::Existing(id)) => {
                let dep = self
                    .store
                    .get_dependent(id)
                    .await?
                    .ok_or(PairingError::NotFound)?;

                if dep.caregiver_id.is_some_and(|c| c != caregiver_id) {
                    return Err(PairingError::Conflict(
                        "Already linked to another caregiver".to_string(),
                    ));
                }

                (id, false)
            }
            Some(AcceptTarget::New(input)) => {
                if input.name.trim().is_empty() {
                    return Err(PairingError::Validation(
                        "dependent.name is required".to_string(),
                    ));
                }

                let dep = self
                    .store
                    .dependent_repo()
                    .create(caregiver_id, &input)
                    .await?;

                (dep.id, true)
            }
            None => {
                return Err(PairingError::Validation(
                    "dependent_id or dependent info is required".to_string(),
                ));
            }
        };

        let exchange_code = gen_exchange_code(self.config.exchange_code_length);

        let won = crate::db::repositories::pairing::PairingRepository::claim_connect(
            &self.store.conn,
            row.id,
            caregiver_id,
            dependent_id,
            &exchange_code,
        )
        .await?;

        if !won {
            if created {
                self.store.dependent_repo().tombstone(dependent_id).await?;
            }
            return Err(self.classify_lost_claim(&row.code).await);
        }

        // Winner relinks an existing (possibly unlinked) dependent. The
        // relink itself is guarded, so a dependent that got linked to a
        // different caregiver in the meantime is never stolen.
        if !created {
            let relinked = self
                .store
                .dependent_repo()
                .relink_caregiver(dependent_id, caregiver_id)
                .await?;

            if !relinked {
                return Err(PairingError::Conflict(
                    "Already linked to another caregiver".to_string(),
                ));
            }
        }

        info!(code_id = row.id, dependent_id, "Pairing code accepted");

        Ok(dependent_id)
    }

    /// Trade the one-time exchange secret for a dependent bearer token.
    /// The guarded UPDATE clears the secret and flips CONNECTED -> USED in
    /// one statement, so the grant is handed out at most once; the token is
    /// minted beforehand and discarded if the claim is lost.
    pub async fn exchange(
        &self,
        code: &str,
        presented_secret: &str,
    ) -> Result<ExchangeGrant, PairingError> {
        let row = self
            .store
            .get_pairing_code(&normalize(code))
            .await?
            .ok_or(PairingError::NotFound)?;

        if is_expired(&row.expires_at) {
            return Err(PairingError::Expired);
        }

        let Some(stored_secret) = row.exchange_code.as_deref() else {
            return Err(PairingError::Conflict(
                "Not connected or already exchanged".to_string(),
            ));
        };

        if row.status != "CONNECTED" {
            return Err(PairingError::Conflict(
                "Not connected or already exchanged".to_string(),
            ));
        }

        if stored_secret != presented_secret {
            return Err(PairingError::Unauthorized);
        }

        let dependent_id = row
            .dependent_id
            .ok_or_else(|| PairingError::Internal("Connected code has no dependent".to_string()))?;

        let access_token = self.tokens.issue_dependent(dependent_id)?;

        let won = crate::db::repositories::pairing::PairingRepository::claim_exchange(
            &self.store.conn,
            row.id,
        )
        .await?;

        if !won {
            return Err(PairingError::Conflict(
                "Not connected or already exchanged".to_string(),
            ));
        }

        info!(code_id = row.id, dependent_id, "Exchange secret consumed");

        Ok(ExchangeGrant {
            access_token,
            expires_in_seconds: self.tokens.dependent_ttl_minutes() * 60,
            dependent_id,
        })
    }

    /// A lost claim means somebody else transitioned the row between our
    /// read and our UPDATE. Re-read to tell Conflict from late expiry.
    async fn classify_lost_claim(&self, code: &str) -> PairingError {
        match self.store.get_pairing_code(code).await {
            Ok(Some(row)) if is_expired(&row.expires_at) && row.status != "USED" => {
                PairingError::Expired
            }
            Ok(_) => PairingError::Conflict("Code already connected or used".to_string()),
            Err(e) => e.into(),
        }
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_string()
}

/// URL-safe base64 of 128 random bits, 22 chars, no padding.
#[must_use]
pub fn gen_device_code() -> String {
    use base64::Engine;

    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Uppercase letters + digits, for codes a human reads out loud.
#[must_use]
pub fn gen_prebound_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| PREBOUND_ALPHABET[rng.random_range(0..PREBOUND_ALPHABET.len())] as char)
        .collect()
}

/// Mixed-case alphanumeric one-time exchange secret.
#[must_use]
pub fn gen_exchange_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| EXCHANGE_ALPHABET[rng.random_range(0..EXCHANGE_ALPHABET.len())] as char)
        .collect()
}

/// Lazy expiry check against the stored RFC3339 timestamp. An unparseable
/// timestamp counts as expired rather than immortal.
#[must_use]
pub fn is_expired(expires_at: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(expires_at)
        .map_or(true, |t| chrono::Utc::now() > t.with_timezone(&chrono::Utc))
}
