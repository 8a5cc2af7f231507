//! Voice check-in sessions: open, deliver questions, score answers, close.
//!
//! A session is a short-lived envelope for one check-in. Opening it hands
//! the device a random session secret; only its SHA-256 lands in storage,
//! so a database leak cannot replay a live session. Submission is
//! exactly-once per session: a guarded UPDATE claims the processing flag,
//! analysis runs outside any transaction, and the resulting call, analysis
//! row, dependent rolling state and session close commit together.

use std::sync::Arc;

use base64::Engine;
use rand::Rng;
use sea_orm::TransactionTrait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::VoiceConfig;
use crate::db::repositories::analysis::AnalysisRepository;
use crate::db::repositories::dependent::DependentRepository;
use crate::db::repositories::session::SessionRepository;
use crate::db::{NewAnalysis, Store};
use crate::entities::voice_sessions;
use crate::services::aggregate::{self, FileScore, Pick, RiskLevel};
use crate::services::analyzer::{AnalysisOutput, Analyzer, AnalyzerError};
use crate::services::pairing::is_expired;
use crate::services::questions::{QuestionAudio, QuestionError, QuestionSource};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Analysis failed: {0}")]
    Upstream(#[from] AnalyzerError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<anyhow::Error> for SessionError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<sea_orm::DbErr> for SessionError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<QuestionError> for SessionError {
    fn from(err: QuestionError) -> Self {
        match err {
            QuestionError::NotFound(_) => Self::NotFound,
            QuestionError::Io(e) => Self::Io(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenedSession {
    pub session_id: i32,
    /// Plaintext session secret, shown exactly once.
    pub session_token: String,
    pub expires_in_seconds: i64,
}

/// One uploaded answer recording, already read off the wire.
pub struct AnswerUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct PerFileResult {
    pub file_name: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct SubmissionVerdict {
    pub overall_score: f32,
    pub risk_level: RiskLevel,
    pub representative: String,
    pub files: Vec<PerFileResult>,
}

pub struct SessionService {
    store: Store,
    questions: Arc<dyn QuestionSource>,
    analyzer: Arc<dyn Analyzer>,
    config: VoiceConfig,
}

impl SessionService {
    #[must_use]
    pub fn new(
        store: Store,
        questions: Arc<dyn QuestionSource>,
        analyzer: Arc<dyn Analyzer>,
        config: VoiceConfig,
    ) -> Self {
        Self {
            store,
            questions,
            analyzer,
            config,
        }
    }

    pub async fn open(&self, dependent_id: i32) -> Result<OpenedSession, SessionError> {
        let session_token = gen_session_token();
        let expires_at = (chrono::Utc::now()
            + chrono::Duration::minutes(self.config.session_ttl_minutes))
        .to_rfc3339();

        let row = self
            .store
            .session_repo()
            .open(dependent_id, &hash_token(&session_token), &expires_at)
            .await?;

        info!(session_id = row.id, dependent_id, "Voice session opened");

        Ok(OpenedSession {
            session_id: row.id,
            session_token,
            expires_in_seconds: self.config.session_ttl_minutes * 60,
        })
    }

    /// The current question set for a live session.
    pub async fn questions(
        &self,
        dependent_id: i32,
        session_id: i32,
        session_token: &str,
    ) -> Result<Vec<QuestionAudio>, SessionError> {
        self.resolve_live(dependent_id, session_id, session_token)
            .await?;

        Ok(self.questions.current_questions().await?)
    }

    /// Resolve one question recording for streaming. The name must be a
    /// plain WAV file name; anything else reads as not found.
    pub async fn question_file(
        &self,
        dependent_id: i32,
        session_id: i32,
        session_token: &str,
        name: &str,
    ) -> Result<QuestionAudio, SessionError> {
        self.resolve_live(dependent_id, session_id, session_token)
            .await?;

        Ok(self.questions.resolve(name).await?)
    }

    /// Score a batch of answer recordings and commit the verdict.
    ///
    /// The processing claim admits one submission per session; losers get
    /// Conflict without touching any state. Analyzer failure for any file
    /// fails the whole submission and releases the claim, leaving the
    /// session OPEN for a retry. Nothing is persisted unless every file
    /// scored and the aggregate transaction committed.
    pub async fn submit_answers(
        &self,
        dependent_id: i32,
        session_id: i32,
        session_token: &str,
        uploads: Vec<AnswerUpload>,
        pick_raw: Option<&str>,
    ) -> Result<SubmissionVerdict, SessionError> {
        self.resolve_live(dependent_id, session_id, session_token)
            .await?;

        if uploads.is_empty() {
            return Err(SessionError::Validation(
                "At least one answer file is required".to_string(),
            ));
        }
        if uploads.len() > self.config.max_answer_files {
            return Err(SessionError::Validation(format!(
                "At most {} answer files are accepted",
                self.config.max_answer_files
            )));
        }

        let claimed = self
            .store
            .session_repo()
            .claim_processing(session_id, dependent_id)
            .await?;

        if !claimed {
            return Err(SessionError::Conflict(
                "Session is closed or a submission is already in progress".to_string(),
            ));
        }

        let outcome = self
            .analyze_and_commit(dependent_id, session_id, uploads, pick_raw)
            .await;

        if outcome.is_err() {
            // Failure path: the claim must not wedge the session shut.
            if let Err(e) = self.store.session_repo().release_processing(session_id).await {
                warn!(session_id, error = %e, "Failed to release processing claim");
            }
        }

        outcome
    }

    async fn analyze_and_commit(
        &self,
        dependent_id: i32,
        session_id: i32,
        uploads: Vec<AnswerUpload>,
        pick_raw: Option<&str>,
    ) -> Result<SubmissionVerdict, SessionError> {
        let staging = std::path::PathBuf::from(&self.config.media_root)
            .join(format!("session-{session_id}"));
        tokio::fs::create_dir_all(&staging).await?;

        let result = self
            .analyze_staged(dependent_id, session_id, &staging, uploads, pick_raw)
            .await;

        // Staged uploads never outlive the submission; the representative
        // recording is copied out before the commit.
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            warn!(session_id, error = %e, "Failed to clean staging directory");
        }

        result
    }

    async fn analyze_staged(
        &self,
        dependent_id: i32,
        session_id: i32,
        staging: &std::path::Path,
        uploads: Vec<AnswerUpload>,
        pick_raw: Option<&str>,
    ) -> Result<SubmissionVerdict, SessionError> {
        let mut scores: Vec<FileScore> = Vec::with_capacity(uploads.len());
        let mut outputs: Vec<AnalysisOutput> = Vec::with_capacity(uploads.len());
        let mut staged_paths: Vec<std::path::PathBuf> = Vec::with_capacity(uploads.len());

        for (i, upload) in uploads.into_iter().enumerate() {
            // Client file names are untrusted; staged files get indexed names.
            let path = staging.join(format!("answer-{}.wav", i + 1));
            tokio::fs::write(&path, &upload.bytes).await?;

            let output = self.analyzer.analyze(&path).await?;

            scores.push(FileScore {
                artifact: upload.file_name,
                score: output.score,
            });
            outputs.push(output);
            staged_paths.push(path);
        }

        let pick = Pick::parse(pick_raw);
        let verdict = aggregate::aggregate(&scores, pick)
            .map_err(|e| SessionError::Validation(e.to_string()))?;

        let rep_index = scores
            .iter()
            .position(|s| s.artifact == verdict.representative)
            .unwrap_or(0);

        let rep_artifact_b64 = outputs[rep_index]
            .artifact
            .as_deref()
            .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes));
        let model_version = outputs[rep_index].model_version.clone();

        // The staging directory is removed whatever happens to this
        // submission, so the call's recording has to live elsewhere.
        let recordings = std::path::PathBuf::from(&self.config.media_root).join("recordings");
        tokio::fs::create_dir_all(&recordings).await?;
        let answer_file = recordings.join(format!("session-{session_id}-answer.wav"));
        tokio::fs::copy(&staged_paths[rep_index], &answer_file).await?;
        let answer_path = answer_file.to_string_lossy().into_owned();
        let question_names = {
            let qs = self.questions.current_questions().await?;
            qs.iter().map(|q| q.name.clone()).collect::<Vec<_>>().join(",")
        };

        let txn = self.store.conn.begin().await?;

        let call = AnalysisRepository::record_call(
            &txn,
            dependent_id,
            session_id,
            &question_names,
            &answer_path,
            verdict.overall_score,
        )
        .await?;

        AnalysisRepository::record_analysis(
            &txn,
            &NewAnalysis {
                dependent_id,
                call_id: Some(call.id),
                state: verdict.overall_score,
                risk_score: Some(verdict.overall_score),
                artifact: rep_artifact_b64.clone(),
                model_version,
            },
        )
        .await?;

        DependentRepository::update_rolling_state_on(
            &txn,
            dependent_id,
            verdict.overall_score,
            rep_artifact_b64,
        )
        .await?;

        SessionRepository::close_on(&txn, session_id).await?;

        txn.commit().await?;

        info!(
            session_id,
            dependent_id,
            score = verdict.overall_score,
            risk = verdict.risk_level.as_str(),
            "Voice session scored and closed"
        );

        Ok(SubmissionVerdict {
            overall_score: verdict.overall_score,
            risk_level: verdict.risk_level,
            representative: verdict.representative,
            files: scores
                .into_iter()
                .map(|s| PerFileResult {
                    file_name: s.artifact,
                    score: s.score,
                })
                .collect(),
        })
    }

    /// Close without scoring. Idempotent: closing a CLOSED session succeeds.
    pub async fn close(
        &self,
        dependent_id: i32,
        session_id: i32,
        session_token: &str,
    ) -> Result<(), SessionError> {
        let row = self
            .store
            .get_session_for_dependent(session_id, dependent_id)
            .await?
            .ok_or(SessionError::NotFound)?;

        if row.token_hash != hash_token(session_token) {
            return Err(SessionError::NotFound);
        }

        if row.processing {
            return Err(SessionError::Conflict(
                "A submission is in progress".to_string(),
            ));
        }

        self.store
            .session_repo()
            .close(session_id, dependent_id)
            .await?;

        info!(session_id, dependent_id, "Voice session closed");

        Ok(())
    }

    /// Ownership + secret + status + expiry, in that order. A wrong secret,
    /// a closed session and an expired session all read as NotFound so
    /// probes cannot tell any of those cases apart from a bad id.
    async fn resolve_live(
        &self,
        dependent_id: i32,
        session_id: i32,
        session_token: &str,
    ) -> Result<voice_sessions::Model, SessionError> {
        let row = self
            .store
            .get_session_for_dependent(session_id, dependent_id)
            .await?
            .ok_or(SessionError::NotFound)?;

        if row.token_hash != hash_token(session_token) {
            return Err(SessionError::NotFound);
        }

        if row.status != "OPEN" || is_expired(&row.expires_at) {
            return Err(SessionError::NotFound);
        }

        Ok(row)
    }
}

/// 256-bit URL-safe session secret.
#[must_use]
pub fn gen_session_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex SHA-256; only this form is ever stored.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex_lower(&hasher.finalize())
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
