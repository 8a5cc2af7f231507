//! Voice check-in endpoints, used by the paired device. All of them
//! require a dependent bearer token; everything past open additionally
//! requires the per-session secret in `X-Session-Token`.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, header},
    response::Response,
};
use serde::Serialize;

use super::AppState;
use super::error::ApiError;
use super::extract::DependentAuth;
use super::types::ApiResponse;
use crate::services::aggregate::RiskLevel;
use crate::services::session::AnswerUpload;

const SESSION_TOKEN_HEADER: &str = "x-session-token";

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: i32,
    /// Session secret, revealed once; presented back in `X-Session-Token`.
    pub token: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct QuestionFileDto {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct QuestionsResponse {
    pub files: Vec<QuestionFileDto>,
}

#[derive(Debug, Serialize)]
pub struct FileResultDto {
    pub file_name: String,
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub struct VerdictResponse {
    pub overall_score: f32,
    pub risk_level: RiskLevel,
    pub representative: String,
    pub files: Vec<FileResultDto>,
}

fn session_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))
}

pub async fn open_session(
    DependentAuth(dependent): DependentAuth,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    let opened = state.shared.sessions.open(dependent.id).await?;

    Ok(Json(ApiResponse::success(SessionResponse {
        session_id: opened.session_id,
        token: opened.session_token,
        expires_in: opened.expires_in_seconds,
    })))
}

pub async fn list_questions(
    DependentAuth(dependent): DependentAuth,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i32>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<QuestionsResponse>>, ApiError> {
    let token = session_token(&headers)?;

    let questions = state
        .shared
        .sessions
        .questions(dependent.id, session_id, token)
        .await?;

    let files = questions
        .into_iter()
        .map(|q| QuestionFileDto {
            url: format!("/api/voice/sessions/{session_id}/questions/{}", q.name),
            name: q.name,
        })
        .collect();

    Ok(Json(ApiResponse::success(QuestionsResponse { files })))
}

/// Stream one question recording. Question WAVs are short prompts, so the
/// whole file goes out in one body.
pub async fn get_question(
    DependentAuth(dependent): DependentAuth,
    State(state): State<Arc<AppState>>,
    Path((session_id, name)): Path<(i32, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = session_token(&headers)?;

    let question = state
        .shared
        .sessions
        .question_file(dependent.id, session_id, token, &name)
        .await?;

    let bytes = tokio::fs::read(&question.path)
        .await
        .map_err(|_| ApiError::NotFound(format!("Question {} not found", question.name)))?;

    Response::builder()
        .header(header::CONTENT_TYPE, "audio/wav")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", question.name),
        )
        .body(Body::from(bytes))
        .map_err(|e| ApiError::InternalError(e.to_string()))
}

pub async fn submit_answers(
    DependentAuth(dependent): DependentAuth,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i32>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<VerdictResponse>>, ApiError> {
    let token = session_token(&headers)?.to_string();

    let mut uploads: Vec<AnswerUpload> = Vec::new();
    let mut pick: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(e.to_string()))?
    {
        let field_name = field.name().map(ToString::to_string);
        match field_name.as_deref() {
            Some("files" | "file") => {
                let file_name = field.file_name().map_or_else(
                    || format!("answer-{}.wav", uploads.len() + 1),
                    ToString::to_string,
                );
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(e.to_string()))?;

                if bytes.is_empty() {
                    return Err(ApiError::validation(format!("Empty file: {file_name}")));
                }

                uploads.push(AnswerUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            Some("pick") => {
                pick = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::validation(e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let verdict = state
        .shared
        .sessions
        .submit_answers(dependent.id, session_id, &token, uploads, pick.as_deref())
        .await?;

    Ok(Json(ApiResponse::success(VerdictResponse {
        overall_score: verdict.overall_score,
        risk_level: verdict.risk_level,
        representative: verdict.representative,
        files: verdict
            .files
            .into_iter()
            .map(|f| FileResultDto {
                file_name: f.file_name,
                score: f.score,
            })
            .collect(),
    })))
}

pub async fn close_session(
    DependentAuth(dependent): DependentAuth,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i32>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let token = session_token(&headers)?;

    state
        .shared
        .sessions
        .close(dependent.id, session_id, token)
        .await?;

    Ok(Json(ApiResponse::success(())))
}
