use serde::Serialize;

use crate::db::User;
use crate::entities::{analyses, dependents};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            phone: user.phone,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DependentDto {
    pub id: i32,
    pub name: String,
    pub sex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_call_time: Option<String>,
    pub retry_count: i32,
    pub retry_interval_min: i32,
    pub last_state: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_exam_at: Option<String>,
}

impl From<dependents::Model> for DependentDto {
    fn from(dep: dependents::Model) -> Self {
        Self {
            id: dep.id,
            name: dep.name,
            sex: dep.sex,
            birth_date: dep.birth_date,
            preferred_call_time: dep.preferred_call_time,
            retry_count: dep.retry_count,
            retry_interval_min: dep.retry_interval_min,
            last_state: dep.last_state,
            last_exam_at: dep.last_exam_at,
        }
    }
}

/// Rolling snapshot from the dependent row. A `state` below zero means no
/// session has ever completed; `risk_score` is null in that case.
#[derive(Debug, Serialize)]
pub struct LatestAnalysisDto {
    pub dependent_id: i32,
    pub state: f32,
    pub risk_score: Option<f32>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisDto {
    pub id: i32,
    pub state: f32,
    pub risk_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub created_at: String,
}

impl From<analyses::Model> for AnalysisDto {
    fn from(row: analyses::Model) -> Self {
        Self {
            id: row.id,
            state: row.state,
            risk_score: row.risk_score,
            model_version: row.model_version,
            created_at: row.created_at,
        }
    }
}
