use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities::{analyses, calls};

/// Inputs for the history records written after a successful aggregation.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub dependent_id: i32,
    pub call_id: Option<i32>,
    pub state: f32,
    pub risk_score: Option<f32>,
    pub artifact: Option<String>,
    pub model_version: Option<String>,
}

pub struct AnalysisRepository {
    conn: DatabaseConnection,
}

impl AnalysisRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Record the completed call for a session submission. Runs on the
    /// caller's transaction so call + analysis land atomically.
    pub async fn record_call<C: ConnectionTrait>(
        db: &C,
        dependent_id: i32,
        voice_session_id: i32,
        question_audio_path: &str,
        answer_audio_path: &str,
        risk_score: f32,
    ) -> Result<calls::Model> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = calls::ActiveModel {
            dependent_id: Set(dependent_id),
            voice_session_id: Set(Some(voice_session_id)),
            status: Set("COMPLETED".to_string()),
            question_audio_path: Set(question_audio_path.to_string()),
            answer_audio_path: Set(answer_audio_path.to_string()),
            risk_score: Set(Some(risk_score)),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active.insert(db).await.context("Failed to insert call")?;

        Ok(model)
    }

    /// Append-only: analysis rows are never updated after this insert.
    pub async fn record_analysis<C: ConnectionTrait>(
        db: &C,
        input: &NewAnalysis,
    ) -> Result<analyses::Model> {
        let active = analyses::ActiveModel {
            dependent_id: Set(input.dependent_id),
            call_id: Set(input.call_id),
            state: Set(input.state),
            risk_score: Set(input.risk_score),
            artifact: Set(input.artifact.clone()),
            model_version: Set(input.model_version.clone()),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        let model = active
            .insert(db)
            .await
            .context("Failed to insert analysis")?;

        Ok(model)
    }

    pub async fn history_for_dependent(&self, dependent_id: i32) -> Result<Vec<analyses::Model>> {
        let rows = analyses::Entity::find()
            .filter(analyses::Column::DependentId.eq(dependent_id))
            .order_by_desc(analyses::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to query analysis history")?;

        Ok(rows)
    }
}
