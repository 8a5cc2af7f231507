use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};

use crate::entities::voice_sessions;

pub struct SessionRepository {
    conn: DatabaseConnection,
}

impl SessionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn open(
        &self,
        dependent_id: i32,
        token_hash: &str,
        expires_at: &str,
    ) -> Result<voice_sessions::Model> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = voice_sessions::ActiveModel {
            dependent_id: Set(dependent_id),
            token_hash: Set(token_hash.to_string()),
            status: Set("OPEN".to_string()),
            processing: Set(false),
            expires_at: Set(expires_at.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert voice session")?;

        Ok(model)
    }

    /// Fetch a session only if it belongs to the dependent. Status and
    /// expiry classification stay with the caller.
    pub async fn get_for_dependent(
        &self,
        session_id: i32,
        dependent_id: i32,
    ) -> Result<Option<voice_sessions::Model>> {
        let row = voice_sessions::Entity::find_by_id(session_id)
            .filter(voice_sessions::Column::DependentId.eq(dependent_id))
            .one(&self.conn)
            .await
            .context("Failed to query voice session")?;

        Ok(row)
    }

    /// Claim submission exclusivity. Succeeds for at most one in-flight
    /// caller per session; the claim is filtered on the OPEN status so a
    /// closed session can never be claimed.
    pub async fn claim_processing(&self, session_id: i32, dependent_id: i32) -> Result<bool> {
        let result = voice_sessions::Entity::update_many()
            .col_expr(voice_sessions::Column::Processing, Expr::value(true))
            .col_expr(
                voice_sessions::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(voice_sessions::Column::Id.eq(session_id))
            .filter(voice_sessions::Column::DependentId.eq(dependent_id))
            .filter(voice_sessions::Column::Status.eq("OPEN"))
            .filter(voice_sessions::Column::Processing.eq(false))
            .exec(&self.conn)
            .await
            .context("Failed to claim session for processing")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn release_processing(&self, session_id: i32) -> Result<()> {
        voice_sessions::Entity::update_many()
            .col_expr(voice_sessions::Column::Processing, Expr::value(false))
            .col_expr(
                voice_sessions::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(voice_sessions::Column::Id.eq(session_id))
            .exec(&self.conn)
            .await
            .context("Failed to release session processing claim")?;

        Ok(())
    }

    /// Close on the caller's transaction, so a successful submission lands
    /// its call, analysis and session close atomically.
    pub async fn close_on<C: ConnectionTrait>(db: &C, session_id: i32) -> Result<()> {
        voice_sessions::Entity::update_many()
            .col_expr(voice_sessions::Column::Status, Expr::value("CLOSED"))
            .col_expr(voice_sessions::Column::Processing, Expr::value(false))
            .col_expr(
                voice_sessions::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(voice_sessions::Column::Id.eq(session_id))
            .exec(db)
            .await
            .context("Failed to close voice session")?;

        Ok(())
    }

    /// Idempotent close. Returns false only when the session does not exist
    /// or is not owned by the dependent.
    pub async fn close(&self, session_id: i32, dependent_id: i32) -> Result<bool> {
        let row = voice_sessions::Entity::find_by_id(session_id)
            .filter(voice_sessions::Column::DependentId.eq(dependent_id))
            .one(&self.conn)
            .await
            .context("Failed to query voice session for close")?;

        let Some(row) = row else {
            return Ok(false);
        };

        if row.status != "CLOSED" {
            let mut active: voice_sessions::ActiveModel = row.into();
            active.status = Set("CLOSED".to_string());
            active.processing = Set(false);
            active.updated_at = Set(chrono::Utc::now().to_rfc3339());
            active.update(&self.conn).await?;
        }

        Ok(true)
    }

    /// Storage hygiene only; correctness relies on lazy expiry at read time.
    pub async fn delete_expired_before(&self, cutoff: &str) -> Result<u64> {
        let result = voice_sessions::Entity::delete_many()
            .filter(voice_sessions::Column::ExpiresAt.lt(cutoff))
            .filter(voice_sessions::Column::Processing.eq(false))
            .exec(&self.conn)
            .await
            .context("Failed to purge expired voice sessions")?;

        Ok(result.rows_affected)
    }
}
