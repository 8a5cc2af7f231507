use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};

use crate::entities::pairing_codes;

/// Pairing-code persistence. State transitions are guarded UPDATEs filtered
/// on the expected prior status; `rows_affected == 1` is the win condition,
/// which makes each transition consumable at most once regardless of how
/// many callers race on the same row.
pub struct PairingRepository {
    conn: DatabaseConnection,
}

impl PairingRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(
        &self,
        code: &str,
        kind: &str,
        dependent_id: Option<i32>,
        caregiver_id: Option<i32>,
        expires_at: &str,
    ) -> Result<pairing_codes::Model> {
        let active = pairing_codes::ActiveModel {
            code: Set(code.to_string()),
            kind: Set(kind.to_string()),
            status: Set("PENDING".to_string()),
            dependent_id: Set(dependent_id),
            caregiver_id: Set(caregiver_id),
            expires_at: Set(expires_at.to_string()),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert pairing code")?;

        Ok(model)
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<pairing_codes::Model>> {
        let row = pairing_codes::Entity::find()
            .filter(pairing_codes::Column::Code.eq(code))
            .one(&self.conn)
            .await
            .context("Failed to query pairing code")?;

        Ok(row)
    }

    /// Device-flow accept: PENDING -> CONNECTED, binding the dependent and
    /// the accepting caregiver and minting the one-time exchange secret.
    /// Returns false when another caller already took the transition.
    pub async fn claim_connect<C: ConnectionTrait>(
        db: &C,
        id: i32,
        caregiver_id: i32,
        dependent_id: i32,
        exchange_code: &str,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = pairing_codes::Entity::update_many()
            .col_expr(pairing_codes::Column::Status, Expr::value("CONNECTED"))
            .col_expr(pairing_codes::Column::CaregiverId, Expr::value(caregiver_id))
            .col_expr(pairing_codes::Column::DependentId, Expr::value(dependent_id))
            .col_expr(pairing_codes::Column::UsedBy, Expr::value(caregiver_id))
            .col_expr(
                pairing_codes::Column::ExchangeCode,
                Expr::value(exchange_code),
            )
            .col_expr(pairing_codes::Column::ConnectedAt, Expr::value(now))
            .filter(pairing_codes::Column::Id.eq(id))
            .filter(pairing_codes::Column::Status.eq("PENDING"))
            .exec(db)
            .await
            .context("Failed to claim pairing code connect")?;

        Ok(result.rows_affected == 1)
    }

    /// Pre-bound flow accept: PENDING -> USED in a single step, no exchange.
    pub async fn claim_use_prebound<C: ConnectionTrait>(
        db: &C,
        id: i32,
        used_by: i32,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = pairing_codes::Entity::update_many()
            .col_expr(pairing_codes::Column::Status, Expr::value("USED"))
            .col_expr(pairing_codes::Column::UsedBy, Expr::value(used_by))
            .col_expr(pairing_codes::Column::ConnectedAt, Expr::value(now))
            .filter(pairing_codes::Column::Id.eq(id))
            .filter(pairing_codes::Column::Status.eq("PENDING"))
            .exec(db)
            .await
            .context("Failed to claim pre-bound pairing code")?;

        Ok(result.rows_affected == 1)
    }

    /// Exchange: CONNECTED -> USED, clearing the one-time secret so the same
    /// exchange can never repeat.
    pub async fn claim_exchange<C: ConnectionTrait>(db: &C, id: i32) -> Result<bool> {
        let result = pairing_codes::Entity::update_many()
            .col_expr(
                pairing_codes::Column::Status,
                Expr::value("USED"),
            )
            .col_expr(
                pairing_codes::Column::ExchangeCode,
                Expr::value(Option::<String>::None),
            )
            .filter(pairing_codes::Column::Id.eq(id))
            .filter(pairing_codes::Column::Status.eq("CONNECTED"))
            .filter(pairing_codes::Column::ExchangeCode.is_not_null())
            .exec(db)
            .await
            .context("Failed to claim pairing code exchange")?;

        Ok(result.rows_affected == 1)
    }

    /// Storage hygiene only: drops rows whose TTL has long passed. Expiry
    /// itself is enforced lazily at read time and never depends on this.
    pub async fn delete_expired_before(&self, cutoff: &str) -> Result<u64> {
        let result = pairing_codes::Entity::delete_many()
            .filter(pairing_codes::Column::ExpiresAt.lt(cutoff))
            .exec(&self.conn)
            .await
            .context("Failed to purge expired pairing codes")?;

        Ok(result.rows_affected)
    }
}
