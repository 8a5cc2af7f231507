use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};

use crate::entities::dependents;

/// Fields accepted when a dependent record is created during pairing
/// acceptance or by a caregiver directly.
#[derive(Debug, Clone, Default)]
pub struct NewDependent {
    pub name: String,
    pub birth_date: Option<String>,
    pub sex: Option<String>,
    pub preferred_call_time: Option<String>,
    pub retry_count: Option<i32>,
    pub retry_interval_min: Option<i32>,
}

pub struct DependentRepository {
    conn: DatabaseConnection,
}

impl DependentRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Get a dependent, excluding soft-deleted rows.
    pub async fn get(&self, id: i32) -> Result<Option<dependents::Model>> {
        let dep = dependents::Entity::find_by_id(id)
            .filter(dependents::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await
            .context("Failed to query dependent")?;

        Ok(dep)
    }

    /// Get a dependent only if it is owned by the given caregiver.
    pub async fn get_owned(&self, id: i32, caregiver_id: i32) -> Result<Option<dependents::Model>> {
        let dep = dependents::Entity::find_by_id(id)
            .filter(dependents::Column::CaregiverId.eq(caregiver_id))
            .filter(dependents::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await
            .context("Failed to query owned dependent")?;

        Ok(dep)
    }

    pub async fn create(&self, caregiver_id: i32, input: &NewDependent) -> Result<dependents::Model> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = dependents::ActiveModel {
            caregiver_id: Set(Some(caregiver_id)),
            name: Set(input.name.clone()),
            birth_date: Set(input.birth_date.clone()),
            sex: Set(input.sex.clone().unwrap_or_else(|| "U".to_string())),
            preferred_call_time: Set(input.preferred_call_time.clone()),
            retry_count: Set(input.retry_count.unwrap_or(3)),
            retry_interval_min: Set(input.retry_interval_min.unwrap_or(10)),
            last_state: Set(-1.0),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert dependent")?;

        Ok(model)
    }

    /// Link a dependent to a caregiver, but never steal one: the guarded
    /// UPDATE only lands while the dependent is unlinked or already linked
    /// to this same caregiver. Returns false when another caregiver holds
    /// the link (or the row is tombstoned/missing).
    pub async fn relink_caregiver(&self, id: i32, caregiver_id: i32) -> Result<bool> {
        let result = dependents::Entity::update_many()
            .col_expr(
                dependents::Column::CaregiverId,
                Expr::value(Some(caregiver_id)),
            )
            .col_expr(
                dependents::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(dependents::Column::Id.eq(id))
            .filter(dependents::Column::DeletedAt.is_null())
            .filter(
                Condition::any()
                    .add(dependents::Column::CaregiverId.is_null())
                    .add(dependents::Column::CaregiverId.eq(caregiver_id)),
            )
            .exec(&self.conn)
            .await
            .context("Failed to relink dependent")?;

        Ok(result.rows_affected == 1)
    }

    /// Update the rolling analysis fields after a successful session
    /// aggregation. Runs on the submission transaction so the rolling
    /// fields land atomically with the call and analysis rows.
    pub async fn update_rolling_state_on<C: ConnectionTrait>(
        db: &C,
        id: i32,
        last_state: f32,
        last_artifact: Option<String>,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut update = dependents::Entity::update_many()
            .col_expr(dependents::Column::LastState, Expr::value(last_state))
            .col_expr(dependents::Column::LastExamAt, Expr::value(Some(now.clone())))
            .col_expr(dependents::Column::UpdatedAt, Expr::value(now));

        if let Some(artifact) = last_artifact {
            update = update.col_expr(
                dependents::Column::LastArtifact,
                Expr::value(Some(artifact)),
            );
        }

        let result = update
            .filter(dependents::Column::Id.eq(id))
            .exec(db)
            .await
            .context("Failed to update dependent rolling state")?;

        if result.rows_affected == 0 {
            anyhow::bail!("Dependent not found: {id}");
        }

        Ok(())
    }

    /// Soft-delete: sets the tombstone timestamp, never removes the row.
    /// Sessions and analyses belonging to the dependent become unreachable
    /// through the ownership filters, not deleted.
    pub async fn tombstone(&self, id: i32) -> Result<bool> {
        let dep = dependents::Entity::find_by_id(id)
            .filter(dependents::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await
            .context("Failed to query dependent for delete")?;

        let Some(dep) = dep else {
            return Ok(false);
        };

        let now = chrono::Utc::now().to_rfc3339();

        let mut active: dependents::ActiveModel = dep.into();
        active.deleted_at = Set(Some(now.clone()));
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(true)
    }
}
