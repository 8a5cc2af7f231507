use sea_orm::entity::prelude::*;

/// Append-only analysis history. Rows are never mutated after creation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "analyses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub dependent_id: i32,

    #[sea_orm(unique)]
    pub call_id: Option<i32>,

    /// Aggregated session score. -1.0 means "unanalyzed".
    pub state: f32,

    pub risk_score: Option<f32>,

    /// Base64-encoded representative artifact (e.g. mel-spectrogram image).
    pub artifact: Option<String>,

    pub model_version: Option<String>,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::dependents::Entity",
        from = "Column::DependentId",
        to = "super::dependents::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Dependents,
    #[sea_orm(
        belongs_to = "super::calls::Entity",
        from = "Column::CallId",
        to = "super::calls::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Calls,
}

impl Related<super::dependents::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Dependents.def()
    }
}

impl Related<super::calls::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Calls.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
