use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "voice_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub dependent_id: i32,

    /// SHA-256 hex of the client-held session secret. The secret itself is
    /// returned once at open time and never persisted.
    pub token_hash: String,

    /// "OPEN", "CLOSED" or "EXPIRED". Expiry is evaluated lazily against
    /// `expires_at`; the column only changes on explicit close.
    pub status: String,

    /// Claimed while an answer submission is in flight so a second concurrent
    /// submission on the same session is rejected instead of interleaved.
    pub processing: bool,

    pub expires_at: String,

    pub created_at: String,

    pub updated_at: String,
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
}

impl Related<super::dependents::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Dependents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
