use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "pairing_codes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub code: String,

    /// Entry point that minted the code: "DEVICE" (anonymous, exchange step
    /// follows) or "CAREGIVER" (pre-bound to a dependent, consumed on accept).
    pub kind: String,

    /// "PENDING", "CONNECTED" or "USED". Expiry is derived from `expires_at`
    /// at read time and never written back to this column.
    pub status: String,

    pub dependent_id: Option<i32>,

    pub caregiver_id: Option<i32>,

    /// One-time secret traded for a dependent bearer token. Cleared the
    /// moment it is consumed so the exchange can never repeat.
    pub exchange_code: Option<String>,

    pub used_by: Option<i32>,

    pub connected_at: Option<String>,

    pub expires_at: String,

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
}

impl Related<super::dependents::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Dependents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
