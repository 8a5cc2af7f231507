use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "dependents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Nullable: a dependent may be temporarily unlinked from any caregiver.
    /// Reassignment happens only through pairing-code acceptance.
    pub caregiver_id: Option<i32>,

    pub name: String,

    pub birth_date: Option<String>,

    /// "M", "F" or "U"
    pub sex: String,

    /// "HH:MM" local time preferred for check-in calls
    pub preferred_call_time: Option<String>,

    pub retry_count: i32,

    pub retry_interval_min: i32,

    /// Rolling score from the most recent analysis. -1.0 means "never analyzed".
    pub last_state: f32,

    pub last_exam_at: Option<String>,

    /// Base64-encoded representative artifact from the latest session.
    pub last_artifact: Option<String>,

    /// Soft-delete tombstone. Rows are never hard-deleted.
    pub deleted_at: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::CaregiverId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
