use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "calls")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub dependent_id: i32,

    pub voice_session_id: Option<i32>,

    /// "SCHEDULED", "RINGING", "CONNECTED", "COMPLETED", "FAILED" or "CANCELLED"
    pub status: String,

    pub question_audio_path: String,

    pub answer_audio_path: String,

    pub risk_score: Option<f32>,

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
    #[sea_orm(
        belongs_to = "super::voice_sessions::Entity",
        from = "Column::VoiceSessionId",
        to = "super::voice_sessions::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    VoiceSessions,
}

impl Related<super::dependents::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Dependents.def()
    }
}

impl Related<super::voice_sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VoiceSessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
