//! ChatMessage entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Maximum number of messages returned when loading a room's history
pub const HISTORY_LIMIT: u64 = 100;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chat_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub chatroom_id: Uuid,

    pub sender_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub text: String,

    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::chatroom::Entity",
        from = "Column::ChatroomId",
        to = "super::chatroom::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Chatroom,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::SenderId",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Sender,
}

impl Related<super::chatroom::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chatroom.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sender.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
