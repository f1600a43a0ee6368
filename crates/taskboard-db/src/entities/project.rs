//! Project entity: the container for lists, tasks and chatrooms

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// User who created the project (first admin member)
    pub created_by: Uuid,

    /// Highest list position ever handed out in this project.
    /// Positions are never reused, even after the list holding it is deleted.
    pub last_list_position: i32,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Creator,

    #[sea_orm(has_many = "super::project_member::Entity")]
    Members,

    #[sea_orm(has_many = "super::list::Entity")]
    Lists,

    #[sea_orm(has_many = "super::chatroom::Entity")]
    Chatrooms,
}

impl Related<super::project_member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl Related<super::list::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lists.def()
    }
}

impl Related<super::chatroom::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chatrooms.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
