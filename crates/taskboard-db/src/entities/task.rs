//! Task entity
//!
//! Steps, labels, comments and file attachments are embedded in the task row
//! as JSON arrays; they have no table of their own and are always read and
//! written together with their task.

use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum TaskStatus {
    #[sea_orm(string_value = "todo")]
    Todo,

    #[sea_orm(string_value = "in_progress")]
    InProgress,

    #[sea_orm(string_value = "done")]
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum TaskPriority {
    #[sea_orm(string_value = "low")]
    Low,

    #[sea_orm(string_value = "medium")]
    Medium,

    #[sea_orm(string_value = "high")]
    High,
}

/// A checklist item inside a task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub title: String,
    pub completed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub user_id: Uuid,
    pub text: String,
    pub created_at: ChronoDateTimeUtc,
}

/// Attachment metadata; the file itself lives wherever `url` points
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub url: String,
    pub uploaded_at: ChronoDateTimeUtc,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Steps(pub Vec<Step>);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Labels(pub Vec<Label>);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Comments(pub Vec<Comment>);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Attachments(pub Vec<Attachment>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub list_id: Uuid,

    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub status: TaskStatus,

    pub priority: TaskPriority,

    /// Assignee (nulled if the user is removed)
    pub assigned_to: Option<Uuid>,

    pub created_by: Uuid,

    pub start_date: Option<ChronoDateTimeUtc>,

    pub due_date: Option<ChronoDateTimeUtc>,

    #[sea_orm(column_type = "Json")]
    pub steps: Steps,

    #[sea_orm(column_type = "Json")]
    pub labels: Labels,

    #[sea_orm(column_type = "Json")]
    pub comments: Comments,

    #[sea_orm(column_type = "Json")]
    pub files: Attachments,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::list::Entity",
        from = "Column::ListId",
        to = "super::list::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    List,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::AssignedTo",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "SetNull"
    )]
    Assignee,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Creator,
}

impl Related<super::list::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::List.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Pick an id for a new embedded sub-entity.
///
/// A client-supplied id is kept as is. Otherwise the id is the current Unix
/// time in milliseconds, with a `-N` suffix when another item of the same
/// collection already uses it.
pub fn embedded_id<'a>(
    requested: Option<String>,
    existing: impl Iterator<Item = &'a str> + Clone,
) -> String {
    if let Some(id) = requested.filter(|id| !id.trim().is_empty()) {
        return id;
    }

    let base = chrono::Utc::now().timestamp_millis().to_string();
    if !existing.clone().any(|id| id == base) {
        return base;
    }

    (1..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !existing.clone().any(|id| id == candidate))
        .unwrap_or(base)
}
