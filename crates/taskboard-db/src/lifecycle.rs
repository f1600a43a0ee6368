//! Multi-row operations that must not leave partial state behind
//!
//! Each function runs in its own transaction: cascading deletes remove the
//! dependents explicitly (children first) and roll back as a whole if any
//! step fails.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, QuerySelect,
    Set, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use crate::entities::{
    chat_message, chatroom, chatroom_member, list, notification, project, project_member, task,
};

/// Rows removed by [`delete_project`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectCascade {
    pub lists: u64,
    pub tasks: u64,
    pub chatrooms: u64,
    pub messages: u64,
    pub notifications: u64,
    pub members: u64,
}

/// Rows removed by [`delete_list`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListCascade {
    pub tasks: u64,
}

/// Create a list at the end of a project's columns.
///
/// The position is one past both the project's high-water mark and the
/// largest position currently in use, so positions only grow and a deleted
/// list's position is never handed out again. Returns
/// `DbErr::RecordNotFound` if the project does not exist.
pub async fn create_list<C>(db: &C, project_id: Uuid, title: String) -> Result<list::Model, DbErr>
where
    C: TransactionTrait,
{
    let txn = db.begin().await?;

    // Bump first: on PostgreSQL the UPDATE takes the row lock that serializes
    // concurrent list creation in the same project.
    let bumped = project::Entity::update_many()
        .col_expr(
            project::Column::LastListPosition,
            Expr::col(project::Column::LastListPosition).add(1),
        )
        .filter(project::Column::Id.eq(project_id))
        .exec(&txn)
        .await?;

    if bumped.rows_affected == 0 {
        return Err(DbErr::RecordNotFound(format!(
            "project {project_id} not found"
        )));
    }

    let project = project::Entity::find_by_id(project_id)
        .one(&txn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("project {project_id} not found")))?;

    let max_in_use: Option<i32> = list::Entity::find()
        .select_only()
        .column_as(list::Column::Position.max(), "max_position")
        .filter(list::Column::ProjectId.eq(project_id))
        .into_tuple::<Option<i32>>()
        .one(&txn)
        .await?
        .flatten();

    let mut position = project.last_list_position;
    if let Some(max) = max_in_use {
        if max >= position {
            position = max + 1;
            let mut active: project::ActiveModel = project.into();
            active.last_list_position = Set(position);
            active.update(&txn).await?;
        }
    }

    let now = Utc::now();
    let created = list::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(project_id),
        title: Set(title),
        position: Set(position),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    debug!(
        "Created list {} in project {} at position {}",
        created.id, project_id, position
    );

    Ok(created)
}

/// Delete a list and every task in it.
pub async fn delete_list<C>(db: &C, list_id: Uuid) -> Result<ListCascade, DbErr>
where
    C: TransactionTrait,
{
    let txn = db.begin().await?;

    let tasks = task::Entity::delete_many()
        .filter(task::Column::ListId.eq(list_id))
        .exec(&txn)
        .await?
        .rows_affected;

    let deleted = list::Entity::delete_by_id(list_id).exec(&txn).await?;
    if deleted.rows_affected == 0 {
        return Err(DbErr::RecordNotFound(format!("list {list_id} not found")));
    }

    txn.commit().await?;

    Ok(ListCascade { tasks })
}

/// Delete a project with its lists, tasks, chatrooms, messages,
/// memberships and project-scoped notifications.
pub async fn delete_project<C>(db: &C, project_id: Uuid) -> Result<ProjectCascade, DbErr>
where
    C: TransactionTrait,
{
    let txn = db.begin().await?;
    let mut report = ProjectCascade::default();

    let list_ids: Vec<Uuid> = list::Entity::find()
        .select_only()
        .column(list::Column::Id)
        .filter(list::Column::ProjectId.eq(project_id))
        .into_tuple()
        .all(&txn)
        .await?;

    if !list_ids.is_empty() {
        report.tasks = task::Entity::delete_many()
            .filter(task::Column::ListId.is_in(list_ids.clone()))
            .exec(&txn)
            .await?
            .rows_affected;
    }

    report.lists = list::Entity::delete_many()
        .filter(list::Column::ProjectId.eq(project_id))
        .exec(&txn)
        .await?
        .rows_affected;

    let room_ids: Vec<Uuid> = chatroom::Entity::find()
        .select_only()
        .column(chatroom::Column::Id)
        .filter(chatroom::Column::ProjectId.eq(project_id))
        .into_tuple()
        .all(&txn)
        .await?;

    if !room_ids.is_empty() {
        report.messages = chat_message::Entity::delete_many()
            .filter(chat_message::Column::ChatroomId.is_in(room_ids.clone()))
            .exec(&txn)
            .await?
            .rows_affected;

        chatroom_member::Entity::delete_many()
            .filter(chatroom_member::Column::ChatroomId.is_in(room_ids))
            .exec(&txn)
            .await?;
    }

    report.chatrooms = chatroom::Entity::delete_many()
        .filter(chatroom::Column::ProjectId.eq(project_id))
        .exec(&txn)
        .await?
        .rows_affected;

    report.notifications = notification::Entity::delete_many()
        .filter(notification::Column::ProjectId.eq(project_id))
        .exec(&txn)
        .await?
        .rows_affected;

    report.members = project_member::Entity::delete_many()
        .filter(project_member::Column::ProjectId.eq(project_id))
        .exec(&txn)
        .await?
        .rows_affected;

    let deleted = project::Entity::delete_by_id(project_id).exec(&txn).await?;
    if deleted.rows_affected == 0 {
        return Err(DbErr::RecordNotFound(format!(
            "project {project_id} not found"
        )));
    }

    txn.commit().await?;

    Ok(report)
}
