//! Task endpoints, including the embedded steps, labels, comments and files
//!
//! Embedded items are edited by rewriting the owning task row; concurrent
//! edits to the same task are last-write-wins.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use taskboard_db::entities::{list, notification, task};

use super::{
    bad_request, db_error, forbidden, list_for_member, load_profiles, membership, not_found,
    required_text, task_for_member, ApiResult,
};
use crate::middleware::AuthUser;
use crate::models::*;
use crate::AppState;

fn to_view(model: task::Model, profiles: &HashMap<Uuid, UserProfile>) -> Task {
    let assignee = model.assigned_to.and_then(|id| profiles.get(&id).cloned());

    Task {
        id: model.id,
        list_id: model.list_id,
        title: model.title,
        description: model.description,
        status: model.status.into(),
        priority: model.priority.into(),
        assigned_to: model.assigned_to,
        assignee,
        created_by: model.created_by,
        start_date: model.start_date,
        due_date: model.due_date,
        steps: model.steps.0.into_iter().map(Step::from).collect(),
        labels: model.labels.0.into_iter().map(Label::from).collect(),
        comments: model
            .comments
            .0
            .into_iter()
            .map(|c| Comment {
                author: profiles.get(&c.user_id).cloned(),
                id: c.id,
                user_id: c.user_id,
                text: c.text,
                created_at: c.created_at,
            })
            .collect(),
        files: model.files.0.into_iter().map(Attachment::from).collect(),
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn referenced_users(model: &task::Model) -> impl Iterator<Item = Uuid> + '_ {
    model
        .assigned_to
        .into_iter()
        .chain(model.comments.0.iter().map(|c| c.user_id))
}

async fn task_views(state: &AppState, models: Vec<task::Model>) -> ApiResult<Vec<Task>> {
    let profiles = load_profiles(state, models.iter().flat_map(referenced_users)).await?;
    Ok(models.into_iter().map(|m| to_view(m, &profiles)).collect())
}

async fn task_view(state: &AppState, model: task::Model) -> ApiResult<Task> {
    let profiles = load_profiles(state, referenced_users(&model)).await?;
    Ok(to_view(model, &profiles))
}

/// Assignees must belong to the task's project
async fn ensure_assignable(state: &AppState, project_id: Uuid, user_id: Uuid) -> ApiResult<()> {
    if membership(state, project_id, user_id).await?.is_none() {
        return Err(bad_request(
            "Assignee must be a member of the project",
            "ASSIGNEE_NOT_MEMBER",
        ));
    }
    Ok(())
}

async fn notify_assignment<C: ConnectionTrait>(
    db: &C,
    assigned: &task::Model,
    project_id: Uuid,
) -> ApiResult<()> {
    let Some(assignee) = assigned.assigned_to else {
        return Ok(());
    };

    notification::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(assignee),
        project_id: Set(Some(project_id)),
        kind: Set(notification::NotificationKind::TaskAssigned),
        message: Set(format!("You were assigned to task '{}'", assigned.title)),
        is_read: Set(false),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .map_err(db_error)?;

    debug!("Notified user {} of assignment to {}", assignee, assigned.id);
    Ok(())
}

/// Persist an edited task and return its view
async fn save(state: &AppState, mut active: task::ActiveModel) -> ApiResult<Task> {
    active.updated_at = Set(Utc::now());
    let updated = active.update(&state.db).await.map_err(db_error)?;
    task_view(state, updated).await
}

/// List the tasks of a list
#[utoipa::path(
    get,
    path = "/api/tasks/list/{list_id}",
    params(
        ("list_id" = Uuid, Path, description = "List ID"),
        ("q" = Option<String>, Query, description = "Filter by title, description or label")
    ),
    responses(
        (status = 200, description = "Tasks of the list", body = TaskCollection),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "List not found", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(list_id): Path<Uuid>,
    Query(filter): Query<FilterQuery>,
) -> ApiResult<Json<TaskCollection>> {
    list_for_member(&state, list_id, auth_user.user_id).await?;
    debug!("Listing tasks of list {}", list_id);

    let mut models = task::Entity::find()
        .filter(task::Column::ListId.eq(list_id))
        .order_by_asc(task::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(db_error)?;

    if let Some(needle) = filter.needle() {
        models.retain(|t| {
            let mut fields = vec![Some(t.title.as_str()), t.description.as_deref()];
            fields.extend(t.labels.0.iter().map(|l| Some(l.name.as_str())));
            matches_needle(&needle, &fields)
        });
    }

    let tasks = task_views(&state, models).await?;
    let total = tasks.len();

    Ok(Json(TaskCollection { tasks, total }))
}

/// Create a task in a list
#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "List not found", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let title = required_text(&req.title, "title")?;
    let parent = list_for_member(&state, req.list_id, auth_user.user_id).await?;

    if let Some(assignee) = req.assigned_to {
        ensure_assignable(&state, parent.project_id, assignee).await?;
    }

    let now = Utc::now();
    let created = task::ActiveModel {
        id: Set(Uuid::new_v4()),
        list_id: Set(parent.id),
        title: Set(title),
        description: Set(req.description.filter(|d| !d.trim().is_empty())),
        status: Set(req.status.unwrap_or(TaskStatus::Todo).into()),
        priority: Set(req.priority.unwrap_or(TaskPriority::Medium).into()),
        assigned_to: Set(req.assigned_to),
        created_by: Set(auth_user.user_id),
        start_date: Set(req.start_date),
        due_date: Set(req.due_date),
        steps: Set(task::Steps::default()),
        labels: Set(task::Labels::default()),
        comments: Set(task::Comments::default()),
        files: Set(task::Attachments::default()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.db)
    .await
    .map_err(db_error)?;

    if created.assigned_to.is_some_and(|a| a != auth_user.user_id) {
        notify_assignment(&state.db, &created, parent.project_id).await?;
    }

    info!("Created task {} in list {}", created.id, parent.id);

    Ok((StatusCode::CREATED, Json(task_view(&state, created).await?)))
}

/// Get a task
#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task information", body = Task),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let (found, _) = task_for_member(&state, id, auth_user.user_id).await?;
    Ok(Json(task_view(&state, found).await?))
}

/// Partially update a task
#[utoipa::path(
    patch,
    path = "/api/tasks/{id}",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Updated task", body = Task),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "Task or target list not found", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let (found, parent) = task_for_member(&state, id, auth_user.user_id).await?;
    let previous_assignee = found.assigned_to;
    let mut active: task::ActiveModel = found.into();

    if let Some(list_id) = req.list_id.filter(|l| *l != parent.id) {
        let target = list::Entity::find_by_id(list_id)
            .one(&state.db)
            .await
            .map_err(db_error)?
            .ok_or_else(|| not_found("List", list_id))?;
        if target.project_id != parent.project_id {
            return Err(bad_request(
                "Tasks can only move between lists of the same project",
                "INVALID_LIST",
            ));
        }
        active.list_id = Set(list_id);
    }
    if let Some(title) = req.title {
        active.title = Set(required_text(&title, "title")?);
    }
    if let Some(description) = req.description {
        active.description = Set(description.filter(|d| !d.trim().is_empty()));
    }
    if let Some(status) = req.status {
        active.status = Set(status.into());
    }
    if let Some(priority) = req.priority {
        active.priority = Set(priority.into());
    }
    if let Some(assigned_to) = req.assigned_to {
        if let Some(assignee) = assigned_to {
            ensure_assignable(&state, parent.project_id, assignee).await?;
        }
        active.assigned_to = Set(assigned_to);
    }
    if let Some(start_date) = req.start_date {
        active.start_date = Set(start_date);
    }
    if let Some(due_date) = req.due_date {
        active.due_date = Set(due_date);
    }
    active.updated_at = Set(Utc::now());

    let updated = active.update(&state.db).await.map_err(db_error)?;

    let newly_assigned = updated.assigned_to.is_some() && updated.assigned_to != previous_assignee;
    if newly_assigned && updated.assigned_to != Some(auth_user.user_id) {
        notify_assignment(&state.db, &updated, parent.project_id).await?;
    }

    info!("Updated task {}", id);

    Ok(Json(task_view(&state, updated).await?))
}

/// Delete a task
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    task_for_member(&state, id, auth_user.user_id).await?;

    let result = task::Entity::delete_by_id(id)
        .exec(&state.db)
        .await
        .map_err(db_error)?;
    if result.rows_affected == 0 {
        return Err(not_found("Task", id));
    }

    info!("Deleted task {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Add a step to a task
#[utoipa::path(
    post,
    path = "/api/tasks/{id}/steps",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    request_body = AddStepRequest,
    responses(
        (status = 201, description = "Step added; returns the task", body = Task),
        (status = 400, description = "Invalid input or duplicate id", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn add_step(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddStepRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let title = required_text(&req.title, "title")?;
    let (found, _) = task_for_member(&state, id, auth_user.user_id).await?;

    let mut steps = found.steps.clone();
    let step_id = unique_id(req.id, steps.0.iter().map(|s| s.id.as_str()))?;
    steps.0.push(task::Step {
        id: step_id,
        title,
        completed: req.completed,
    });

    let mut active: task::ActiveModel = found.into();
    active.steps = Set(steps);

    Ok((StatusCode::CREATED, Json(save(&state, active).await?)))
}

/// Update a step's title or completion
#[utoipa::path(
    patch,
    path = "/api/tasks/{id}/steps/{step_id}",
    params(
        ("id" = Uuid, Path, description = "Task ID"),
        ("step_id" = String, Path, description = "Step ID")
    ),
    request_body = UpdateStepRequest,
    responses(
        (status = 200, description = "Step updated; returns the task", body = Task),
        (status = 404, description = "Task or step not found", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn update_step(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path((id, step_id)): Path<(Uuid, String)>,
    Json(req): Json<UpdateStepRequest>,
) -> ApiResult<Json<Task>> {
    let (found, _) = task_for_member(&state, id, auth_user.user_id).await?;

    let mut steps = found.steps.clone();
    let step = steps
        .0
        .iter_mut()
        .find(|s| s.id == step_id)
        .ok_or_else(|| not_found("Step", &step_id))?;

    if let Some(title) = req.title {
        step.title = required_text(&title, "title")?;
    }
    if let Some(completed) = req.completed {
        step.completed = completed;
    }

    let mut active: task::ActiveModel = found.into();
    active.steps = Set(steps);

    Ok(Json(save(&state, active).await?))
}

/// Remove a step
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}/steps/{step_id}",
    params(
        ("id" = Uuid, Path, description = "Task ID"),
        ("step_id" = String, Path, description = "Step ID")
    ),
    responses(
        (status = 200, description = "Step removed; returns the task", body = Task),
        (status = 404, description = "Task or step not found", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn delete_step(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path((id, step_id)): Path<(Uuid, String)>,
) -> ApiResult<Json<Task>> {
    let (found, _) = task_for_member(&state, id, auth_user.user_id).await?;

    let mut steps = found.steps.clone();
    let before = steps.0.len();
    steps.0.retain(|s| s.id != step_id);
    if steps.0.len() == before {
        return Err(not_found("Step", step_id));
    }

    let mut active: task::ActiveModel = found.into();
    active.steps = Set(steps);

    Ok(Json(save(&state, active).await?))
}

/// Add a label to a task
#[utoipa::path(
    post,
    path = "/api/tasks/{id}/labels",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    request_body = AddLabelRequest,
    responses(
        (status = 201, description = "Label added; returns the task", body = Task),
        (status = 400, description = "Invalid input or duplicate id", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn add_label(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddLabelRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let name = required_text(&req.name, "name")?;
    let (found, _) = task_for_member(&state, id, auth_user.user_id).await?;

    let mut labels = found.labels.clone();
    let label_id = unique_id(req.id, labels.0.iter().map(|l| l.id.as_str()))?;
    labels.0.push(task::Label {
        id: label_id,
        name,
        color: req.color.filter(|c| !c.trim().is_empty()),
    });

    let mut active: task::ActiveModel = found.into();
    active.labels = Set(labels);

    Ok((StatusCode::CREATED, Json(save(&state, active).await?)))
}

/// Remove a label
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}/labels/{label_id}",
    params(
        ("id" = Uuid, Path, description = "Task ID"),
        ("label_id" = String, Path, description = "Label ID")
    ),
    responses(
        (status = 200, description = "Label removed; returns the task", body = Task),
        (status = 404, description = "Task or label not found", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn delete_label(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path((id, label_id)): Path<(Uuid, String)>,
) -> ApiResult<Json<Task>> {
    let (found, _) = task_for_member(&state, id, auth_user.user_id).await?;

    let mut labels = found.labels.clone();
    let before = labels.0.len();
    labels.0.retain(|l| l.id != label_id);
    if labels.0.len() == before {
        return Err(not_found("Label", label_id));
    }

    let mut active: task::ActiveModel = found.into();
    active.labels = Set(labels);

    Ok(Json(save(&state, active).await?))
}

/// Comment on a task
#[utoipa::path(
    post,
    path = "/api/tasks/{id}/comments",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    request_body = AddCommentRequest,
    responses(
        (status = 201, description = "Comment added; returns the task", body = Task),
        (status = 400, description = "Invalid input or duplicate id", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddCommentRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let text = required_text(&req.text, "text")?;
    let (found, _) = task_for_member(&state, id, auth_user.user_id).await?;

    let mut comments = found.comments.clone();
    let comment_id = unique_id(req.id, comments.0.iter().map(|c| c.id.as_str()))?;
    comments.0.push(task::Comment {
        id: comment_id,
        user_id: auth_user.user_id,
        text,
        created_at: Utc::now(),
    });

    let mut active: task::ActiveModel = found.into();
    active.comments = Set(comments);

    Ok((StatusCode::CREATED, Json(save(&state, active).await?)))
}

/// Delete one of your own comments
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}/comments/{comment_id}",
    params(
        ("id" = Uuid, Path, description = "Task ID"),
        ("comment_id" = String, Path, description = "Comment ID")
    ),
    responses(
        (status = 200, description = "Comment removed; returns the task", body = Task),
        (status = 403, description = "Not the comment's author", body = ErrorResponse),
        (status = 404, description = "Task or comment not found", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path((id, comment_id)): Path<(Uuid, String)>,
) -> ApiResult<Json<Task>> {
    let (found, _) = task_for_member(&state, id, auth_user.user_id).await?;

    let mut comments = found.comments.clone();
    let position = comments
        .0
        .iter()
        .position(|c| c.id == comment_id)
        .ok_or_else(|| not_found("Comment", &comment_id))?;

    if comments.0[position].user_id != auth_user.user_id {
        return Err(forbidden(
            "Only the author can delete a comment",
            "NOT_COMMENT_AUTHOR",
        ));
    }
    comments.0.remove(position);

    let mut active: task::ActiveModel = found.into();
    active.comments = Set(comments);

    Ok(Json(save(&state, active).await?))
}

/// Attach a file reference to a task
#[utoipa::path(
    post,
    path = "/api/tasks/{id}/files",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    request_body = AddFileRequest,
    responses(
        (status = 201, description = "File attached; returns the task", body = Task),
        (status = 400, description = "Invalid input or duplicate id", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn add_file(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddFileRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let name = required_text(&req.name, "name")?;
    let url = required_text(&req.url, "url")?;
    let (found, _) = task_for_member(&state, id, auth_user.user_id).await?;

    let mut files = found.files.clone();
    let file_id = unique_id(req.id, files.0.iter().map(|f| f.id.as_str()))?;
    files.0.push(task::Attachment {
        id: file_id,
        name,
        url,
        uploaded_at: Utc::now(),
    });

    let mut active: task::ActiveModel = found.into();
    active.files = Set(files);

    Ok((StatusCode::CREATED, Json(save(&state, active).await?)))
}

/// Id for a new embedded item; a client-supplied id must not clash
fn unique_id<'a>(
    requested: Option<String>,
    existing: impl Iterator<Item = &'a str> + Clone,
) -> ApiResult<String> {
    let requested = requested.map(|id| id.trim().to_string());
    if let Some(id) = requested.as_deref().filter(|id| !id.is_empty()) {
        if existing.clone().any(|e| e == id) {
            return Err(bad_request(
                format!("An item with id '{}' already exists on this task", id),
                "DUPLICATE_ID",
            ));
        }
    }

    Ok(task::embedded_id(requested, existing))
}
