use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use taskboard_db::entities::list;

use super::{
    bad_request, db_error, list_for_member, not_found, project_for_member, required_text,
    ApiResult,
};
use crate::middleware::AuthUser;
use crate::models::*;
use crate::AppState;

/// List the lists of a project, ordered by position
#[utoipa::path(
    get,
    path = "/api/lists/project/{project_id}",
    params(
        ("project_id" = Uuid, Path, description = "Project ID"),
        ("q" = Option<String>, Query, description = "Filter by title")
    ),
    responses(
        (status = 200, description = "Lists of the project", body = TaskListCollection),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "lists"
)]
pub async fn list_lists(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    Query(filter): Query<FilterQuery>,
) -> ApiResult<Json<TaskListCollection>> {
    project_for_member(&state, project_id, auth_user.user_id).await?;
    debug!("Listing lists of project {}", project_id);

    let mut models = list::Entity::find()
        .filter(list::Column::ProjectId.eq(project_id))
        .order_by_asc(list::Column::Position)
        .all(&state.db)
        .await
        .map_err(db_error)?;

    if let Some(needle) = filter.needle() {
        models.retain(|l| matches_needle(&needle, &[Some(l.title.as_str())]));
    }

    let lists: Vec<TaskList> = models.into_iter().map(TaskList::from).collect();
    let total = lists.len();

    Ok(Json(TaskListCollection { lists, total }))
}

/// Create a list at the end of a project
#[utoipa::path(
    post,
    path = "/api/lists",
    request_body = CreateListRequest,
    responses(
        (status = 201, description = "List created", body = TaskList),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "lists"
)]
pub async fn create_list(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateListRequest>,
) -> ApiResult<(StatusCode, Json<TaskList>)> {
    let title = required_text(&req.title, "title")?;
    project_for_member(&state, req.project_id, auth_user.user_id).await?;

    let created = taskboard_db::create_list(&state.db, req.project_id, title)
        .await
        .map_err(|e| match e {
            DbErr::RecordNotFound(_) => not_found("Project", req.project_id),
            other => db_error(other),
        })?;

    info!(
        "Created list {} in project {} at position {}",
        created.id, created.project_id, created.position
    );

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Get a list
#[utoipa::path(
    get,
    path = "/api/lists/{id}",
    params(
        ("id" = Uuid, Path, description = "List ID")
    ),
    responses(
        (status = 200, description = "List information", body = TaskList),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "List not found", body = ErrorResponse)
    ),
    tag = "lists"
)]
pub async fn get_list(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TaskList>> {
    let found = list_for_member(&state, id, auth_user.user_id).await?;
    Ok(Json(found.into()))
}

/// Rename or reposition a list
#[utoipa::path(
    patch,
    path = "/api/lists/{id}",
    params(
        ("id" = Uuid, Path, description = "List ID")
    ),
    request_body = UpdateListRequest,
    responses(
        (status = 200, description = "Updated list", body = TaskList),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "List not found", body = ErrorResponse)
    ),
    tag = "lists"
)]
pub async fn update_list(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateListRequest>,
) -> ApiResult<Json<TaskList>> {
    let found = list_for_member(&state, id, auth_user.user_id).await?;
    let mut active: list::ActiveModel = found.into();

    if let Some(title) = req.title {
        active.title = Set(required_text(&title, "title")?);
    }
    if let Some(position) = req.position {
        if position < 1 {
            return Err(bad_request(
                "'position' must be at least 1",
                "INVALID_INPUT",
            ));
        }
        active.position = Set(position);
    }
    active.updated_at = Set(Utc::now());

    let updated = active.update(&state.db).await.map_err(db_error)?;
    info!("Updated list {}", id);

    Ok(Json(updated.into()))
}

/// Delete a list and its tasks
#[utoipa::path(
    delete,
    path = "/api/lists/{id}",
    params(
        ("id" = Uuid, Path, description = "List ID")
    ),
    responses(
        (status = 204, description = "List deleted"),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "List not found", body = ErrorResponse)
    ),
    tag = "lists"
)]
pub async fn delete_list(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    list_for_member(&state, id, auth_user.user_id).await?;

    let report = taskboard_db::delete_list(&state.db, id)
        .await
        .map_err(|e| match e {
            DbErr::RecordNotFound(_) => not_found("List", id),
            other => db_error(other),
        })?;

    info!("Deleted list {} with {} tasks", id, report.tasks);

    Ok(StatusCode::NO_CONTENT)
}
