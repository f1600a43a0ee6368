//! Request handlers, one module per resource
//!
//! Every handler returns `Result<_, (StatusCode, Json<ErrorResponse>)>`.
//! The helpers below build those errors and perform the membership checks
//! shared by the project-scoped resources.

pub mod auth;
pub mod chat;
pub mod lists;
pub mod notifications;
pub mod projects;
pub mod realtime;
pub mod tasks;

use axum::{extract::State, http::StatusCode, Json};
use sea_orm::{ColumnTrait, DbErr, EntityTrait, QueryFilter};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use taskboard_db::entities::{list, project, project_member, task, user};

use crate::models::{ErrorResponse, HealthResponse, UserProfile};
use crate::AppState;

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<T, ApiError>;

pub(crate) fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: Some(code.to_string()),
        }),
    )
}

/// Storage fault: 500 with the raw driver message
pub(crate) fn db_error(e: DbErr) -> ApiError {
    error!("Database error: {}", e);
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Database error: {}", e),
        "DATABASE_ERROR",
    )
}

pub(crate) fn not_found(resource: &str, id: impl std::fmt::Display) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        format!("{} '{}' not found", resource, id),
        &format!("{}_NOT_FOUND", resource.to_uppercase()),
    )
}

pub(crate) fn bad_request(error: impl Into<String>, code: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, error, code)
}

pub(crate) fn forbidden(error: impl Into<String>, code: &str) -> ApiError {
    api_error(StatusCode::FORBIDDEN, error, code)
}

/// Trimmed, non-empty text field or a 400
pub(crate) fn required_text(value: &str, field: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(bad_request(
            format!("'{}' must not be empty", field),
            "INVALID_INPUT",
        ));
    }
    Ok(trimmed.to_string())
}

/// Membership row of `user_id` in `project_id`, if any
pub(crate) async fn membership(
    state: &AppState,
    project_id: Uuid,
    user_id: Uuid,
) -> ApiResult<Option<project_member::Model>> {
    project_member::Entity::find_by_id((project_id, user_id))
        .one(&state.db)
        .await
        .map_err(db_error)
}

/// Load a project the caller belongs to.
///
/// 404 if the project does not exist, 403 `NOT_A_MEMBER` if the caller is
/// not one of its members.
pub(crate) async fn project_for_member(
    state: &AppState,
    project_id: Uuid,
    user_id: Uuid,
) -> ApiResult<(project::Model, project_member::Model)> {
    let project = project::Entity::find_by_id(project_id)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("Project", project_id))?;

    let member = membership(state, project_id, user_id)
        .await?
        .ok_or_else(|| {
            forbidden(
                "You are not a member of this project",
                "NOT_A_MEMBER",
            )
        })?;

    Ok((project, member))
}

/// Like [`project_for_member`] but also requires the `admin` role
pub(crate) async fn project_for_admin(
    state: &AppState,
    project_id: Uuid,
    user_id: Uuid,
) -> ApiResult<project::Model> {
    let (project, member) = project_for_member(state, project_id, user_id).await?;

    if member.role != project_member::ProjectRole::Admin {
        return Err(forbidden(
            "Only project admins can perform this action",
            "ADMIN_REQUIRED",
        ));
    }

    Ok(project)
}

/// Load a list whose project the caller belongs to
pub(crate) async fn list_for_member(
    state: &AppState,
    list_id: Uuid,
    user_id: Uuid,
) -> ApiResult<list::Model> {
    let list = list::Entity::find_by_id(list_id)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("List", list_id))?;

    project_for_member(state, list.project_id, user_id).await?;

    Ok(list)
}

/// Load a task (and its list) whose project the caller belongs to
pub(crate) async fn task_for_member(
    state: &AppState,
    task_id: Uuid,
    user_id: Uuid,
) -> ApiResult<(task::Model, list::Model)> {
    let (task, list) = task::Entity::find_by_id(task_id)
        .find_also_related(list::Entity)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("Task", task_id))?;

    let list = list.ok_or_else(|| not_found("List", task.list_id))?;
    project_for_member(state, list.project_id, user_id).await?;

    Ok((task, list))
}

/// Public profiles for a set of user ids, keyed by id
pub(crate) async fn load_profiles(
    state: &AppState,
    ids: impl IntoIterator<Item = Uuid>,
) -> ApiResult<HashMap<Uuid, UserProfile>> {
    let mut ids: Vec<Uuid> = ids.into_iter().collect();
    ids.sort();
    ids.dedup();

    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let users = user::Entity::find()
        .filter(user::Column::Id.is_in(ids))
        .all(&state.db)
        .await
        .map_err(db_error)?;

    Ok(users
        .into_iter()
        .map(|u| (u.id, UserProfile::from(u)))
        .collect())
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        online_users: state.hub.online_users().await.len(),
    })
}
