use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use taskboard_db::entities::{notification, user};

use super::{
    bad_request, db_error, membership, not_found, project_for_member, required_text, ApiResult,
};
use crate::middleware::AuthUser;
use crate::models::*;
use crate::AppState;

/// A notification owned by the caller; other users' notifications are
/// reported as missing
async fn owned_notification(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
) -> ApiResult<notification::Model> {
    notification::Entity::find_by_id(id)
        .filter(notification::Column::UserId.eq(user_id))
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("Notification", id))
}

/// List the caller's notifications, newest first
#[utoipa::path(
    get,
    path = "/api/notifications",
    params(
        ("unread_only" = Option<bool>, Query, description = "Only unread notifications")
    ),
    responses(
        (status = 200, description = "Notifications", body = NotificationList),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<NotificationList>> {
    debug!("Listing notifications for user {}", auth_user.user_id);

    let mut select =
        notification::Entity::find().filter(notification::Column::UserId.eq(auth_user.user_id));
    if query.unread_only {
        select = select.filter(notification::Column::IsRead.eq(false));
    }

    let notifications: Vec<Notification> = select
        .order_by_desc(notification::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(db_error)?
        .into_iter()
        .map(Notification::from)
        .collect();

    let unread = notification::Entity::find()
        .filter(notification::Column::UserId.eq(auth_user.user_id))
        .filter(notification::Column::IsRead.eq(false))
        .count(&state.db)
        .await
        .map_err(db_error)?;

    let total = notifications.len();
    Ok(Json(NotificationList {
        notifications,
        total,
        unread,
    }))
}

/// Create a notification for yourself or a fellow project member
#[utoipa::path(
    post,
    path = "/api/notifications",
    request_body = CreateNotificationRequest,
    responses(
        (status = 201, description = "Notification created", body = Notification),
        (status = 400, description = "Invalid input or recipient", body = ErrorResponse),
        (status = 403, description = "Not a member of the project", body = ErrorResponse),
        (status = 404, description = "Recipient or project not found", body = ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateNotificationRequest>,
) -> ApiResult<(StatusCode, Json<Notification>)> {
    let message = required_text(&req.message, "message")?;
    let recipient = req.user_id.unwrap_or(auth_user.user_id);

    if recipient != auth_user.user_id {
        user::Entity::find_by_id(recipient)
            .one(&state.db)
            .await
            .map_err(db_error)?
            .ok_or_else(|| not_found("User", recipient))?;

        // Notifying someone else needs a shared project
        let project_id = req.project_id.ok_or_else(|| {
            bad_request(
                "'project_id' is required when notifying another user",
                "PROJECT_REQUIRED",
            )
        })?;
        if membership(&state, project_id, recipient).await?.is_none() {
            return Err(bad_request(
                "Recipient is not a member of the project",
                "RECIPIENT_NOT_MEMBER",
            ));
        }
    }

    if let Some(project_id) = req.project_id {
        project_for_member(&state, project_id, auth_user.user_id).await?;
    }

    let created = notification::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(recipient),
        project_id: Set(req.project_id),
        kind: Set(req.kind.unwrap_or(NotificationKind::General).into()),
        message: Set(message),
        is_read: Set(false),
        created_at: Set(Utc::now()),
    }
    .insert(&state.db)
    .await
    .map_err(db_error)?;

    info!("Created notification {} for user {}", created.id, recipient);

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Mark every unread notification of the caller as read
#[utoipa::path(
    patch,
    path = "/api/notifications/read-all",
    responses(
        (status = 200, description = "Number of notifications changed", body = MarkAllReadResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<MarkAllReadResponse>> {
    let result = notification::Entity::update_many()
        .col_expr(notification::Column::IsRead, Expr::value(true))
        .filter(notification::Column::UserId.eq(auth_user.user_id))
        .filter(notification::Column::IsRead.eq(false))
        .exec(&state.db)
        .await
        .map_err(db_error)?;

    info!(
        "Marked {} notifications read for user {}",
        result.rows_affected, auth_user.user_id
    );

    Ok(Json(MarkAllReadResponse {
        updated: result.rows_affected,
    }))
}

/// Mark one notification as read
#[utoipa::path(
    patch,
    path = "/api/notifications/{id}/read",
    params(
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Updated notification", body = Notification),
        (status = 404, description = "Notification not found", body = ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    let found = owned_notification(&state, id, auth_user.user_id).await?;
    if found.is_read {
        return Ok(Json(found.into()));
    }

    let mut active: notification::ActiveModel = found.into();
    active.is_read = Set(true);
    let updated = active.update(&state.db).await.map_err(db_error)?;

    Ok(Json(updated.into()))
}

/// Delete a notification
#[utoipa::path(
    delete,
    path = "/api/notifications/{id}",
    params(
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 204, description = "Notification deleted"),
        (status = 404, description = "Notification not found", body = ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    owned_notification(&state, id, auth_user.user_id).await?;

    notification::Entity::delete_by_id(id)
        .exec(&state.db)
        .await
        .map_err(db_error)?;

    info!("Deleted notification {}", id);
    Ok(StatusCode::NO_CONTENT)
}
