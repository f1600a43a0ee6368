use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use taskboard_db::entities::{chatroom, chatroom_member, notification, project, project_member, user};

use super::{
    bad_request, db_error, load_profiles, not_found, project_for_admin, project_for_member,
    required_text, ApiResult,
};
use crate::middleware::AuthUser;
use crate::models::*;
use crate::AppState;

/// Members of each project, oldest first, with profiles
async fn members_by_project(
    state: &AppState,
    project_ids: &[Uuid],
) -> ApiResult<HashMap<Uuid, Vec<ProjectMember>>> {
    if project_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = project_member::Entity::find()
        .filter(project_member::Column::ProjectId.is_in(project_ids.to_vec()))
        .order_by_asc(project_member::Column::JoinedAt)
        .all(&state.db)
        .await
        .map_err(db_error)?;

    let profiles = load_profiles(state, rows.iter().map(|m| m.user_id)).await?;

    let mut grouped: HashMap<Uuid, Vec<ProjectMember>> = HashMap::new();
    for row in rows {
        if let Some(profile) = profiles.get(&row.user_id) {
            grouped.entry(row.project_id).or_default().push(ProjectMember {
                user: profile.clone(),
                role: row.role.into(),
                joined_at: row.joined_at,
            });
        }
    }

    Ok(grouped)
}

async fn project_view(state: &AppState, model: project::Model) -> ApiResult<Project> {
    let mut members = members_by_project(state, &[model.id]).await?;
    let members = members.remove(&model.id).unwrap_or_default();
    Ok(Project::from_model(model, members))
}

/// List projects the caller belongs to
#[utoipa::path(
    get,
    path = "/api/projects",
    params(
        ("q" = Option<String>, Query, description = "Filter by name or description")
    ),
    responses(
        (status = 200, description = "Projects of the current user", body = ProjectList),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Query(filter): Query<FilterQuery>,
) -> ApiResult<Json<ProjectList>> {
    debug!("Listing projects for user {}", auth_user.user_id);

    let project_ids: Vec<Uuid> = project_member::Entity::find()
        .select_only()
        .column(project_member::Column::ProjectId)
        .filter(project_member::Column::UserId.eq(auth_user.user_id))
        .into_tuple()
        .all(&state.db)
        .await
        .map_err(db_error)?;

    if project_ids.is_empty() {
        return Ok(Json(ProjectList {
            projects: Vec::new(),
            total: 0,
        }));
    }

    let mut models = project::Entity::find()
        .filter(project::Column::Id.is_in(project_ids))
        .order_by_desc(project::Column::UpdatedAt)
        .all(&state.db)
        .await
        .map_err(db_error)?;

    if let Some(needle) = filter.needle() {
        models.retain(|p| {
            matches_needle(&needle, &[Some(p.name.as_str()), p.description.as_deref()])
        });
    }

    let ids: Vec<Uuid> = models.iter().map(|p| p.id).collect();
    let mut members = members_by_project(&state, &ids).await?;

    let projects: Vec<Project> = models
        .into_iter()
        .map(|p| {
            let m = members.remove(&p.id).unwrap_or_default();
            Project::from_model(p, m)
        })
        .collect();

    let total = projects.len();
    Ok(Json(ProjectList { projects, total }))
}

/// Create a project; the caller becomes its admin
#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let name = required_text(&req.name, "name")?;
    let now = Utc::now();

    let txn = state.db.begin().await.map_err(db_error)?;

    let created = project::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        description: Set(req.description.filter(|d| !d.trim().is_empty())),
        created_by: Set(auth_user.user_id),
        last_list_position: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await
    .map_err(db_error)?;

    project_member::ActiveModel {
        project_id: Set(created.id),
        user_id: Set(auth_user.user_id),
        role: Set(project_member::ProjectRole::Admin),
        joined_at: Set(now),
    }
    .insert(&txn)
    .await
    .map_err(db_error)?;

    txn.commit().await.map_err(db_error)?;

    info!("User {} created project {}", auth_user.user_id, created.id);

    let view = project_view(&state, created).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Get a project with its members
#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    params(
        ("id" = Uuid, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Project information", body = Project),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    let (found, _) = project_for_member(&state, id, auth_user.user_id).await?;
    Ok(Json(project_view(&state, found).await?))
}

/// Update a project's name or description (admins only)
#[utoipa::path(
    patch,
    path = "/api/projects/{id}",
    params(
        ("id" = Uuid, Path, description = "Project ID")
    ),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Updated project", body = Project),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Not an admin of the project", body = ErrorResponse),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn update_project(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    let found = project_for_admin(&state, id, auth_user.user_id).await?;
    let mut active: project::ActiveModel = found.into();

    if let Some(name) = req.name {
        active.name = Set(required_text(&name, "name")?);
    }
    if let Some(description) = req.description {
        active.description = Set(description.filter(|d| !d.trim().is_empty()));
    }
    active.updated_at = Set(Utc::now());

    let updated = active.update(&state.db).await.map_err(db_error)?;
    info!("Updated project {}", id);

    Ok(Json(project_view(&state, updated).await?))
}

/// Delete a project and everything scoped to it (admins only)
#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    params(
        ("id" = Uuid, Path, description = "Project ID")
    ),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 403, description = "Not an admin of the project", body = ErrorResponse),
        (status = 404, description = "Project not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    project_for_admin(&state, id, auth_user.user_id).await?;
    let room_ids = project_room_ids(&state, id).await?;

    let report = taskboard_db::delete_project(&state.db, id)
        .await
        .map_err(|e| match e {
            DbErr::RecordNotFound(_) => not_found("Project", id),
            other => db_error(other),
        })?;

    info!(
        "Deleted project {} ({} lists, {} tasks, {} chatrooms, {} messages)",
        id, report.lists, report.tasks, report.chatrooms, report.messages
    );

    state.hub.close_rooms(&room_ids).await;

    Ok(StatusCode::NO_CONTENT)
}

async fn project_room_ids(state: &AppState, project_id: Uuid) -> ApiResult<Vec<Uuid>> {
    chatroom::Entity::find()
        .select_only()
        .column(chatroom::Column::Id)
        .filter(chatroom::Column::ProjectId.eq(project_id))
        .into_tuple()
        .all(&state.db)
        .await
        .map_err(db_error)
}

/// Add a member to a project (admins only)
#[utoipa::path(
    post,
    path = "/api/projects/{id}/members",
    params(
        ("id" = Uuid, Path, description = "Project ID")
    ),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added; returns the project", body = Project),
        (status = 400, description = "User is already a member", body = ErrorResponse),
        (status = 403, description = "Not an admin of the project", body = ErrorResponse),
        (status = 404, description = "Project or user not found", body = ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let found = project_for_admin(&state, id, auth_user.user_id).await?;

    let invitee = user::Entity::find_by_id(req.user_id)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("User", req.user_id))?;

    let existing = project_member::Entity::find_by_id((id, invitee.id))
        .one(&state.db)
        .await
        .map_err(db_error)?;
    if existing.is_some() {
        return Err(bad_request(
            "User is already a member of this project",
            "ALREADY_MEMBER",
        ));
    }

    let now = Utc::now();
    let role = req.role.unwrap_or(ProjectRole::Member);

    let txn = state.db.begin().await.map_err(db_error)?;

    project_member::ActiveModel {
        project_id: Set(id),
        user_id: Set(invitee.id),
        role: Set(role.into()),
        joined_at: Set(now),
    }
    .insert(&txn)
    .await
    .map_err(db_error)?;

    notification::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(invitee.id),
        project_id: Set(Some(id)),
        kind: Set(notification::NotificationKind::ProjectInvite),
        message: Set(format!("You were added to project '{}'", found.name)),
        is_read: Set(false),
        created_at: Set(now),
    }
    .insert(&txn)
    .await
    .map_err(db_error)?;

    txn.commit().await.map_err(db_error)?;

    info!("Added user {} to project {} as {:?}", invitee.id, id, role);

    Ok((StatusCode::CREATED, Json(project_view(&state, found).await?)))
}

/// Remove a member from a project (admins only)
///
/// The member's chatroom memberships inside the project go with it. The
/// last admin cannot be removed.
#[utoipa::path(
    delete,
    path = "/api/projects/{id}/members/{user_id}",
    params(
        ("id" = Uuid, Path, description = "Project ID"),
        ("user_id" = Uuid, Path, description = "Member to remove")
    ),
    responses(
        (status = 200, description = "Member removed; returns the project", body = Project),
        (status = 400, description = "Cannot remove the last admin", body = ErrorResponse),
        (status = 403, description = "Not an admin of the project", body = ErrorResponse),
        (status = 404, description = "Project or member not found", body = ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Project>> {
    let found = project_for_admin(&state, id, auth_user.user_id).await?;

    let member = project_member::Entity::find_by_id((id, user_id))
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("Member", user_id))?;

    if member.role == project_member::ProjectRole::Admin {
        let admins = project_member::Entity::find()
            .filter(project_member::Column::ProjectId.eq(id))
            .filter(project_member::Column::Role.eq(project_member::ProjectRole::Admin))
            .count(&state.db)
            .await
            .map_err(db_error)?;

        if admins <= 1 {
            return Err(bad_request(
                "A project must keep at least one admin",
                "LAST_ADMIN",
            ));
        }
    }

    let room_ids = project_room_ids(&state, id).await?;

    let txn = state.db.begin().await.map_err(db_error)?;

    if !room_ids.is_empty() {
        chatroom_member::Entity::delete_many()
            .filter(chatroom_member::Column::UserId.eq(user_id))
            .filter(chatroom_member::Column::ChatroomId.is_in(room_ids.iter().copied()))
            .exec(&txn)
            .await
            .map_err(db_error)?;
    }

    project_member::Entity::delete_by_id((id, user_id))
        .exec(&txn)
        .await
        .map_err(db_error)?;

    txn.commit().await.map_err(db_error)?;

    state.hub.revoke_rooms(user_id, &room_ids).await;

    info!("Removed user {} from project {}", user_id, id);

    Ok(Json(project_view(&state, found).await?))
}
