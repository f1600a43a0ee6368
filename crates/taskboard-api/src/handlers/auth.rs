//! Registration, login and profile endpoints

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    SqlErr,
};
use std::sync::Arc;
use taskboard_auth::{
    hash_password, validate_password_strength, verify_password, JwtClaims, JwtValidator,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use taskboard_db::entities::{project_member, user};

use super::{
    api_error, bad_request, db_error, forbidden, not_found, project_for_member, required_text,
    ApiError, ApiResult,
};
use crate::middleware::{auth::SESSION_COOKIE, AuthUser};
use crate::models::*;
use crate::AppState;

/// A concurrent registration can win the race past the duplicate check; the
/// unique email index then rejects the insert.
fn register_error(err: DbErr) -> ApiError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            bad_request("Email address already registered", "EMAIL_EXISTS")
        }
        _ => db_error(err),
    }
}

/// Upper bound on user search results
pub const SEARCH_LIMIT: usize = 20;

fn normalize_email(email: &str) -> ApiResult<String> {
    let email = email.trim().to_lowercase();

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !email.contains(' ')
        }
        None => false,
    };

    if !valid {
        return Err(bad_request(
            format!("Invalid email address '{}'", email),
            "INVALID_EMAIL",
        ));
    }

    Ok(email)
}

/// Sign a session token for `user`
fn issue_session(state: &AppState, user: &user::Model) -> ApiResult<(String, DateTime<Utc>)> {
    let claims = JwtClaims::session(
        user.id.to_string(),
        user.email.clone(),
        user.name.clone(),
        state.token_validity,
    );
    let expires_at = claims.expires_at();

    let token = JwtValidator::encode(state.jwt_secret.as_bytes(), &claims).map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to generate token: {}", e),
            "TOKEN_GENERATION_FAILED",
        )
    })?;

    Ok((token, expires_at))
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid input or email already registered", body = ErrorResponse),
        (status = 403, description = "Signup disabled", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    if !state.allow_signup {
        return Err(forbidden(
            "Public registration is disabled",
            "SIGNUP_DISABLED",
        ));
    }

    let email = normalize_email(&req.email)?;
    let name = required_text(&req.name, "name")?;

    validate_password_strength(&req.password)
        .map_err(|e| bad_request(e.to_string(), "WEAK_PASSWORD"))?;

    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(email.as_str()))
        .one(&state.db)
        .await
        .map_err(db_error)?;
    if existing.is_some() {
        return Err(bad_request(
            "Email address already registered",
            "EMAIL_EXISTS",
        ));
    }

    let password_hash = hash_password(&req.password).map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to hash password: {}", e),
            "HASHING_FAILED",
        )
    })?;

    let now = Utc::now();
    let created = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        email: Set(email),
        password_hash: Set(password_hash),
        avatar: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.db)
    .await
    .map_err(register_error)?;

    info!("Registered user {} ({})", created.id, created.email);

    let (token, expires_at) = issue_session(&state, &created)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: created.into(),
            token,
            expires_at,
        }),
    ))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; session cookie set", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Response> {
    let invalid = || {
        api_error(
            StatusCode::UNAUTHORIZED,
            "Invalid email or password",
            "INVALID_CREDENTIALS",
        )
    };

    let email = req.email.trim().to_lowercase();
    let found = user::Entity::find()
        .filter(user::Column::Email.eq(email.as_str()))
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(invalid)?;

    let verified = verify_password(&req.password, &found.password_hash).map_err(|e| {
        warn!("Stored password hash for {} is unusable: {}", found.id, e);
        invalid()
    })?;
    if !verified {
        debug!("Rejected login for {}", email);
        return Err(invalid());
    }

    let (token, expires_at) = issue_session(&state, &found)?;
    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age
    );

    info!("User {} logged in", found.id);

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(AuthResponse {
            user: found.into(),
            token,
            expires_at,
        }),
    )
        .into_response())
}

/// Log out (clears the session cookie)
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 204, description = "Session cookie cleared")
    ),
    tag = "auth"
)]
pub async fn logout() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        AppendHeaders([(
            header::SET_COOKIE,
            format!(
                "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
                SESSION_COOKIE
            ),
        )]),
    )
}

async fn current_user(state: &AppState, auth_user: &AuthUser) -> ApiResult<user::Model> {
    user::Entity::find_by_id(auth_user.user_id)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("User", auth_user.user_id))
}

/// Get the authenticated user's profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "User no longer exists", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<UserProfile>> {
    let found = current_user(&state, &auth_user).await?;
    Ok(Json(found.into()))
}

/// Update the authenticated user's name or avatar
#[utoipa::path(
    patch,
    path = "/api/auth/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 404, description = "User no longer exists", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn update_current_user(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    let found = current_user(&state, &auth_user).await?;
    let mut active: user::ActiveModel = found.into();

    if let Some(name) = req.name {
        active.name = Set(required_text(&name, "name")?);
    }
    if let Some(avatar) = req.avatar {
        active.avatar = Set(avatar.filter(|a| !a.trim().is_empty()));
    }
    active.updated_at = Set(Utc::now());

    let updated = active.update(&state.db).await.map_err(db_error)?;
    info!("Updated profile of user {}", updated.id);

    Ok(Json(updated.into()))
}

/// Search users by name or email
#[utoipa::path(
    get,
    path = "/api/auth/users/search",
    params(
        ("q" = Option<String>, Query, description = "Case-insensitive substring of name or email"),
        ("exclude_project" = Option<Uuid>, Query, description = "Leave out members of this project")
    ),
    responses(
        (status = 200, description = "Matching users (possibly empty)", body = UserList),
        (status = 403, description = "Not a member of the excluded project", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn search_users(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<UserSearchQuery>,
) -> ApiResult<Json<UserList>> {
    let needle = FilterQuery { q: query.q }.needle();
    let Some(needle) = needle else {
        return Ok(Json(UserList {
            users: Vec::new(),
            total: 0,
        }));
    };

    debug!("Searching users matching '{}'", needle);

    // Matched in Rust: `%` and `_` are literal and case folding is Unicode-aware.
    let mut select = user::Entity::find();

    if let Some(project_id) = query.exclude_project {
        project_for_member(&state, project_id, auth_user.user_id).await?;

        let member_ids: Vec<Uuid> = project_member::Entity::find()
            .select_only()
            .column(project_member::Column::UserId)
            .filter(project_member::Column::ProjectId.eq(project_id))
            .into_tuple()
            .all(&state.db)
            .await
            .map_err(db_error)?;

        if !member_ids.is_empty() {
            select = select.filter(user::Column::Id.is_not_in(member_ids));
        }
    }

    let users: Vec<UserProfile> = select
        .order_by_asc(user::Column::Name)
        .all(&state.db)
        .await
        .map_err(db_error)?
        .into_iter()
        .filter(|u| matches_needle(&needle, &[Some(u.name.as_str()), Some(u.email.as_str())]))
        .take(SEARCH_LIMIT)
        .map(UserProfile::from)
        .collect();

    let total = users.len();
    Ok(Json(UserList { users, total }))
}
