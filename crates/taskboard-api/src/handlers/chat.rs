use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use taskboard_db::entities::{chat_message, chatroom, chatroom_member, project_member, user};

use super::{
    bad_request, db_error, forbidden, load_profiles, not_found, project_for_member,
    required_text, ApiResult,
};
use crate::middleware::AuthUser;
use crate::models::*;
use crate::AppState;

/// Whether `user_id` is enrolled in the chatroom
pub(crate) async fn is_room_member<C: ConnectionTrait>(
    db: &C,
    room_id: Uuid,
    user_id: Uuid,
) -> Result<bool, DbErr> {
    Ok(chatroom_member::Entity::find_by_id((room_id, user_id))
        .one(db)
        .await?
        .is_some())
}

/// Members of each room, in join order, with profiles
async fn members_by_room(
    state: &AppState,
    room_ids: &[Uuid],
) -> ApiResult<HashMap<Uuid, Vec<ChatRoomMember>>> {
    if room_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = chatroom_member::Entity::find()
        .filter(chatroom_member::Column::ChatroomId.is_in(room_ids.to_vec()))
        .order_by_asc(chatroom_member::Column::JoinedAt)
        .all(&state.db)
        .await
        .map_err(db_error)?;

    let profiles = load_profiles(state, rows.iter().map(|m| m.user_id)).await?;

    let mut grouped: HashMap<Uuid, Vec<ChatRoomMember>> = HashMap::new();
    for row in rows {
        if let Some(profile) = profiles.get(&row.user_id) {
            grouped
                .entry(row.chatroom_id)
                .or_default()
                .push(ChatRoomMember {
                    user: profile.clone(),
                    joined_at: row.joined_at,
                });
        }
    }

    Ok(grouped)
}

async fn room_view(state: &AppState, model: chatroom::Model) -> ApiResult<ChatRoom> {
    let mut members = members_by_room(state, &[model.id]).await?;
    let members = members.remove(&model.id).unwrap_or_default();
    Ok(ChatRoom::from_model(model, members))
}

/// Load a room in a project the caller belongs to, plus whether the caller
/// is enrolled in the room itself
async fn room_for_project_member(
    state: &AppState,
    room_id: Uuid,
    user_id: Uuid,
) -> ApiResult<(chatroom::Model, bool)> {
    let room = chatroom::Entity::find_by_id(room_id)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("Chatroom", room_id))?;

    project_for_member(state, room.project_id, user_id).await?;

    let enrolled = is_room_member(&state.db, room_id, user_id)
        .await
        .map_err(db_error)?;

    Ok((room, enrolled))
}

fn not_room_member() -> (StatusCode, Json<ErrorResponse>) {
    forbidden(
        "You are not a member of this chatroom",
        "NOT_A_ROOM_MEMBER",
    )
}

/// List the chatrooms of a project visible to the caller
///
/// Group rooms are listed for every project member; direct rooms only for
/// their participants.
#[utoipa::path(
    get,
    path = "/api/chat/project/{project_id}/rooms",
    params(
        ("project_id" = Uuid, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Chatrooms", body = ChatRoomList),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "chat"
)]
pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ChatRoomList>> {
    project_for_member(&state, project_id, auth_user.user_id).await?;
    debug!("Listing chatrooms of project {}", project_id);

    let models = chatroom::Entity::find()
        .filter(chatroom::Column::ProjectId.eq(project_id))
        .order_by_asc(chatroom::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(db_error)?;

    let ids: Vec<Uuid> = models.iter().map(|r| r.id).collect();
    let mut members = members_by_room(&state, &ids).await?;

    let rooms: Vec<ChatRoom> = models
        .into_iter()
        .filter_map(|room| {
            let room_members = members.remove(&room.id).unwrap_or_default();
            let visible = room.room_type == chatroom::RoomType::Group
                || room_members.iter().any(|m| m.user.id == auth_user.user_id);
            visible.then(|| ChatRoom::from_model(room, room_members))
        })
        .collect();

    let total = rooms.len();
    Ok(Json(ChatRoomList { rooms, total }))
}

/// Create a chatroom; the creator is enrolled first
#[utoipa::path(
    post,
    path = "/api/chat/rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Chatroom created", body = ChatRoom),
        (status = 400, description = "Invalid input or members", body = ErrorResponse),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "chat"
)]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateRoomRequest>,
) -> ApiResult<(StatusCode, Json<ChatRoom>)> {
    let name = required_text(&req.name, "name")?;
    let room_type = req.room_type.unwrap_or(RoomType::Group);
    project_for_member(&state, req.project_id, auth_user.user_id).await?;

    let mut others: Vec<Uuid> = Vec::new();
    for id in req.member_ids {
        if id != auth_user.user_id && !others.contains(&id) {
            others.push(id);
        }
    }

    if room_type == RoomType::Direct && others.len() != 1 {
        return Err(bad_request(
            "A direct room needs exactly one other member",
            "INVALID_DIRECT_ROOM",
        ));
    }

    if !others.is_empty() {
        let in_project: Vec<Uuid> = project_member::Entity::find()
            .select_only()
            .column(project_member::Column::UserId)
            .filter(project_member::Column::ProjectId.eq(req.project_id))
            .filter(project_member::Column::UserId.is_in(others.clone()))
            .into_tuple()
            .all(&state.db)
            .await
            .map_err(db_error)?;

        if let Some(outsider) = others.iter().find(|id| !in_project.contains(id)) {
            return Err(bad_request(
                format!("User '{}' is not a member of the project", outsider),
                "MEMBER_NOT_IN_PROJECT",
            ));
        }
    }

    let now = Utc::now();
    let txn = state.db.begin().await.map_err(db_error)?;

    let created = chatroom::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(req.project_id),
        name: Set(name),
        room_type: Set(room_type.into()),
        created_by: Set(auth_user.user_id),
        created_at: Set(now),
    }
    .insert(&txn)
    .await
    .map_err(db_error)?;

    for user_id in std::iter::once(auth_user.user_id).chain(others) {
        chatroom_member::ActiveModel {
            chatroom_id: Set(created.id),
            user_id: Set(user_id),
            joined_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(db_error)?;
    }

    txn.commit().await.map_err(db_error)?;

    info!(
        "User {} created {:?} chatroom {} in project {}",
        auth_user.user_id, room_type, created.id, created.project_id
    );

    Ok((StatusCode::CREATED, Json(room_view(&state, created).await?)))
}

/// Get a chatroom with its members
#[utoipa::path(
    get,
    path = "/api/chat/rooms/{id}",
    params(
        ("id" = Uuid, Path, description = "Chatroom ID")
    ),
    responses(
        (status = 200, description = "Chatroom information", body = ChatRoom),
        (status = 403, description = "Not allowed to see this room", body = ErrorResponse),
        (status = 404, description = "Chatroom not found", body = ErrorResponse)
    ),
    tag = "chat"
)]
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ChatRoom>> {
    let (room, enrolled) = room_for_project_member(&state, id, auth_user.user_id).await?;

    if room.room_type == chatroom::RoomType::Direct && !enrolled {
        return Err(not_room_member());
    }

    Ok(Json(room_view(&state, room).await?))
}

/// Join a group chatroom of one of your projects
#[utoipa::path(
    post,
    path = "/api/chat/rooms/{id}/join",
    params(
        ("id" = Uuid, Path, description = "Chatroom ID")
    ),
    responses(
        (status = 200, description = "Joined (or already a member)", body = ChatRoom),
        (status = 400, description = "Direct rooms cannot be joined", body = ErrorResponse),
        (status = 403, description = "Not a member of the project", body = ErrorResponse),
        (status = 404, description = "Chatroom not found", body = ErrorResponse)
    ),
    tag = "chat"
)]
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ChatRoom>> {
    let (room, enrolled) = room_for_project_member(&state, id, auth_user.user_id).await?;

    if !enrolled {
        if room.room_type == chatroom::RoomType::Direct {
            return Err(bad_request(
                "Direct rooms cannot be joined",
                "DIRECT_ROOM",
            ));
        }

        chatroom_member::ActiveModel {
            chatroom_id: Set(room.id),
            user_id: Set(auth_user.user_id),
            joined_at: Set(Utc::now()),
        }
        .insert(&state.db)
        .await
        .map_err(db_error)?;

        info!("User {} joined chatroom {}", auth_user.user_id, room.id);
    }

    Ok(Json(room_view(&state, room).await?))
}

/// The most recent messages of a room, oldest first
#[utoipa::path(
    get,
    path = "/api/chat/rooms/{id}/messages",
    params(
        ("id" = Uuid, Path, description = "Chatroom ID")
    ),
    responses(
        (status = 200, description = "Up to 100 most recent messages, ascending", body = ChatMessageList),
        (status = 403, description = "Not a member of the room", body = ErrorResponse),
        (status = 404, description = "Chatroom not found", body = ErrorResponse)
    ),
    tag = "chat"
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ChatMessageList>> {
    let (_, enrolled) = room_for_project_member(&state, id, auth_user.user_id).await?;
    if !enrolled {
        return Err(not_room_member());
    }

    let mut rows = chat_message::Entity::find()
        .filter(chat_message::Column::ChatroomId.eq(id))
        .order_by_desc(chat_message::Column::CreatedAt)
        .limit(chat_message::HISTORY_LIMIT)
        .find_also_related(user::Entity)
        .all(&state.db)
        .await
        .map_err(db_error)?;
    rows.reverse();

    let messages: Vec<ChatMessage> = rows
        .into_iter()
        .map(|(message, sender)| ChatMessage::from_model(message, sender))
        .collect();

    let total = messages.len();
    Ok(Json(ChatMessageList { messages, total }))
}

/// Persist a chat message
///
/// Delivery to connected clients happens over the websocket, not here.
#[utoipa::path(
    post,
    path = "/api/chat/rooms/{id}/messages",
    params(
        ("id" = Uuid, Path, description = "Chatroom ID")
    ),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored, with sender profile", body = ChatMessage),
        (status = 400, description = "Empty message", body = ErrorResponse),
        (status = 403, description = "Not a member of the room", body = ErrorResponse),
        (status = 404, description = "Chatroom not found", body = ErrorResponse)
    ),
    tag = "chat"
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let text = required_text(&req.text, "text")?;
    let (_, enrolled) = room_for_project_member(&state, id, auth_user.user_id).await?;
    if !enrolled {
        return Err(not_room_member());
    }

    let stored = chat_message::ActiveModel {
        id: Set(Uuid::new_v4()),
        chatroom_id: Set(id),
        sender_id: Set(auth_user.user_id),
        text: Set(text),
        created_at: Set(Utc::now()),
    }
    .insert(&state.db)
    .await
    .map_err(db_error)?;

    let sender = user::Entity::find_by_id(auth_user.user_id)
        .one(&state.db)
        .await
        .map_err(db_error)?;

    debug!("User {} posted message {} in {}", auth_user.user_id, stored.id, id);

    Ok((
        StatusCode::CREATED,
        Json(ChatMessage::from_model(stored, sender)),
    ))
}
