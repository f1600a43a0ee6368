use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use taskboard_db::entities::{
    chat_message, chatroom, list, notification, project, project_member, task, user,
};

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in PATCH bodies.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Users with at least one live websocket connection
    pub online_users: usize,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

// ---------------------------------------------------------------------------
// Users and authentication
// ---------------------------------------------------------------------------

/// Public user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    /// User UUID
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
    /// Avatar URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl From<user::Model> for UserProfile {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            avatar: model.avatar,
        }
    }
}

/// Request to register a new user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Display name
    pub name: String,
    /// Email address (must be unique)
    pub email: String,
    /// Password (at least 8 characters)
    pub password: String,
}

/// Request to log in
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned by register and login
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    /// Authenticated user
    pub user: UserProfile,
    /// Session token (also set as the `session_token` cookie on login)
    pub token: String,
    /// When the token expires
    pub expires_at: DateTime<Utc>,
}

/// Request to update the current user's profile
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    /// New display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New avatar URL (`null` clears it)
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>)]
    pub avatar: Option<Option<String>>,
}

/// Query parameters for user search
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UserSearchQuery {
    /// Case-insensitive substring matched against name and email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    /// Leave out users who are already members of this project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_project: Option<Uuid>,
}

/// List of users
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserList {
    pub users: Vec<UserProfile>,
    pub total: usize,
}

/// Free-text filter accepted by collection endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct FilterQuery {
    /// Case-insensitive substring filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

impl FilterQuery {
    /// Lowercased, trimmed needle; `None` when there is nothing to filter on
    pub fn needle(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }
}

/// Case-insensitive containment used by the `?q=` filters
pub fn matches_needle(needle: &str, haystacks: &[Option<&str>]) -> bool {
    haystacks
        .iter()
        .flatten()
        .any(|h| h.to_lowercase().contains(needle))
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// Role of a user inside a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    /// Can edit the project and manage members
    Admin,
    /// Regular member
    Member,
}

impl From<project_member::ProjectRole> for ProjectRole {
    fn from(role: project_member::ProjectRole) -> Self {
        match role {
            project_member::ProjectRole::Admin => ProjectRole::Admin,
            project_member::ProjectRole::Member => ProjectRole::Member,
        }
    }
}

impl From<ProjectRole> for project_member::ProjectRole {
    fn from(role: ProjectRole) -> Self {
        match role {
            ProjectRole::Admin => project_member::ProjectRole::Admin,
            ProjectRole::Member => project_member::ProjectRole::Member,
        }
    }
}

/// Project member with profile
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectMember {
    pub user: UserProfile,
    pub role: ProjectRole,
    pub joined_at: DateTime<Utc>,
}

/// Project information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Project {
    /// Project UUID
    pub id: Uuid,
    /// Project name
    pub name: String,
    /// Free-form description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// User who created the project
    pub created_by: Uuid,
    /// Members with their roles
    pub members: Vec<ProjectMember>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn from_model(model: project::Model, members: Vec<ProjectMember>) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            created_by: model.created_by,
            members,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// List of projects
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectList {
    pub projects: Vec<Project>,
    pub total: usize,
}

/// Request to create a project
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Request to update a project
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateProjectRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description (`null` clears it)
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

/// Request to add a member to a project
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    /// User to add
    pub user_id: Uuid,
    /// Role (defaults to `member`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<ProjectRole>,
}

// ---------------------------------------------------------------------------
// Lists
// ---------------------------------------------------------------------------

/// A column of tasks inside a project
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskList {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    /// Ordering key, increasing in creation order
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<list::Model> for TaskList {
    fn from(model: list::Model) -> Self {
        Self {
            id: model.id,
            project_id: model.project_id,
            title: model.title,
            position: model.position,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Lists of a project, ordered by position
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskListCollection {
    pub lists: Vec<TaskList>,
    pub total: usize,
}

/// Request to create a list
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateListRequest {
    pub project_id: Uuid,
    pub title: String,
}

/// Request to update a list
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateListRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl From<task::TaskStatus> for TaskStatus {
    fn from(status: task::TaskStatus) -> Self {
        match status {
            task::TaskStatus::Todo => TaskStatus::Todo,
            task::TaskStatus::InProgress => TaskStatus::InProgress,
            task::TaskStatus::Done => TaskStatus::Done,
        }
    }
}

impl From<TaskStatus> for task::TaskStatus {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Todo => task::TaskStatus::Todo,
            TaskStatus::InProgress => task::TaskStatus::InProgress,
            TaskStatus::Done => task::TaskStatus::Done,
        }
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl From<task::TaskPriority> for TaskPriority {
    fn from(priority: task::TaskPriority) -> Self {
        match priority {
            task::TaskPriority::Low => TaskPriority::Low,
            task::TaskPriority::Medium => TaskPriority::Medium,
            task::TaskPriority::High => TaskPriority::High,
        }
    }
}

impl From<TaskPriority> for task::TaskPriority {
    fn from(priority: TaskPriority) -> Self {
        match priority {
            TaskPriority::Low => task::TaskPriority::Low,
            TaskPriority::Medium => task::TaskPriority::Medium,
            TaskPriority::High => task::TaskPriority::High,
        }
    }
}

/// Checklist item of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Step {
    pub id: String,
    pub title: String,
    pub completed: bool,
}

impl From<task::Step> for Step {
    fn from(step: task::Step) -> Self {
        Self {
            id: step.id,
            title: step.title,
            completed: step.completed,
        }
    }
}

/// Label attached to a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl From<task::Label> for Label {
    fn from(label: task::Label) -> Self {
        Self {
            id: label.id,
            name: label.name,
            color: label.color,
        }
    }
}

/// Comment on a task
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Comment {
    pub id: String,
    pub user_id: Uuid,
    /// Author profile, when the author still exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<UserProfile>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// File attached to a task (metadata only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<task::Attachment> for Attachment {
    fn from(file: task::Attachment) -> Self {
        Self {
            id: file.id,
            name: file.name,
            url: file.url,
            uploaded_at: file.uploaded_at,
        }
    }
}

/// Task information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Uuid>,
    /// Assignee profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserProfile>,
    pub created_by: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub steps: Vec<Step>,
    pub labels: Vec<Label>,
    pub comments: Vec<Comment>,
    pub files: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tasks of a list
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskCollection {
    pub tasks: Vec<Task>,
    pub total: usize,
}

/// Request to create a task
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    pub list_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Defaults to `todo`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// Defaults to `medium`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    /// Must be a member of the task's project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

/// Partial task update; `null` clears the nullable fields
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateTaskRequest {
    /// Move the task to another list of the same project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<Uuid>)]
    pub assigned_to: Option<Option<Uuid>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

/// Request to add a step
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddStepRequest {
    /// Client-chosen id; generated when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

/// Request to update a step
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateStepRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

/// Request to add a label
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddLabelRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Request to add a comment
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddCommentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
}

/// Request to attach a file reference
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddFileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Chatroom type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    /// Open to any project member who joins
    Group,
    /// Conversation between exactly two users
    Direct,
}

impl From<chatroom::RoomType> for RoomType {
    fn from(kind: chatroom::RoomType) -> Self {
        match kind {
            chatroom::RoomType::Group => RoomType::Group,
            chatroom::RoomType::Direct => RoomType::Direct,
        }
    }
}

impl From<RoomType> for chatroom::RoomType {
    fn from(kind: RoomType) -> Self {
        match kind {
            RoomType::Group => chatroom::RoomType::Group,
            RoomType::Direct => chatroom::RoomType::Direct,
        }
    }
}

/// Chatroom member with profile
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRoomMember {
    pub user: UserProfile,
    pub joined_at: DateTime<Utc>,
}

/// Chatroom information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRoom {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub room_type: RoomType,
    pub created_by: Uuid,
    pub members: Vec<ChatRoomMember>,
    pub created_at: DateTime<Utc>,
}

impl ChatRoom {
    pub fn from_model(model: chatroom::Model, members: Vec<ChatRoomMember>) -> Self {
        Self {
            id: model.id,
            project_id: model.project_id,
            name: model.name,
            room_type: model.room_type.into(),
            created_by: model.created_by,
            members,
            created_at: model.created_at,
        }
    }
}

/// Chatrooms of a project
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRoomList {
    pub rooms: Vec<ChatRoom>,
    pub total: usize,
}

/// Request to create a chatroom
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    pub project_id: Uuid,
    pub name: String,
    /// Defaults to `group`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_type: Option<RoomType>,
    /// Initial members besides the creator; all must be project members
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

/// Chat message with sender profile
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<UserProfile>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn from_model(model: chat_message::Model, sender: Option<user::Model>) -> Self {
        Self {
            id: model.id,
            room_id: model.chatroom_id,
            sender_id: model.sender_id,
            sender: sender.map(UserProfile::from),
            text: model.text,
            created_at: model.created_at,
        }
    }
}

/// Recent messages of a room, oldest first
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessageList {
    pub messages: Vec<ChatMessage>,
    pub total: usize,
}

/// Request to send a chat message
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub text: String,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The user was added to a project
    ProjectInvite,
    /// A task was assigned to the user
    TaskAssigned,
    General,
}

impl From<notification::NotificationKind> for NotificationKind {
    fn from(kind: notification::NotificationKind) -> Self {
        match kind {
            notification::NotificationKind::ProjectInvite => NotificationKind::ProjectInvite,
            notification::NotificationKind::TaskAssigned => NotificationKind::TaskAssigned,
            notification::NotificationKind::General => NotificationKind::General,
        }
    }
}

impl From<NotificationKind> for notification::NotificationKind {
    fn from(kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::ProjectInvite => notification::NotificationKind::ProjectInvite,
            NotificationKind::TaskAssigned => notification::NotificationKind::TaskAssigned,
            NotificationKind::General => notification::NotificationKind::General,
        }
    }
}

/// Notification information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<notification::Model> for Notification {
    fn from(model: notification::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            project_id: model.project_id,
            kind: model.kind.into(),
            message: model.message,
            is_read: model.is_read,
            created_at: model.created_at,
        }
    }
}

/// Notifications of the current user, newest first
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub total: usize,
    /// Unread notifications of the user, regardless of filter
    pub unread: u64,
}

/// Query parameters for listing notifications
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct NotificationQuery {
    /// Only return unread notifications
    #[serde(default)]
    pub unread_only: bool,
}

/// Request to create a notification
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateNotificationRequest {
    /// Recipient (defaults to the caller)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    /// Related project; caller and recipient must both belong to it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    /// Defaults to `general`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<NotificationKind>,
    pub message: String,
}

/// Result of marking all notifications read
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MarkAllReadResponse {
    /// Notifications that changed from unread to read
    pub updated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_distinguishes_null_from_absent() {
        let absent: UpdateTaskRequest = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert!(absent.assigned_to.is_none());

        let cleared: UpdateTaskRequest = serde_json::from_str(r#"{"assigned_to":null}"#).unwrap();
        assert_eq!(cleared.assigned_to, Some(None));

        let id = Uuid::new_v4();
        let set: UpdateTaskRequest =
            serde_json::from_value(serde_json::json!({ "assigned_to": id })).unwrap();
        assert_eq!(set.assigned_to, Some(Some(id)));
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).unwrap(),
            "in_progress"
        );
        assert_eq!(serde_json::to_value(ProjectRole::Admin).unwrap(), "admin");
        assert_eq!(
            serde_json::to_value(NotificationKind::TaskAssigned).unwrap(),
            "task_assigned"
        );
    }

    #[test]
    fn test_filter_needle() {
        let query = FilterQuery {
            q: Some("  Design ".to_string()),
        };
        let needle = query.needle().unwrap();
        assert!(matches_needle(&needle, &[Some("UI design review")]));
        assert!(!matches_needle(&needle, &[Some("Backend"), None]));

        assert!(FilterQuery { q: Some("   ".to_string()) }.needle().is_none());
    }
}
