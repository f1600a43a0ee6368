//! Database entities

pub mod chat_message;
pub mod chatroom;
pub mod chatroom_member;
pub mod list;
pub mod notification;
pub mod project;
pub mod project_member;
pub mod task;
pub mod user;

pub use chat_message::Entity as ChatMessage;
pub use chatroom::Entity as Chatroom;
pub use chatroom_member::Entity as ChatroomMember;
pub use list::Entity as List;
pub use notification::Entity as Notification;
pub use project::Entity as Project;
pub use project_member::Entity as ProjectMember;
pub use task::Entity as Task;
pub use user::Entity as User;

pub mod prelude {
    pub use super::chat_message::Entity as ChatMessage;
    pub use super::chatroom::Entity as Chatroom;
    pub use super::chatroom_member::Entity as ChatroomMember;
    pub use super::list::Entity as List;
    pub use super::notification::Entity as Notification;
    pub use super::project::Entity as Project;
    pub use super::project_member::Entity as ProjectMember;
    pub use super::task::Entity as Task;
    pub use super::user::Entity as User;
}
