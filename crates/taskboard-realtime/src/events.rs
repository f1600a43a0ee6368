//! Event envelope exchanged over the websocket
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": {...}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    UserOnline,
    UserOffline,
    JoinRoom {
        room_id: Uuid,
    },
    LeaveRoom {
        room_id: Uuid,
    },
    SendMessage {
        room_id: Uuid,
        text: String,
        /// Id of the message if the client already persisted it over REST
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<Uuid>,
    },
    Typing {
        room_id: Uuid,
        #[serde(default = "default_true")]
        is_typing: bool,
    },
}

fn default_true() -> bool {
    true
}

/// Events pushed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    OnlineUsers {
        user_ids: Vec<Uuid>,
    },
    UserOnline {
        user_id: Uuid,
    },
    UserOffline {
        user_id: Uuid,
    },
    ReceiveMessage {
        room_id: Uuid,
        sender_id: Uuid,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<Uuid>,
        sent_at: DateTime<Utc>,
    },
    Typing {
        room_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}
