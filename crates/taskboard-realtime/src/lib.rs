//! Realtime layer: websocket presence and chat relay
//!
//! The hub keeps the set of live connections in memory. Nothing here is
//! persisted; a restart simply drops every connection and clients reconnect.

pub mod events;
pub mod hub;

pub use events::{ClientEvent, ServerEvent};
pub use hub::{ConnectionId, HubError, RealtimeHub};
