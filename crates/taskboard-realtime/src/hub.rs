//! Connection registry, presence and room fan-out

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::events::{ClientEvent, ServerEvent};

/// Identifies one websocket connection (a user may hold several)
pub type ConnectionId = u64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("Not subscribed to room {0}")]
    NotInRoom(Uuid),
}

struct Connection {
    user_id: Uuid,
    online: bool,
    rooms: HashSet<Uuid>,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

/// Manages all live websocket connections
pub struct RealtimeHub {
    connections: Arc<RwLock<HashMap<ConnectionId, Connection>>>,
    next_id: AtomicU64,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new connection for an authenticated user.
    ///
    /// Events addressed to the connection are delivered on the returned
    /// receiver; the caller forwards them to the socket.
    pub async fn connect(
        &self,
        user_id: Uuid,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        self.connections.write().await.insert(
            id,
            Connection {
                user_id,
                online: false,
                rooms: HashSet::new(),
                sender,
            },
        );

        debug!("Connection {} registered for user {}", id, user_id);
        (id, receiver)
    }

    /// Drop a connection; broadcasts `user_offline` if it was the user's
    /// last online connection.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        let mut connections = self.connections.write().await;

        let Some(conn) = connections.remove(&conn_id) else {
            return;
        };

        debug!("Connection {} for user {} closed", conn_id, conn.user_id);

        if conn.online && !Self::user_is_online(&connections, conn.user_id) {
            info!("User {} went offline", conn.user_id);
            Self::broadcast_all(
                &connections,
                ServerEvent::UserOffline {
                    user_id: conn.user_id,
                },
            );
        }
    }

    /// Apply a client event coming from `conn_id`.
    pub async fn handle(&self, conn_id: ConnectionId, event: ClientEvent) -> Result<(), HubError> {
        match event {
            ClientEvent::UserOnline => self.set_online(conn_id).await,
            ClientEvent::UserOffline => self.set_offline(conn_id).await,
            ClientEvent::JoinRoom { room_id } => self.join_room(conn_id, room_id).await,
            ClientEvent::LeaveRoom { room_id } => self.leave_room(conn_id, room_id).await,
            ClientEvent::SendMessage {
                room_id,
                text,
                message_id,
            } => {
                self.relay_to_room(conn_id, room_id, |sender_id| {
                    ServerEvent::ReceiveMessage {
                        room_id,
                        sender_id,
                        text: text.clone(),
                        message_id,
                        sent_at: Utc::now(),
                    }
                })
                .await
            }
            ClientEvent::Typing { room_id, is_typing } => {
                self.relay_to_room(conn_id, room_id, |user_id| ServerEvent::Typing {
                    room_id,
                    user_id,
                    is_typing,
                })
                .await
            }
        }
    }

    /// Mark the connection online. The first online connection of a user
    /// announces them to everyone; the announcer always gets the current
    /// online list back.
    pub async fn set_online(&self, conn_id: ConnectionId) -> Result<(), HubError> {
        let mut connections = self.connections.write().await;

        let user_id = connections
            .get(&conn_id)
            .map(|c| c.user_id)
            .ok_or(HubError::UnknownConnection(conn_id))?;
        let was_online = Self::user_is_online(&connections, user_id);

        if let Some(conn) = connections.get_mut(&conn_id) {
            conn.online = true;
        }

        if !was_online {
            info!("User {} is online", user_id);
            Self::broadcast_all(&connections, ServerEvent::UserOnline { user_id });
        }

        let user_ids = Self::online_user_ids(&connections);
        Self::send_to(&connections, conn_id, ServerEvent::OnlineUsers { user_ids });

        Ok(())
    }

    pub async fn set_offline(&self, conn_id: ConnectionId) -> Result<(), HubError> {
        let mut connections = self.connections.write().await;

        let conn = connections
            .get_mut(&conn_id)
            .ok_or(HubError::UnknownConnection(conn_id))?;
        if !conn.online {
            return Ok(());
        }
        conn.online = false;
        let user_id = conn.user_id;

        if !Self::user_is_online(&connections, user_id) {
            info!("User {} went offline", user_id);
            Self::broadcast_all(&connections, ServerEvent::UserOffline { user_id });
        }

        Ok(())
    }

    /// Subscribe the connection to a room. Membership must already have
    /// been checked by the caller.
    pub async fn join_room(&self, conn_id: ConnectionId, room_id: Uuid) -> Result<(), HubError> {
        let mut connections = self.connections.write().await;
        let conn = connections
            .get_mut(&conn_id)
            .ok_or(HubError::UnknownConnection(conn_id))?;

        conn.rooms.insert(room_id);
        debug!("Connection {} joined room {}", conn_id, room_id);
        Ok(())
    }

    pub async fn leave_room(&self, conn_id: ConnectionId, room_id: Uuid) -> Result<(), HubError> {
        let mut connections = self.connections.write().await;
        let conn = connections
            .get_mut(&conn_id)
            .ok_or(HubError::UnknownConnection(conn_id))?;

        conn.rooms.remove(&room_id);
        debug!("Connection {} left room {}", conn_id, room_id);
        Ok(())
    }

    /// Drop every subscription `user_id` holds on `room_ids`, across all of
    /// the user's connections. Used once the user loses membership.
    pub async fn revoke_rooms(&self, user_id: Uuid, room_ids: &[Uuid]) -> usize {
        self.unsubscribe(room_ids, |conn| conn.user_id == user_id).await
    }

    /// Drop all subscriptions to `room_ids`, e.g. after the rooms are deleted
    pub async fn close_rooms(&self, room_ids: &[Uuid]) -> usize {
        self.unsubscribe(room_ids, |_| true).await
    }

    async fn unsubscribe<F>(&self, room_ids: &[Uuid], selected: F) -> usize
    where
        F: Fn(&Connection) -> bool,
    {
        if room_ids.is_empty() {
            return 0;
        }

        let mut connections = self.connections.write().await;
        let mut removed = 0;
        for (id, conn) in connections.iter_mut() {
            if !selected(conn) {
                continue;
            }
            for room_id in room_ids {
                if conn.rooms.remove(room_id) {
                    debug!("Connection {} unsubscribed from room {}", id, room_id);
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Deliver an event to a single connection
    pub async fn send_to_connection(
        &self,
        conn_id: ConnectionId,
        event: ServerEvent,
    ) -> Result<(), HubError> {
        let connections = self.connections.read().await;
        if !connections.contains_key(&conn_id) {
            return Err(HubError::UnknownConnection(conn_id));
        }
        Self::send_to(&connections, conn_id, event);
        Ok(())
    }

    /// Users with at least one online connection, sorted
    pub async fn online_users(&self) -> Vec<Uuid> {
        let connections = self.connections.read().await;
        Self::online_user_ids(&connections)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send an event built from the sender's user id to every other
    /// connection subscribed to `room_id`.
    async fn relay_to_room<F>(
        &self,
        conn_id: ConnectionId,
        room_id: Uuid,
        build: F,
    ) -> Result<(), HubError>
    where
        F: Fn(Uuid) -> ServerEvent,
    {
        let connections = self.connections.read().await;
        let sender = connections
            .get(&conn_id)
            .ok_or(HubError::UnknownConnection(conn_id))?;
        if !sender.rooms.contains(&room_id) {
            return Err(HubError::NotInRoom(room_id));
        }

        let event = build(sender.user_id);
        for (id, conn) in connections.iter() {
            if *id != conn_id && conn.rooms.contains(&room_id) {
                // a closed receiver means the socket task is already shutting down
                let _ = conn.sender.send(event.clone());
            }
        }

        Ok(())
    }

    fn user_is_online(connections: &HashMap<ConnectionId, Connection>, user_id: Uuid) -> bool {
        connections
            .values()
            .any(|c| c.user_id == user_id && c.online)
    }

    fn online_user_ids(connections: &HashMap<ConnectionId, Connection>) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = connections
            .values()
            .filter(|c| c.online)
            .map(|c| c.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort();
        ids
    }

    fn broadcast_all(connections: &HashMap<ConnectionId, Connection>, event: ServerEvent) {
        for conn in connections.values() {
            let _ = conn.sender.send(event.clone());
        }
    }

    fn send_to(
        connections: &HashMap<ConnectionId, Connection>,
        conn_id: ConnectionId,
        event: ServerEvent,
    ) {
        if let Some(conn) = connections.get(&conn_id) {
            let _ = conn.sender.send(event);
        }
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_first_online_connection_broadcasts_presence() {
        let hub = RealtimeHub::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (bob_conn, mut bob_rx) = hub.connect(bob).await;
        hub.set_online(bob_conn).await.unwrap();
        drain(&mut bob_rx);

        let (alice_conn, mut alice_rx) = hub.connect(alice).await;
        hub.set_online(alice_conn).await.unwrap();

        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerEvent::UserOnline { user_id: alice }]
        );

        let alice_events = drain(&mut alice_rx);
        let mut expected = vec![alice, bob];
        expected.sort();
        assert_eq!(
            alice_events.last(),
            Some(&ServerEvent::OnlineUsers { user_ids: expected })
        );
    }

    #[tokio::test]
    async fn test_second_tab_does_not_rebroadcast() {
        let hub = RealtimeHub::new();
        let alice = Uuid::new_v4();
        let watcher = Uuid::new_v4();

        let (watch_conn, mut watch_rx) = hub.connect(watcher).await;
        hub.set_online(watch_conn).await.unwrap();

        let (tab1, _rx1) = hub.connect(alice).await;
        let (tab2, _rx2) = hub.connect(alice).await;
        hub.set_online(tab1).await.unwrap();
        drain(&mut watch_rx);

        hub.set_online(tab2).await.unwrap();
        assert!(drain(&mut watch_rx).is_empty());

        // Closing one tab keeps alice online
        hub.disconnect(tab1).await;
        assert!(drain(&mut watch_rx).is_empty());

        hub.disconnect(tab2).await;
        assert_eq!(
            drain(&mut watch_rx),
            vec![ServerEvent::UserOffline { user_id: alice }]
        );
        assert_eq!(hub.online_users().await, vec![watcher]);
    }

    #[tokio::test]
    async fn test_explicit_offline_is_idempotent() {
        let hub = RealtimeHub::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        let (other_conn, mut other_rx) = hub.connect(other).await;
        let (conn, _rx) = hub.connect(user).await;
        hub.set_online(conn).await.unwrap();
        drain(&mut other_rx);

        hub.set_offline(conn).await.unwrap();
        hub.set_offline(conn).await.unwrap();

        assert_eq!(
            drain(&mut other_rx),
            vec![ServerEvent::UserOffline { user_id: user }]
        );
        assert!(hub.online_users().await.is_empty());
        assert_eq!(hub.connection_count().await, 2);
        let _ = other_conn;
    }

    #[tokio::test]
    async fn test_room_messages_reach_only_other_subscribers() {
        let hub = RealtimeHub::new();
        let room = Uuid::new_v4();
        let sender = Uuid::new_v4();

        let (sender_conn, mut sender_rx) = hub.connect(sender).await;
        let (member_conn, mut member_rx) = hub.connect(Uuid::new_v4()).await;
        let (_outsider_conn, mut outsider_rx) = hub.connect(Uuid::new_v4()).await;

        hub.join_room(sender_conn, room).await.unwrap();
        hub.join_room(member_conn, room).await.unwrap();

        hub.handle(
            sender_conn,
            ClientEvent::SendMessage {
                room_id: room,
                text: "standup in 5".to_string(),
                message_id: None,
            },
        )
        .await
        .unwrap();

        let received = drain(&mut member_rx);
        assert_eq!(received.len(), 1);
        match &received[0] {
            ServerEvent::ReceiveMessage {
                room_id,
                sender_id,
                text,
                ..
            } => {
                assert_eq!(*room_id, room);
                assert_eq!(*sender_id, sender);
                assert_eq!(text, "standup in 5");
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert!(drain(&mut sender_rx).is_empty());
        assert!(drain(&mut outsider_rx).is_empty());
    }

    #[tokio::test]
    async fn test_typing_requires_joined_room() {
        let hub = RealtimeHub::new();
        let room = Uuid::new_v4();
        let (conn, _rx) = hub.connect(Uuid::new_v4()).await;

        let result = hub
            .handle(
                conn,
                ClientEvent::Typing {
                    room_id: room,
                    is_typing: true,
                },
            )
            .await;
        assert_eq!(result, Err(HubError::NotInRoom(room)));

        hub.join_room(conn, room).await.unwrap();
        hub.leave_room(conn, room).await.unwrap();
        let result = hub
            .handle(
                conn,
                ClientEvent::Typing {
                    room_id: room,
                    is_typing: false,
                },
            )
            .await;
        assert_eq!(result, Err(HubError::NotInRoom(room)));
    }

    #[tokio::test]
    async fn test_revoked_user_stops_sending_and_receiving() {
        let hub = RealtimeHub::new();
        let room = Uuid::new_v4();
        let other_room = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (alice_conn, _alice_rx) = hub.connect(Uuid::new_v4()).await;
        let (bob_tab1, mut bob_rx1) = hub.connect(bob).await;
        let (bob_tab2, mut bob_rx2) = hub.connect(bob).await;

        for conn in [alice_conn, bob_tab1, bob_tab2] {
            hub.join_room(conn, room).await.unwrap();
        }
        hub.join_room(bob_tab1, other_room).await.unwrap();

        assert_eq!(hub.revoke_rooms(bob, &[room]).await, 2);
        assert_eq!(hub.revoke_rooms(bob, &[room]).await, 0);

        hub.handle(
            alice_conn,
            ClientEvent::SendMessage {
                room_id: room,
                text: "after removal".to_string(),
                message_id: None,
            },
        )
        .await
        .unwrap();
        assert!(drain(&mut bob_rx1).is_empty());
        assert!(drain(&mut bob_rx2).is_empty());

        let result = hub
            .handle(
                bob_tab2,
                ClientEvent::Typing {
                    room_id: room,
                    is_typing: true,
                },
            )
            .await;
        assert_eq!(result, Err(HubError::NotInRoom(room)));

        // rooms outside the revoked set are kept
        hub.handle(
            bob_tab1,
            ClientEvent::Typing {
                room_id: other_room,
                is_typing: true,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_close_rooms_clears_every_subscriber() {
        let hub = RealtimeHub::new();
        let room = Uuid::new_v4();

        let (a, _a_rx) = hub.connect(Uuid::new_v4()).await;
        let (b, mut b_rx) = hub.connect(Uuid::new_v4()).await;
        hub.join_room(a, room).await.unwrap();
        hub.join_room(b, room).await.unwrap();

        assert_eq!(hub.close_rooms(&[]).await, 0);
        assert_eq!(hub.close_rooms(&[room]).await, 2);

        let result = hub
            .handle(
                a,
                ClientEvent::SendMessage {
                    room_id: room,
                    text: "gone".to_string(),
                    message_id: None,
                },
            )
            .await;
        assert_eq!(result, Err(HubError::NotInRoom(room)));
        assert!(drain(&mut b_rx).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let hub = RealtimeHub::new();
        assert_eq!(
            hub.set_online(42).await,
            Err(HubError::UnknownConnection(42))
        );
        // disconnecting an unknown id is a no-op
        hub.disconnect(42).await;
    }
}
