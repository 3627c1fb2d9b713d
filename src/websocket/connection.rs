use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use super::types::WsMessage;
use crate::error::{AppError, Result};

pub type WsSender = mpsc::Sender<WsMessage>;

/// Identifies one live connection. A user may hold several (tabs, devices).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Decides whether a user may join a conversation's room.
#[async_trait]
pub trait MembershipCheck: Send + Sync {
    async fn ensure_participant(&self, user_id: Uuid, conversation_id: Uuid) -> Result<()>;
}

struct ConnectionEntry {
    user_id: Uuid,
    sender: WsSender,
    room: Option<Uuid>,
}

/// Registry of live connections and per-conversation rooms.
///
/// Lock order is always `connections` then `rooms`; `publish` copies a room's
/// members out before touching `connections`.
#[derive(Clone)]
pub struct ConnectionManager {
    connections: Arc<DashMap<ConnectionId, ConnectionEntry>>,
    rooms: Arc<DashMap<Uuid, HashSet<ConnectionId>>>,
    outbound_buffer: usize,
}

impl ConnectionManager {
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            rooms: Arc::new(DashMap::new()),
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    /// Register a connection for an authenticated user. The receiver yields
    /// every frame queued for this connection.
    pub fn connect(&self, user_id: Uuid) -> (ConnectionId, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        let connection_id = ConnectionId::new();

        self.connections.insert(
            connection_id,
            ConnectionEntry {
                user_id,
                sender: tx,
                room: None,
            },
        );
        tracing::info!(%user_id, %connection_id, "User connected via WebSocket");

        (connection_id, rx)
    }

    /// Join a conversation's room after checking membership. Leaves the
    /// previous room, if any, and returns it.
    pub async fn subscribe(
        &self,
        connection_id: ConnectionId,
        conversation_id: Uuid,
        check: &dyn MembershipCheck,
    ) -> Result<Option<Uuid>> {
        let user_id = self.user_of(connection_id).ok_or_else(not_connected)?;

        check.ensure_participant(user_id, conversation_id).await?;

        let mut entry = self
            .connections
            .get_mut(&connection_id)
            .ok_or_else(not_connected)?;

        let previous = entry.room.replace(conversation_id);
        if previous == Some(conversation_id) {
            return Ok(previous);
        }
        if let Some(old_room) = previous {
            self.leave_room(old_room, connection_id);
        }
        self.rooms
            .entry(conversation_id)
            .or_default()
            .insert(connection_id);
        drop(entry);

        tracing::info!(
            %user_id,
            %connection_id,
            %conversation_id,
            room_size = self.room_size(conversation_id),
            "Subscribed to conversation"
        );
        Ok(previous)
    }

    /// Leave the current room. Returns the room that was left.
    pub fn unsubscribe(&self, connection_id: ConnectionId) -> Option<Uuid> {
        let mut entry = self.connections.get_mut(&connection_id)?;
        let room = entry.room.take()?;
        self.leave_room(room, connection_id);
        drop(entry);

        tracing::info!(%connection_id, conversation_id = %room, "Unsubscribed from conversation");
        Some(room)
    }

    /// Best-effort delivery to every connection in the room, the sender's
    /// own included. Returns how many connections accepted the frame.
    pub fn publish(&self, conversation_id: Uuid, message: WsMessage) -> usize {
        let members: Vec<ConnectionId> = match self.rooms.get(&conversation_id) {
            Some(room) => room.iter().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for connection_id in members {
            let Some(entry) = self.connections.get(&connection_id) else {
                continue;
            };
            match entry.sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        %connection_id,
                        %conversation_id,
                        "Outbound queue full, dropping live delivery"
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(connection_id),
            }
        }

        for connection_id in closed {
            self.disconnect(connection_id);
        }

        delivered
    }

    /// Queue a frame for one connection.
    pub fn send_to(&self, connection_id: ConnectionId, message: WsMessage) -> bool {
        self.connections
            .get(&connection_id)
            .map(|entry| entry.sender.try_send(message).is_ok())
            .unwrap_or(false)
    }

    /// Remove a connection and its subscription. Safe to call repeatedly.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        if let Some((_, entry)) = self.connections.remove(&connection_id) {
            if let Some(room) = entry.room {
                self.leave_room(room, connection_id);
            }
            tracing::info!(
                user_id = %entry.user_id,
                %connection_id,
                "User disconnected from WebSocket"
            );
        }
    }

    /// Drop every connection. Their outbound queues close, which ends the
    /// per-socket writer tasks.
    pub fn close_all(&self) {
        let count = self.online_count();
        self.connections.clear();
        self.rooms.clear();
        tracing::info!(connections = count, "Closed all live connections");
    }

    pub fn user_of(&self, connection_id: ConnectionId) -> Option<Uuid> {
        self.connections.get(&connection_id).map(|entry| entry.user_id)
    }

    pub fn current_room(&self, connection_id: ConnectionId) -> Option<Uuid> {
        self.connections
            .get(&connection_id)
            .and_then(|entry| entry.room)
    }

    pub fn room_size(&self, conversation_id: Uuid) -> usize {
        self.rooms
            .get(&conversation_id)
            .map(|room| room.len())
            .unwrap_or(0)
    }

    pub fn online_count(&self) -> usize {
        self.connections.len()
    }

    fn leave_room(&self, conversation_id: Uuid, connection_id: ConnectionId) {
        if let Some(mut room) = self.rooms.get_mut(&conversation_id) {
            room.remove(&connection_id);
        }
        self.rooms.remove_if(&conversation_id, |_, room| room.is_empty());
    }
}

fn not_connected() -> AppError {
    AppError::Unauthenticated("Connection is not registered".to_string())
}
