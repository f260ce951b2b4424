//! Process-wide connection directory
//!
//! Bidirectional mapping between live connections and (user, device)
//! identity, plus the outbound channel for each connection. The directory
//! is the authoritative fan-out list: delivery never re-queries the
//! record store to find open connections. It holds no durable state and
//! is rebuilt empty on every process start; live connections cannot
//! survive a restart, so the state must not pretend otherwise.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::ServerEvent;

/// Identifier for one open transport connection
pub type ConnectionId = Uuid;

/// What a connection is currently bound to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binding {
    pub user_id: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug)]
struct ConnectionEntry {
    sender: mpsc::UnboundedSender<ServerEvent>,
    user_id: Option<String>,
    device_id: Option<String>,
}

#[derive(Debug, Default)]
struct DirectoryInner {
    /// connection -> outbound channel + identity
    connections: DashMap<ConnectionId, ConnectionEntry>,
    /// device -> newest connection bound to it
    devices: DashMap<String, ConnectionId>,
    /// user -> all open connections announced for that user
    users: DashMap<String, HashSet<ConnectionId>>,
}

/// Directory of all live connections in this process
///
/// Thread-safe and cheap to clone; all operations are synchronous and
/// non-suspending. Delivery is fire-and-forget over unbounded channels.
#[derive(Debug, Clone, Default)]
pub struct ConnectionDirectory {
    inner: Arc<DirectoryInner>,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the outbound channel for a freshly accepted connection,
    /// before its identity is known.
    pub fn attach(&self, connection_id: ConnectionId, sender: mpsc::UnboundedSender<ServerEvent>) {
        self.inner.connections.insert(
            connection_id,
            ConnectionEntry {
                sender,
                user_id: None,
                device_id: None,
            },
        );

        tracing::debug!(
            connection_id = %connection_id,
            total = self.inner.connections.len(),
            "Connection attached"
        );
    }

    /// Bind a connection to a logical user (device not yet known).
    /// Idempotent; last call wins.
    pub fn bind_user(&self, connection_id: ConnectionId, user_id: &str) {
        let previous_user = match self.inner.connections.get_mut(&connection_id) {
            Some(mut entry) => entry.user_id.replace(user_id.to_string()),
            None => {
                tracing::warn!(connection_id = %connection_id, "Bind for unknown connection");
                return;
            }
        };

        if previous_user.as_deref() != Some(user_id) {
            if let Some(old_user) = previous_user {
                self.remove_from_user_index(&old_user, connection_id);
            }
        }

        self.inner
            .users
            .entry(user_id.to_string())
            .or_default()
            .insert(connection_id);
    }

    /// Bind a connection to a (user, device) pair. Idempotent upsert;
    /// the newest bind for a device supersedes any older connection
    /// bound to it (the superseded connection gets no eviction message).
    pub fn bind(&self, connection_id: ConnectionId, user_id: &str, device_id: &str) {
        self.bind_user(connection_id, user_id);

        let previous_device = match self.inner.connections.get_mut(&connection_id) {
            Some(mut entry) => entry.device_id.replace(device_id.to_string()),
            None => return,
        };

        // This connection switched devices: drop its old device mapping
        if let Some(old_device) = previous_device.filter(|d| d.as_str() != device_id) {
            self.inner
                .devices
                .remove_if(&old_device, |_, conn| *conn == connection_id);
        }

        // Newer bind wins the device slot
        let superseded = self
            .inner
            .devices
            .insert(device_id.to_string(), connection_id);
        if let Some(old_conn) = superseded.filter(|c| *c != connection_id) {
            if let Some(mut entry) = self.inner.connections.get_mut(&old_conn) {
                entry.device_id = None;
            }
            tracing::debug!(
                device_id = %device_id,
                superseded = %old_conn,
                connection_id = %connection_id,
                "Device binding superseded"
            );
        }
    }

    /// Resolve the user bound to a connection
    pub fn resolve_user(&self, connection_id: ConnectionId) -> Option<String> {
        self.inner
            .connections
            .get(&connection_id)
            .and_then(|e| e.user_id.clone())
    }

    /// Resolve the device bound to a connection
    pub fn resolve_device(&self, connection_id: ConnectionId) -> Option<String> {
        self.inner
            .connections
            .get(&connection_id)
            .and_then(|e| e.device_id.clone())
    }

    /// Find the open connection for a device, if any
    pub fn connection_for_device(&self, device_id: &str) -> Option<ConnectionId> {
        self.inner.devices.get(device_id).map(|c| *c)
    }

    /// Remove a connection and both directions of its binding. Returns
    /// what the connection was bound to. Safe to call if already unbound.
    pub fn unbind(&self, connection_id: ConnectionId) -> Option<Binding> {
        let (_, entry) = self.inner.connections.remove(&connection_id)?;

        if let Some(device_id) = &entry.device_id {
            self.inner
                .devices
                .remove_if(device_id, |_, conn| *conn == connection_id);
        }
        if let Some(user_id) = &entry.user_id {
            self.remove_from_user_index(user_id, connection_id);
        }

        tracing::debug!(
            connection_id = %connection_id,
            user_id = ?entry.user_id,
            device_id = ?entry.device_id,
            "Connection unbound"
        );

        Some(Binding {
            user_id: entry.user_id,
            device_id: entry.device_id,
        })
    }

    /// Number of open connections announced for a user
    pub fn user_connection_count(&self, user_id: &str) -> usize {
        self.inner.users.get(user_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Send an event to one connection
    pub fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> Result<(), SendError> {
        let entry = self
            .inner
            .connections
            .get(&connection_id)
            .ok_or(SendError::ConnectionNotFound)?;
        entry
            .sender
            .send(event)
            .map_err(|_| SendError::ConnectionClosed)
    }

    /// Send an event to the connection currently bound to a device
    pub fn send_to_device(&self, device_id: &str, event: ServerEvent) -> Result<(), SendError> {
        let connection_id = self
            .connection_for_device(device_id)
            .ok_or(SendError::DeviceNotConnected)?;
        self.send_to(connection_id, event)
    }

    /// Send an event to every open connection. Returns the delivery count.
    pub fn broadcast_all(&self, event: ServerEvent) -> usize {
        let mut sent = 0;
        for entry in self.inner.connections.iter() {
            if entry.sender.send(event.clone()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Send an event to every open connection except the origin
    pub fn broadcast_all_except(&self, origin: ConnectionId, event: ServerEvent) -> usize {
        let mut sent = 0;
        for entry in self.inner.connections.iter() {
            if *entry.key() != origin && entry.sender.send(event.clone()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Send an event to every open connection of one user
    pub fn broadcast_user(&self, user_id: &str, event: ServerEvent) -> usize {
        self.broadcast_user_inner(user_id, None, event)
    }

    /// Send an event to every open connection of one user except the
    /// originating connection
    pub fn broadcast_user_except(
        &self,
        user_id: &str,
        origin: ConnectionId,
        event: ServerEvent,
    ) -> usize {
        self.broadcast_user_inner(user_id, Some(origin), event)
    }

    fn broadcast_user_inner(
        &self,
        user_id: &str,
        origin: Option<ConnectionId>,
        event: ServerEvent,
    ) -> usize {
        let targets: Vec<ConnectionId> = match self.inner.users.get(user_id) {
            Some(set) => set.iter().copied().collect(),
            None => return 0,
        };

        let mut sent = 0;
        for connection_id in targets {
            if Some(connection_id) == origin {
                continue;
            }
            if self.send_to(connection_id, event.clone()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    fn remove_from_user_index(&self, user_id: &str, connection_id: ConnectionId) {
        if let Some(mut set) = self.inner.users.get_mut(user_id) {
            set.remove(&connection_id);
            let empty = set.is_empty();
            drop(set);
            if empty {
                self.inner
                    .users
                    .remove_if(user_id, |_, set| set.is_empty());
            }
        }
    }
}

/// Error type for send operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("connection not found")]
    ConnectionNotFound,
    #[error("device has no open connection")]
    DeviceNotConnected,
    #[error("connection closed")]
    ConnectionClosed,
}
