//! Live session registry
//!
//! Maps a session id to at most one open notification connection. Delivery is
//! best-effort and at-most-once: a message for a session with no connection
//! is dropped, never buffered.

use contentflow_common::NotificationMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};

/// Identifies one registration, so a stale close can't remove a newer one
pub type ConnectionId = u64;

struct Connection {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<NotificationMessage>,
}

#[derive(Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    connections: RwLock<HashMap<String, Connection>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `session_id`, replacing any existing one
    ///
    /// The replaced connection's receiver observes end-of-stream.
    pub async fn open(
        &self,
        session_id: &str,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<NotificationMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        let replaced = self
            .connections
            .write()
            .await
            .insert(session_id.to_string(), Connection { id, sender });

        if let Some(old) = replaced {
            tracing::debug!(
                session_id,
                old_connection = old.id,
                new_connection = id,
                "Session connection replaced"
            );
        }

        (id, receiver)
    }

    /// Deliver a message if the session has an open connection
    ///
    /// Returns whether the message was handed to a live connection.
    pub async fn push(&self, session_id: &str, message: NotificationMessage) -> bool {
        let connections = self.connections.read().await;
        match connections.get(session_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => {
                tracing::trace!(session_id, kind = message.kind.as_str(), "No connection, message dropped");
                false
            }
        }
    }

    /// Deregister `connection_id` if it is still the session's connection
    pub async fn close(&self, session_id: &str, connection_id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(session_id) {
            Some(conn) if conn.id == connection_id => {
                connections.remove(session_id);
                true
            }
            _ => false,
        }
    }

    pub async fn is_open(&self, session_id: &str) -> bool {
        self.connections.read().await.contains_key(session_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
