//! Registry of live WebSocket connections.
//!
//! # Responsibilities
//! - Track connections from handshake until their worker exits
//! - Broadcast to everyone, or to authenticated users only
//! - Report presence (online identities, open count)
//!
//! # Design Decisions
//! - A mutex guards the list; broadcasts copy a snapshot under the lock and
//!   write after releasing it, so no socket I/O happens while locked
//! - Closed or failing connections found during a broadcast are evicted after
//!   the pass over the snapshot
//! - Add and remove are keyed by connection id and idempotent

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::Serialize;

use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::websocket::connection::WsConnection;
use crate::websocket::error::WsError;
use crate::websocket::frame::Frame;

#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<Vec<Arc<WsConnection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<WsConnection>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection. Returns `false` if it was already registered.
    pub fn add(&self, connection: Arc<WsConnection>) -> bool {
        let mut connections = self.lock();
        if connections.iter().any(|c| c.id() == connection.id()) {
            return false;
        }
        connections.push(connection);
        metrics::set_ws_connections(connections.len());
        true
    }

    /// Unregister a connection. Removing an absent id is a no-op.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let mut connections = self.lock();
        let before = connections.len();
        connections.retain(|c| c.id() != id);
        metrics::set_ws_connections(connections.len());
        connections.len() != before
    }

    /// Point-in-time copy of the registered connections.
    pub fn snapshot(&self) -> Vec<Arc<WsConnection>> {
        self.lock().clone()
    }

    /// Number of registered connections, open or not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Send to every open connection except `exclude`. Returns the number of
    /// connections the message was written to.
    pub async fn broadcast<T>(&self, message: &T, exclude: Option<ConnectionId>) -> Result<usize, WsError>
    where
        T: Serialize + ?Sized,
    {
        let frame = encode_text(message)?;
        Ok(self
            .deliver(frame, "all", |conn| Some(conn.id()) != exclude)
            .await)
    }

    /// Send to every open connection with a bound identity.
    pub async fn broadcast_to_authenticated<T>(&self, message: &T) -> Result<usize, WsError>
    where
        T: Serialize + ?Sized,
    {
        let frame = encode_text(message)?;
        Ok(self
            .deliver(frame, "authenticated", |conn| conn.identity().is_some())
            .await)
    }

    async fn deliver<F>(&self, frame: Bytes, scope: &'static str, include: F) -> usize
    where
        F: Fn(&WsConnection) -> bool,
    {
        let mut delivered = 0;
        let mut evicted = Vec::new();

        for conn in self.snapshot() {
            if conn.is_closed() {
                evicted.push(conn.id());
                continue;
            }
            if !include(&conn) {
                continue;
            }
            match conn.send_raw(&frame).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(connection_id = %conn.id(), error = %e, "Broadcast delivery failed");
                    conn.mark_closed();
                    evicted.push(conn.id());
                }
            }
        }

        for id in evicted {
            if self.remove(id) {
                tracing::debug!(connection_id = %id, "Evicted closed connection");
            }
        }

        metrics::record_broadcast(scope);
        delivered
    }

    /// Sorted, de-duplicated identities of open connections.
    pub fn online_users(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|c| !c.is_closed())
            .filter_map(|c| c.identity().map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of registered connections not marked closed.
    pub fn open_count(&self) -> usize {
        self.lock().iter().filter(|c| !c.is_closed()).count()
    }

    /// First open connection bound to `identity`.
    pub fn find_by_identity(&self, identity: &str) -> Option<Arc<WsConnection>> {
        self.lock()
            .iter()
            .find(|c| !c.is_closed() && c.identity() == Some(identity))
            .cloned()
    }
}

fn encode_text<T: Serialize + ?Sized>(message: &T) -> Result<Bytes, WsError> {
    let text = serde_json::to_string(message)?;
    Ok(Frame::text(text).encode())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;
    use crate::websocket::frame::{decode, DecodeOutcome};

    fn connection(identity: Option<&str>) -> (Arc<WsConnection>, DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        let conn = WsConnection::new(ConnectionId::new(), identity.map(str::to_string), server);
        (Arc::new(conn), client)
    }

    async fn read_text(client: &mut DuplexStream) -> Option<String> {
        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(Duration::from_millis(100), client.read(&mut buf))
            .await
            .ok()?
            .ok()?;
        match decode(&buf[..n]).ok()? {
            DecodeOutcome::Complete { frame, .. } => String::from_utf8(frame.payload.to_vec()).ok(),
            DecodeOutcome::Incomplete => None,
        }
    }

    #[tokio::test]
    async fn add_and_remove_are_idempotent() {
        let registry = ConnectionRegistry::new();
        let (c1, _k1) = connection(None);

        assert!(registry.add(c1.clone()));
        assert!(!registry.add(c1.clone()));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(c1.id()));
        assert!(!registry.remove(c1.id()));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn broadcast_skips_and_evicts_closed() {
        let registry = ConnectionRegistry::new();
        let (c1, mut k1) = connection(Some("alice"));
        let (c2, mut k2) = connection(Some("bob"));
        registry.add(c1.clone());
        registry.add(c2.clone());

        c1.mark_closed();
        let delivered = registry.broadcast(&json!({"type": "chat"}), None).await.unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(read_text(&mut k2).await.as_deref(), Some(r#"{"type":"chat"}"#));
        assert_eq!(read_text(&mut k1).await, None);
        assert_eq!(registry.open_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn broadcast_honours_exclude() {
        let registry = ConnectionRegistry::new();
        let (c1, mut k1) = connection(None);
        let (c2, mut k2) = connection(None);
        registry.add(c1.clone());
        registry.add(c2.clone());

        let delivered = registry.broadcast("hi", Some(c1.id())).await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(read_text(&mut k1).await, None);
        assert_eq!(read_text(&mut k2).await.as_deref(), Some("\"hi\""));
    }

    #[tokio::test]
    async fn failed_send_evicts() {
        let registry = ConnectionRegistry::new();
        let (c1, k1) = connection(None);
        let (c2, _k2) = connection(None);
        registry.add(c1.clone());
        registry.add(c2.clone());
        drop(k1);

        let delivered = registry.broadcast(&json!({}), None).await.unwrap();
        assert_eq!(delivered, 1);
        assert!(c1.is_closed());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn authenticated_broadcast_skips_guests() {
        let registry = ConnectionRegistry::new();
        let (guest, mut kg) = connection(None);
        let (alice, mut ka) = connection(Some("alice"));
        registry.add(guest);
        registry.add(alice);

        let delivered = registry.broadcast_to_authenticated(&json!({"n": 1})).await.unwrap();
        assert_eq!(delivered, 1);
        assert!(read_text(&mut ka).await.is_some());
        assert_eq!(read_text(&mut kg).await, None);
    }

    #[tokio::test]
    async fn presence_is_sorted_and_unique() {
        let registry = ConnectionRegistry::new();
        let (bob, _kb) = connection(Some("bob"));
        let (alice1, _ka1) = connection(Some("alice"));
        let (alice2, _ka2) = connection(Some("alice"));
        let (guest, _kg) = connection(None);
        let (carol, _kc) = connection(Some("carol"));
        for conn in [&bob, &alice1, &alice2, &guest, &carol] {
            registry.add(conn.clone());
        }
        carol.mark_closed();

        assert_eq!(registry.online_users(), vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(registry.open_count(), 4);
        assert_eq!(registry.find_by_identity("alice").map(|c| c.id()), Some(alice1.id()));
        assert!(registry.find_by_identity("carol").is_none());
    }

    #[tokio::test]
    async fn concurrent_mutation_is_safe() {
        let registry = ConnectionRegistry::new();
        let mut tasks = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (conn, _client) = connection(Some(&format!("user{}", i % 4)));
                registry.add(conn.clone());
                let _ = registry.broadcast(&json!({"i": i}), Some(conn.id())).await;
                registry.remove(conn.id());
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(registry.is_empty());
    }
}
