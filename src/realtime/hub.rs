//! In-process room registry for the realtime gateway.
//!
//! Connections subscribe to named rooms; `emit` fans an event out to every
//! live member. Delivery is at-most-once: each connection has a bounded
//! queue, events that do not fit are dropped, and closed connections are
//! pruned.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use serde::Serialize;
use tokio::sync::{
    RwLock,
    mpsc::{self, error::TrySendError},
};
use uuid::Uuid;

pub type ConnectionId = Uuid;

pub const SELLERS_ROOM: &str = "sellers";

/// Events a connection may have queued before new ones are dropped.
pub const CONNECTION_QUEUE: usize = 64;

pub fn user_room(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

pub fn conversation_room(conversation_id: Uuid) -> String {
    format!("support:{conversation_id}")
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServerEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl ServerEvent {
    pub fn new(event: &str, data: impl Serialize) -> Self {
        Self {
            event: event.to_string(),
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", serde_json::json!({ "message": message.into() }))
    }
}

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

#[derive(Clone, Default)]
pub struct ChatHub {
    inner: Arc<RwLock<HubInner>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and hand back the receiving end of its queue.
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(CONNECTION_QUEUE);
        let id = Uuid::new_v4();
        self.inner.write().await.connections.insert(id, tx);
        (id, rx)
    }

    pub async fn disconnect(&self, conn: ConnectionId) {
        let mut inner = self.inner.write().await;
        inner.connections.remove(&conn);
        inner.rooms.retain(|_, members| {
            members.remove(&conn);
            !members.is_empty()
        });
    }

    pub async fn join(&self, conn: ConnectionId, room: &str) {
        let mut inner = self.inner.write().await;
        if !inner.connections.contains_key(&conn) {
            return;
        }
        inner.rooms.entry(room.to_string()).or_default().insert(conn);
    }

    pub async fn leave(&self, conn: ConnectionId, room: &str) {
        let mut inner = self.inner.write().await;
        if let Some(members) = inner.rooms.get_mut(room) {
            members.remove(&conn);
            if members.is_empty() {
                inner.rooms.remove(room);
            }
        }
    }

    /// Send to one connection only.
    pub async fn send_to(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        let inner = self.inner.read().await;
        inner
            .connections
            .get(&conn)
            .is_some_and(|tx| tx.try_send(event).is_ok())
    }

    /// Fan out to every member of `room`. Returns how many connections
    /// accepted the event.
    pub async fn emit(&self, room: &str, event: ServerEvent) -> usize {
        self.emit_except(room, event, None).await
    }

    pub async fn emit_except(
        &self,
        room: &str,
        event: ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        self.emit_rooms(&[room], event, except).await
    }

    /// Fan out to the union of several rooms; a connection that sits in
    /// more than one of them still gets the event once.
    pub async fn emit_rooms(
        &self,
        rooms: &[&str],
        event: ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0;
        {
            let inner = self.inner.read().await;
            let targets: HashSet<ConnectionId> = rooms
                .iter()
                .filter_map(|room| inner.rooms.get(*room))
                .flatten()
                .copied()
                .filter(|conn| Some(*conn) != except)
                .collect();
            for conn in targets {
                let Some(tx) = inner.connections.get(&conn) else {
                    dead.push(conn);
                    continue;
                };
                match tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::debug!(%conn, event = %event.event, "connection queue full, event dropped");
                    }
                    Err(TrySendError::Closed(_)) => dead.push(conn),
                }
            }
        }

        for conn in dead {
            self.disconnect(conn).await;
        }
        delivered
    }

    pub async fn room_size(&self, room: &str) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .get(room)
            .map_or(0, HashSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_reaches_only_room_members() {
        let hub = ChatHub::new();
        let (a, mut rx_a) = hub.connect().await;
        let (b, mut rx_b) = hub.connect().await;
        hub.join(a, "support:1").await;
        hub.join(b, "user:2").await;

        let delivered = hub
            .emit("support:1", ServerEvent::new("support_new_message", "hi"))
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(rx_a.recv().await.map(|e| e.event), Some("support_new_message".into()));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_connections_are_pruned() {
        let hub = ChatHub::new();
        let (a, rx_a) = hub.connect().await;
        hub.join(a, SELLERS_ROOM).await;
        drop(rx_a);

        let delivered = hub.emit(SELLERS_ROOM, ServerEvent::new("ping", ())).await;
        assert_eq!(delivered, 0);
        assert_eq!(hub.room_size(SELLERS_ROOM).await, 0);
    }

    #[tokio::test]
    async fn emit_except_skips_the_sender() {
        let hub = ChatHub::new();
        let (a, mut rx_a) = hub.connect().await;
        let (b, mut rx_b) = hub.connect().await;
        hub.join(a, "support:x").await;
        hub.join(b, "support:x").await;

        hub.emit_except("support:x", ServerEvent::new("support_typing", true), Some(a))
            .await;

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn emit_rooms_delivers_once_per_connection() {
        let hub = ChatHub::new();
        let (seller, mut rx_seller) = hub.connect().await;
        let (customer, mut rx_customer) = hub.connect().await;
        hub.join(seller, SELLERS_ROOM).await;
        hub.join(seller, "support:c1").await;
        hub.join(customer, "support:c1").await;

        let delivered = hub
            .emit_rooms(
                &["support:c1", SELLERS_ROOM],
                ServerEvent::new("support_new_message", "xin chào"),
                Some(customer),
            )
            .await;

        assert_eq!(delivered, 1);
        assert!(rx_seller.recv().await.is_some());
        assert!(rx_seller.try_recv().is_err());
        assert!(rx_customer.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_connection_drops_overflow_but_stays_joined() {
        let hub = ChatHub::new();
        let (slow, mut rx_slow) = hub.connect().await;
        hub.join(slow, "user:slow").await;

        for i in 0..CONNECTION_QUEUE {
            assert_eq!(hub.emit("user:slow", ServerEvent::new("notification", i)).await, 1);
        }
        assert_eq!(hub.emit("user:slow", ServerEvent::new("notification", "extra")).await, 0);
        assert_eq!(hub.room_size("user:slow").await, 1);

        let first = rx_slow.recv().await.map(|e| e.data);
        assert_eq!(first, Some(serde_json::json!(0)));
        assert_eq!(hub.emit("user:slow", ServerEvent::new("notification", "later")).await, 1);
    }

    #[tokio::test]
    async fn disconnect_removes_memberships() {
        let hub = ChatHub::new();
        let (a, _rx) = hub.connect().await;
        hub.join(a, "user:1").await;
        hub.join(a, SELLERS_ROOM).await;
        hub.disconnect(a).await;

        assert_eq!(hub.room_size("user:1").await, 0);
        assert_eq!(hub.room_size(SELLERS_ROOM).await, 0);
    }
}
