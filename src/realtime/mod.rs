//! Real-time fan-out.
//!
//! [`RealtimeHub`] keeps the registry of live connections and their rooms and
//! exposes the fire-and-forget dispatch API the handlers call after a write
//! commits. A hub runs in one of two modes:
//!
//! - `Local`: events reach only this process's sockets.
//! - `Clustered`: events are also published through a [`PubSubBridge`] so
//!   sockets held by other processes receive them.
//!
//! The mode is decided once at [`RealtimeHub::init`] and never retried.

pub mod bridge;
pub mod events;
pub mod rooms;
pub mod socket;

use futures::StreamExt;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::auth::SessionIdentity;
use crate::roles::RoleRoom;

pub use bridge::{
    BridgeLink, Envelope, InMemoryBridge, PubSubBridge, RealtimeError, RedisBridge, Target,
};
pub use rooms::{Room, rooms_for};

/// Events queued per connection before further events to it are dropped.
/// A socket whose client stops reading falls behind here, not in memory.
pub const CONNECTION_BUFFER: usize = 256;

/// HubMode
///
/// Lifecycle of a hub: `Uninitialized -> Local | Clustered -> ShutDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubMode {
    Uninitialized,
    Local,
    Clustered,
    ShutDown,
}

/// An event as handed to one connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveredEvent {
    pub event: String,
    pub payload: JsonValue,
}

enum HubState {
    Uninitialized,
    Local,
    Clustered {
        outbound: mpsc::UnboundedSender<Envelope>,
        relay: JoinHandle<()>,
    },
    ShutDown,
}

impl HubState {
    fn mode(&self) -> HubMode {
        match self {
            HubState::Uninitialized => HubMode::Uninitialized,
            HubState::Local => HubMode::Local,
            HubState::Clustered { .. } => HubMode::Clustered,
            HubState::ShutDown => HubMode::ShutDown,
        }
    }
}

#[derive(Default)]
struct Registry {
    connections: HashMap<u64, mpsc::Sender<Arc<DeliveredEvent>>>,
    rooms: HashMap<Room, HashSet<u64>>,
}

struct HubInner {
    node_id: Uuid,
    state: RwLock<HubState>,
    registry: RwLock<Registry>,
    next_connection: AtomicU64,
}

impl HubInner {
    /// Delivers to every local connection addressed by `target`. A connection
    /// in several of the targeted rooms receives the event once.
    fn deliver_local(&self, target: &Target, event: &str, payload: &JsonValue) {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);

        let recipients: BTreeSet<u64> = match target {
            Target::All => registry.connections.keys().copied().collect(),
            Target::Rooms(rooms) => rooms
                .iter()
                .filter_map(|room| registry.rooms.get(room))
                .flatten()
                .copied()
                .collect(),
        };
        if recipients.is_empty() {
            return;
        }

        let delivered = Arc::new(DeliveredEvent {
            event: event.to_string(),
            payload: payload.clone(),
        });
        for id in recipients {
            let Some(tx) = registry.connections.get(&id) else {
                continue;
            };
            match tx.try_send(delivered.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(connection = id, event, "socket queue full, event dropped");
                }
                // Connection mid-teardown; its Drop unregisters it.
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    fn unregister(&self, id: u64, rooms: &[Room]) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.connections.remove(&id);
        for room in rooms {
            if let Some(members) = registry.rooms.get_mut(room) {
                members.remove(&id);
                if members.is_empty() {
                    registry.rooms.remove(room);
                }
            }
        }
    }
}

/// RealtimeHub
///
/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                node_id: Uuid::new_v4(),
                state: RwLock::new(HubState::Uninitialized),
                registry: RwLock::new(Registry::default()),
                next_connection: AtomicU64::new(1),
            }),
        }
    }

    /// Identifies this process on the shared channel.
    pub fn node_id(&self) -> Uuid {
        self.inner.node_id
    }

    pub fn mode(&self) -> HubMode {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner).mode()
    }

    /// init
    ///
    /// Brings the hub up. With no bridge the hub runs `Local`. Otherwise the
    /// connection attempt is bounded by `connect_timeout`; on timeout or error
    /// the hub runs `Local` for the rest of the process lifetime.
    /// Calling `init` on a hub that has already left `Uninitialized` changes nothing.
    pub async fn init(
        &self,
        bridge: Option<&dyn PubSubBridge>,
        connect_timeout: Duration,
    ) -> HubMode {
        let current = self.mode();
        if current != HubMode::Uninitialized {
            tracing::warn!(mode = ?current, "realtime hub already initialized");
            return current;
        }

        let link = match bridge {
            None => {
                tracing::info!("no pub/sub bridge configured, realtime running local-only");
                None
            }
            Some(bridge) => match tokio::time::timeout(connect_timeout, bridge.connect()).await {
                Ok(Ok(link)) => Some(link),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "pub/sub bridge unavailable, running local-only");
                    None
                }
                Err(_) => {
                    let e = RealtimeError::Timeout(connect_timeout);
                    tracing::warn!(error = %e, "pub/sub bridge unavailable, running local-only");
                    None
                }
            },
        };

        let next = match link {
            None => HubState::Local,
            Some(BridgeLink { outbound, inbound }) => HubState::Clustered {
                outbound,
                relay: tokio::spawn(relay(Arc::downgrade(&self.inner), inbound)),
            },
        };

        let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*state, HubState::Uninitialized) {
            if let HubState::Clustered { relay, .. } = &next {
                relay.abort();
            }
            return state.mode();
        }
        *state = next;
        let mode = state.mode();
        tracing::info!(node_id = %self.inner.node_id, ?mode, "realtime hub started");
        mode
    }

    /// shutdown
    ///
    /// Stops the relay, drops the bridge and disconnects every local
    /// connection. Dispatch after shutdown is a no-op.
    pub fn shutdown(&self) {
        let previous = {
            let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, HubState::ShutDown)
        };
        if let HubState::Clustered { relay, .. } = previous {
            relay.abort();
        }

        let mut registry = self.inner.registry.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = registry.connections.len();
        *registry = Registry::default();
        tracing::info!(dropped, "realtime hub shut down");
    }

    // --- Connections ---

    /// join
    ///
    /// Registers a connection for `identity` in all of its rooms before
    /// returning, so nothing emitted afterwards can miss it.
    pub fn join(&self, identity: &SessionIdentity) -> Result<Connection, RealtimeError> {
        if !matches!(self.mode(), HubMode::Local | HubMode::Clustered) {
            return Err(RealtimeError::NotRunning);
        }

        let rooms = rooms_for(identity);
        let id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        let (tx, receiver) = mpsc::channel(CONNECTION_BUFFER);

        {
            let mut registry = self.inner.registry.write().unwrap_or_else(PoisonError::into_inner);
            registry.connections.insert(id, tx);
            for room in &rooms {
                registry.rooms.entry(*room).or_default().insert(id);
            }
        }

        tracing::debug!(connection = id, subject = %identity.subject_id, ?rooms, "socket joined");
        Ok(Connection {
            id,
            rooms,
            receiver,
            hub: Arc::downgrade(&self.inner),
        })
    }

    pub fn connection_count(&self) -> usize {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .connections
            .len()
    }

    pub fn room_size(&self, room: &Room) -> usize {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rooms
            .get(room)
            .map_or(0, HashSet::len)
    }

    // --- Dispatch ---

    pub fn emit_to_room(&self, room: Room, event: &str, payload: impl Serialize) {
        self.dispatch(Target::Rooms(vec![room]), event, payload);
    }

    pub fn emit_to_rooms(
        &self,
        rooms: impl IntoIterator<Item = Room>,
        event: &str,
        payload: impl Serialize,
    ) {
        self.dispatch(Target::Rooms(rooms.into_iter().collect()), event, payload);
    }

    pub fn emit_to_all(&self, event: &str, payload: impl Serialize) {
        self.dispatch(Target::All, event, payload);
    }

    pub fn emit_to_user(&self, user_id: Uuid, event: &str, payload: impl Serialize) {
        self.emit_to_room(Room::User(user_id), event, payload);
    }

    pub fn emit_to_customer(&self, customer_id: Uuid, event: &str, payload: impl Serialize) {
        self.emit_to_room(Room::Customer(customer_id), event, payload);
    }

    pub fn emit_to_role(&self, role: RoleRoom, event: &str, payload: impl Serialize) {
        self.emit_to_room(Room::Role(role), event, payload);
    }

    fn dispatch(&self, target: Target, event: &str, payload: impl Serialize) {
        let outbound = {
            let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
            match &*state {
                HubState::Local => None,
                HubState::Clustered { outbound, .. } => Some(outbound.clone()),
                HubState::Uninitialized | HubState::ShutDown => {
                    tracing::debug!(event, "realtime hub not running, event dropped");
                    return;
                }
            }
        };

        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(event, error = %e, "event payload not serializable, dropped");
                return;
            }
        };

        self.inner.deliver_local(&target, event, &payload);

        if let Some(outbound) = outbound {
            let envelope = Envelope {
                origin: self.inner.node_id,
                target,
                event: event.to_string(),
                payload,
            };
            if outbound.send(envelope).is_err() {
                tracing::warn!(event, "bridge publisher stopped, event delivered locally only");
            }
        }
    }
}

/// Re-broadcasts envelopes published by other processes.
async fn relay(hub: Weak<HubInner>, mut inbound: futures::stream::BoxStream<'static, Envelope>) {
    while let Some(envelope) = inbound.next().await {
        let Some(inner) = hub.upgrade() else {
            return;
        };
        if envelope.origin == inner.node_id {
            continue;
        }
        inner.deliver_local(&envelope.target, &envelope.event, &envelope.payload);
    }
    tracing::warn!("pub/sub subscription ended, cross-process delivery stopped");
}

/// Connection
///
/// One registered socket. Dropping it leaves every room.
pub struct Connection {
    id: u64,
    rooms: Vec<Room>,
    receiver: mpsc::Receiver<Arc<DeliveredEvent>>,
    hub: Weak<HubInner>,
}

impl Connection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    /// Next event for this connection. `None` once the hub has shut down.
    pub async fn recv(&mut self) -> Option<Arc<DeliveredEvent>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<DeliveredEvent>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unregister(self.id, &self.rooms);
            tracing::debug!(connection = self.id, "socket left");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn identity(role: &str, customer_id: Option<Uuid>) -> SessionIdentity {
        SessionIdentity {
            subject_id: Uuid::new_v4(),
            email: "socket@example.com".into(),
            role: role.into(),
            customer_id,
            issued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn join_is_refused_before_init() {
        let hub = RealtimeHub::new();
        assert!(matches!(hub.join(&identity("owner", None)), Err(RealtimeError::NotRunning)));
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn overlapping_rooms_deliver_once() {
        let hub = RealtimeHub::new();
        hub.init(None, Duration::from_millis(10)).await;

        let customer = Uuid::new_v4();
        let who = identity("manager", Some(customer));
        let mut conn = hub.join(&who).unwrap();

        hub.emit_to_rooms(
            [Room::User(who.subject_id), Room::Customer(customer), Room::Role(RoleRoom::Managers)],
            "manager:assigned",
            json!({ "n": 1 }),
        );

        assert_eq!(conn.recv().await.unwrap().event, "manager:assigned");
        assert!(conn.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropping_a_connection_leaves_its_rooms() {
        let hub = RealtimeHub::new();
        hub.init(None, Duration::from_millis(10)).await;

        let who = identity("tenant", Some(Uuid::new_v4()));
        let conn = hub.join(&who).unwrap();
        assert_eq!(hub.room_size(&Room::User(who.subject_id)), 1);

        drop(conn);
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.room_size(&Room::User(who.subject_id)), 0);
    }

    #[tokio::test]
    async fn a_stalled_connection_drops_overflow_without_affecting_others() {
        let hub = RealtimeHub::new();
        hub.init(None, Duration::from_millis(10)).await;

        let customer = Uuid::new_v4();
        let mut stalled = hub.join(&identity("owner", Some(customer))).unwrap();
        let mut reader = hub.join(&identity("tenant", Some(customer))).unwrap();

        let mut read = 0;
        for n in 0..CONNECTION_BUFFER + 10 {
            hub.emit_to_customer(customer, "property:updated", json!({ "n": n }));
            while reader.try_recv().is_some() {
                read += 1;
            }
        }
        assert_eq!(read, CONNECTION_BUFFER + 10);

        let mut queued = Vec::new();
        while let Some(event) = stalled.try_recv() {
            queued.push(event.payload["n"].as_u64().unwrap());
        }
        assert_eq!(queued.len(), CONNECTION_BUFFER);
        assert_eq!(queued.first(), Some(&0));
        assert_eq!(queued.last(), Some(&(CONNECTION_BUFFER as u64 - 1)));

        // Once drained, delivery resumes.
        hub.emit_to_customer(customer, "property:updated", json!({ "n": "late" }));
        assert_eq!(stalled.try_recv().unwrap().payload["n"], "late");
    }

    #[tokio::test]
    async fn shutdown_closes_connections() {
        let hub = RealtimeHub::new();
        hub.init(None, Duration::from_millis(10)).await;
        let mut conn = hub.join(&identity("owner", Some(Uuid::new_v4()))).unwrap();

        hub.shutdown();
        assert_eq!(hub.mode(), HubMode::ShutDown);
        assert!(conn.recv().await.is_none());
        hub.emit_to_all("property:updated", json!({}));
    }
}
