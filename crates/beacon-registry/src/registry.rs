//! The connection registry: who is connected, as whom, and where.
//!
//! Three indexes, each split into independently locked shards:
//!
//! ```text
//! rooms          UserId         → UserRoom { handles in join order }
//! connections    ConnectionId   → { handle, user room, conversations }
//! conversations  ConversationId → ConversationRoom { handles }
//! ```
//!
//! Lock order is rooms → connections → conversations. No code path acquires
//! a shard while holding one that comes later in that order.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use beacon_protocol::{ConversationId, Recipient, ServerEvent, UserId};
use beacon_transport::ConnectionId;
use tokio::sync::Mutex;

use crate::reconcile::{Reconciliation, reconcile};
use crate::room::ConversationRoom;
use crate::{ConnectionHandle, RegistryConfig, UserRoom};

/// Registry-side record of one live connection.
#[derive(Debug)]
pub(crate) struct ConnectionEntry {
    pub(crate) handle: ConnectionHandle,
    /// The user room this connection is currently a member of. `None` once
    /// the reconciler has evicted it.
    pub(crate) user_room: Option<UserId>,
    pub(crate) conversations: HashSet<ConversationId>,
}

/// A sharded map: one lock per shard.
pub(crate) struct Shards<K, V>(Box<[Mutex<HashMap<K, V>>]>);

impl<K, V> Shards<K, V> {
    fn new(count: usize) -> Self {
        Self((0..count.max(1)).map(|_| Mutex::new(HashMap::new())).collect())
    }

    pub(crate) fn get(&self, index: usize) -> &Mutex<HashMap<K, V>> {
        &self.0[index % self.0.len()]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Mutex<HashMap<K, V>>> {
        self.0.iter()
    }
}

impl<K: Hash, V> Shards<K, V> {
    pub(crate) fn for_key(&self, key: &K) -> &Mutex<HashMap<K, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        self.get(hasher.finish() as usize)
    }
}

/// Outcome of [`ConnectionRegistry::join`].
#[derive(Debug)]
pub struct JoinReport {
    /// `false` if the connection was already a member (the join was a
    /// no-op).
    pub joined: bool,

    /// Members the churn reconciler removed as part of this join.
    pub reconciliation: Reconciliation,
}

/// Maps each user to the set of live connections bound to them.
///
/// Built once at start-up and shared as `Arc<ConnectionRegistry>`; all
/// methods take `&self`.
///
/// # Invariants
///
/// - a connection is a member of at most one user room;
/// - after any `join` returns, a user room holds at most
///   `max_connections_per_user` members, all bound to that user;
/// - an empty user room does not exist.
pub struct ConnectionRegistry {
    config: RegistryConfig,
    pub(crate) rooms: Shards<UserId, UserRoom>,
    pub(crate) connections: Shards<ConnectionId, ConnectionEntry>,
    pub(crate) conversations: Shards<ConversationId, ConversationRoom>,
}

impl ConnectionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let config = config.validated();
        Self {
            rooms: Shards::new(config.shards),
            connections: Shards::new(config.shards),
            conversations: Shards::new(config.shards),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub(crate) fn connection_shard(
        &self,
        id: ConnectionId,
    ) -> &Mutex<HashMap<ConnectionId, ConnectionEntry>> {
        self.connections.get(id.into_inner() as usize)
    }

    /// Adds `handle` to the user room of `user_id`, creating the room if
    /// needed, then reconciles the room.
    ///
    /// Joining twice is a no-op. A connection already in another user's room
    /// is moved.
    pub async fn join(&self, user_id: &UserId, handle: ConnectionHandle) -> JoinReport {
        let connection_id = handle.id();

        let previous = self
            .connection_shard(connection_id)
            .lock()
            .await
            .get(&connection_id)
            .and_then(|entry| entry.user_room.clone());
        if let Some(previous) = previous.filter(|p| p != user_id) {
            self.remove_from_user_room(&previous, connection_id).await;
        }

        let mut rooms = self.rooms.for_key(user_id).lock().await;
        let room = rooms.entry(user_id.clone()).or_insert_with(|| {
            tracing::info!(%user_id, "user room created");
            UserRoom::new(user_id.clone())
        });

        let joined = room.members.insert(handle.clone());
        let reconciliation = if joined {
            reconcile(room, self.config.max_connections_per_user)
        } else {
            Reconciliation::default()
        };
        if room.is_empty() {
            rooms.remove(user_id);
            tracing::info!(%user_id, "user room dropped");
        }

        {
            let mut connections = self.connection_shard(connection_id).lock().await;
            let entry = connections
                .entry(connection_id)
                .or_insert_with(|| ConnectionEntry {
                    handle,
                    user_room: None,
                    conversations: HashSet::new(),
                });
            entry.user_room = Some(user_id.clone());
        }
        for evicted in reconciliation.evicted() {
            let mut connections = self.connection_shard(evicted.id()).lock().await;
            if let Some(entry) = connections.get_mut(&evicted.id()) {
                if entry.user_room.as_ref() == Some(user_id) {
                    entry.user_room = None;
                }
            }
        }
        drop(rooms);

        if joined {
            tracing::debug!(%user_id, %connection_id, "connection joined user room");
        }
        JoinReport {
            joined,
            reconciliation,
        }
    }

    /// Removes a connection from every room it is in. Returns `false` if the
    /// connection was not registered.
    ///
    /// Safe to call more than once, and after the reconciler has already
    /// evicted the connection.
    pub async fn leave(&self, connection_id: ConnectionId) -> bool {
        let entry = self
            .connection_shard(connection_id)
            .lock()
            .await
            .remove(&connection_id);
        let Some(entry) = entry else {
            return false;
        };

        if let Some(user_id) = &entry.user_room {
            self.remove_from_user_room(user_id, connection_id).await;
        }
        for conversation_id in &entry.conversations {
            self.remove_from_conversation(conversation_id, connection_id)
                .await;
        }
        tracing::debug!(%connection_id, "connection left registry");
        true
    }

    async fn remove_from_user_room(&self, user_id: &UserId, connection_id: ConnectionId) {
        let mut rooms = self.rooms.for_key(user_id).lock().await;
        let Some(room) = rooms.get_mut(user_id) else {
            return;
        };
        room.members.remove(connection_id);
        if room.is_empty() {
            rooms.remove(user_id);
            tracing::info!(%user_id, "user room dropped");
        }
    }

    /// Connection ids in the user room of `user_id`, oldest first. Empty if
    /// the user has no live connections.
    pub async fn members_of(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.rooms
            .for_key(user_id)
            .lock()
            .await
            .get(user_id)
            .map(UserRoom::connection_ids)
            .unwrap_or_default()
    }

    /// Returns `true` if a user room exists for `user_id`.
    pub async fn has_room(&self, user_id: &UserId) -> bool {
        self.rooms.for_key(user_id).lock().await.contains_key(user_id)
    }

    /// Sends `event` to every member of the recipient's room(s) and returns
    /// how many connections it reached.
    ///
    /// The shard lock is held while events are queued, so two deliveries to
    /// the same user are enqueued on every member in the same order.
    pub async fn deliver(&self, recipient: &Recipient, event: ServerEvent) -> usize {
        let event = Arc::new(event);
        let reached = match recipient {
            Recipient::User(user_id) => self.deliver_to_room(user_id, &event).await,
            Recipient::Broadcast => {
                let mut reached = 0;
                for shard in self.rooms.iter() {
                    let rooms = shard.lock().await;
                    reached += rooms.values().map(|room| room.deliver(&event)).sum::<usize>();
                }
                reached
            }
        };
        if reached == 0 {
            tracing::debug!(%recipient, "delivery miss: no live connections");
        }
        reached
    }

    async fn deliver_to_room(&self, user_id: &UserId, event: &Arc<ServerEvent>) -> usize {
        self.rooms
            .for_key(user_id)
            .lock()
            .await
            .get(user_id)
            .map_or(0, |room| room.deliver(event))
    }

    /// Number of users with at least one live connection.
    pub async fn user_count(&self) -> usize {
        let mut count = 0;
        for shard in self.rooms.iter() {
            count += shard.lock().await.len();
        }
        count
    }

    /// Number of connections currently in a user room.
    pub async fn connection_count(&self) -> usize {
        let mut count = 0;
        for shard in self.rooms.iter() {
            count += shard.lock().await.values().map(UserRoom::len).sum::<usize>();
        }
        count
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
