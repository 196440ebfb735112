//! Rooms: ordered sets of live connection handles.
//!
//! A **user room** holds every live connection of one user; its name is the
//! user id. A **conversation room** holds the connections currently viewing
//! one conversation. Both are plain member lists. The registry wraps them in
//! locks and keeps the indexes that point into them.

use std::sync::Arc;

use beacon_protocol::{ServerEvent, UserId};
use beacon_session::Session;
use beacon_transport::ConnectionId;
use tokio::sync::mpsc;

/// What the registry pushes to a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// An event to serialize and send. Shared so a broadcast encodes from
    /// one allocation.
    Event(Arc<ServerEvent>),

    /// Close the connection with this code. Nothing queued after a close is
    /// sent.
    Close { code: u16, reason: String },
}

/// Sending half of a connection's outbound queue.
pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

/// Receiving half of a connection's outbound queue, drained by the
/// connection's writer task.
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

// ---------------------------------------------------------------------------
// ConnectionHandle
// ---------------------------------------------------------------------------

/// A live connection as the registry sees it: its session plus the queue
/// its writer task drains.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    session: Arc<Session>,
    sender: OutboundSender,
}

impl ConnectionHandle {
    pub fn new(session: Session, sender: OutboundSender) -> Self {
        Self {
            session: Arc::new(session),
            sender,
        }
    }

    /// Creates a handle together with the receiver its writer should drain.
    pub fn channel(session: Session) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(session, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.session.connection_id
    }

    /// The identity this connection is bound to.
    pub fn user_id(&self) -> &UserId {
        &self.session.user_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Queues an event. Returns `false` if the writer is gone (the
    /// connection is mid-close).
    pub fn send_event(&self, event: Arc<ServerEvent>) -> bool {
        self.push(Outbound::Event(event))
    }

    /// Asks the writer to close the connection with `code`.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        self.push(Outbound::Close {
            code,
            reason: reason.into(),
        })
    }

    /// Returns `true` once the writer task has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn push(&self, item: Outbound) -> bool {
        self.sender.send(item).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Member lists
// ---------------------------------------------------------------------------

/// Connection handles in join order. A connection appears at most once.
#[derive(Debug, Default)]
pub(crate) struct Members(Vec<ConnectionHandle>);

impl Members {
    pub(crate) fn contains(&self, id: ConnectionId) -> bool {
        self.0.iter().any(|h| h.id() == id)
    }

    /// Appends `handle` unless its connection is already a member.
    pub(crate) fn insert(&mut self, handle: ConnectionHandle) -> bool {
        if self.contains(handle.id()) {
            return false;
        }
        self.0.push(handle);
        true
    }

    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<ConnectionHandle> {
        let index = self.0.iter().position(|h| h.id() == id)?;
        Some(self.0.remove(index))
    }

    /// Removes and returns every member matching `pred`, oldest first.
    pub(crate) fn drain_where(
        &mut self,
        mut pred: impl FnMut(&ConnectionHandle) -> bool,
    ) -> Vec<ConnectionHandle> {
        let (drained, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.0).into_iter().partition(|h| pred(h));
        self.0 = kept;
        drained
    }

    /// Removes and returns the `count` oldest members.
    pub(crate) fn drain_oldest(&mut self, count: usize) -> Vec<ConnectionHandle> {
        let count = count.min(self.0.len());
        self.0.drain(..count).collect()
    }

    pub(crate) fn ids(&self) -> Vec<ConnectionId> {
        self.0.iter().map(ConnectionHandle::id).collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.0.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Queues `event` on every handle except `skip`; returns how many accepted.
fn fan_out<'a>(
    members: impl Iterator<Item = &'a ConnectionHandle>,
    event: &Arc<ServerEvent>,
    skip: Option<ConnectionId>,
) -> usize {
    let mut delivered = 0;
    for handle in members {
        if Some(handle.id()) == skip {
            continue;
        }
        if handle.send_event(Arc::clone(event)) {
            delivered += 1;
        } else {
            tracing::debug!(connection_id = %handle.id(), "skipping closed connection");
        }
    }
    delivered
}

// ---------------------------------------------------------------------------
// UserRoom
// ---------------------------------------------------------------------------

/// All live connections of one user, oldest first.
#[derive(Debug)]
pub struct UserRoom {
    user_id: UserId,
    pub(crate) members: Members,
}

impl UserRoom {
    pub(crate) fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            members: Members::default(),
        }
    }

    /// The room's name.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.members.ids()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn deliver(&self, event: &Arc<ServerEvent>) -> usize {
        fan_out(self.members.iter(), event, None)
    }
}

// ---------------------------------------------------------------------------
// ConversationRoom
// ---------------------------------------------------------------------------

/// Connections currently viewing one conversation.
#[derive(Debug)]
pub(crate) struct ConversationRoom {
    pub(crate) members: Members,
}

impl ConversationRoom {
    pub(crate) fn new() -> Self {
        Self {
            members: Members::default(),
        }
    }

    /// Sends to every member but `sender`.
    pub(crate) fn relay(&self, event: &Arc<ServerEvent>, sender: ConnectionId) -> usize {
        fan_out(self.members.iter(), event, Some(sender))
    }
}

#[cfg(test)]
mod tests {
    use beacon_session::Identity;

    use super::*;

    fn handle(id: u64, user: &str) -> (ConnectionHandle, OutboundReceiver) {
        let session = Session::bind(ConnectionId::new(id), Identity::new(user, user));
        ConnectionHandle::channel(session)
    }

    #[test]
    fn test_members_insert_is_idempotent() {
        let (h, _rx) = handle(1, "alice");
        let mut members = Members::default();
        assert!(members.insert(h.clone()));
        assert!(!members.insert(h));
        assert_eq!(members.len(), 1);
    }

    #[test]
    fn test_members_drain_oldest_keeps_newest() {
        let mut members = Members::default();
        let mut receivers = Vec::new();
        for id in 1..=4 {
            let (h, rx) = handle(id, "alice");
            receivers.push(rx);
            members.insert(h);
        }
        let drained: Vec<_> = members.drain_oldest(3).iter().map(ConnectionHandle::id).collect();
        assert_eq!(drained, vec![ConnectionId::new(1), ConnectionId::new(2), ConnectionId::new(3)]);
        assert_eq!(members.ids(), vec![ConnectionId::new(4)]);
    }

    #[test]
    fn test_user_room_deliver_skips_closed_writers() {
        let (live, mut live_rx) = handle(1, "alice");
        let (dead, dead_rx) = handle(2, "alice");
        drop(dead_rx);

        let mut room = UserRoom::new("alice".into());
        room.members.insert(live);
        room.members.insert(dead);

        let event = Arc::new(ServerEvent::Pong {
            client_time: 1,
            server_time: 2,
        });
        assert_eq!(room.deliver(&event), 1);
        assert!(matches!(live_rx.try_recv(), Ok(Outbound::Event(_))));
    }

    #[test]
    fn test_conversation_relay_excludes_sender() {
        let (a, mut a_rx) = handle(1, "alice");
        let (b, mut b_rx) = handle(2, "bob");
        let mut room = ConversationRoom::new();
        room.members.insert(a);
        room.members.insert(b);

        let event = Arc::new(ServerEvent::NewMessage(serde_json::json!({"text": "hi"})));
        assert_eq!(room.relay(&event, ConnectionId::new(1)), 1);
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_ok());
    }
}
