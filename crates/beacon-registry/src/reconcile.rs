//! Churn reconciliation: keeping a user room honest on every join.
//!
//! Reconnects, duplicate tabs and half-dead sockets all show up the same
//! way, as one more member in a user room. After every join, while the
//! room's shard lock is still held, [`reconcile`] restores two rules:
//!
//! 1. every member is bound to the room's user;
//! 2. at most `max_per_user` members remain, newest kept.
//!
//! Members that break rule 1 are unlinked silently and their transport is
//! left alone. Members cut by rule 2 are told to close.

use beacon_protocol::UserId;
use beacon_transport::{CLOSE_SUPERSEDED, ConnectionId};

use crate::{ConnectionHandle, UserRoom};

/// What a reconciliation pass removed from a room.
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Members bound to a different user. Removed without a close.
    pub mismatched: Vec<ConnectionHandle>,

    /// Oldest members beyond the per-user limit. Each was sent a close.
    pub superseded: Vec<ConnectionHandle>,
}

impl Reconciliation {
    /// Returns `true` if nothing was evicted.
    pub fn is_clean(&self) -> bool {
        self.mismatched.is_empty() && self.superseded.is_empty()
    }

    /// Ids of every evicted connection, mismatched first.
    pub fn evicted_ids(&self) -> Vec<ConnectionId> {
        self.mismatched
            .iter()
            .chain(&self.superseded)
            .map(ConnectionHandle::id)
            .collect()
    }

    pub(crate) fn evicted(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.mismatched.iter().chain(&self.superseded)
    }
}

/// Runs both eviction rules on `room`. The caller holds the room's lock.
pub(crate) fn reconcile(room: &mut UserRoom, max_per_user: usize) -> Reconciliation {
    let owner: UserId = room.user_id().clone();

    let mismatched = room
        .members
        .drain_where(|handle| !handle.session().belongs_to(&owner));
    for handle in &mismatched {
        tracing::warn!(
            user_id = %owner,
            connection_id = %handle.id(),
            bound_to = %handle.user_id(),
            "room inconsistency: evicting connection bound to another user"
        );
    }

    let excess = room.len().saturating_sub(max_per_user.max(1));
    let superseded = room.members.drain_oldest(excess);
    for handle in &superseded {
        tracing::info!(
            user_id = %owner,
            connection_id = %handle.id(),
            "connection superseded by a newer one"
        );
        if !handle.close(CLOSE_SUPERSEDED, "superseded by a newer connection") {
            tracing::debug!(connection_id = %handle.id(), "superseded connection already closing");
        }
    }

    Reconciliation {
        mismatched,
        superseded,
    }
}

#[cfg(test)]
mod tests {
    use beacon_session::{Identity, Session};

    use super::*;
    use crate::{Outbound, OutboundReceiver};

    fn handle(id: u64, user: &str) -> (ConnectionHandle, OutboundReceiver) {
        let session = Session::bind(ConnectionId::new(id), Identity::new(user, user));
        ConnectionHandle::channel(session)
    }

    fn room_with(handles: &[&ConnectionHandle]) -> UserRoom {
        let mut room = UserRoom::new("alice".into());
        for h in handles {
            room.members.insert((*h).clone());
        }
        room
    }

    #[test]
    fn test_reconcile_clean_room_evicts_nothing() {
        let (c1, _rx1) = handle(1, "alice");
        let mut room = room_with(&[&c1]);
        let report = reconcile(&mut room, 1);
        assert!(report.is_clean());
        assert_eq!(room.connection_ids(), vec![ConnectionId::new(1)]);
    }

    #[test]
    fn test_reconcile_over_limit_closes_oldest() {
        let (c1, mut rx1) = handle(1, "alice");
        let (c2, mut rx2) = handle(2, "alice");
        let mut room = room_with(&[&c1, &c2]);

        let report = reconcile(&mut room, 1);

        assert_eq!(report.evicted_ids(), vec![ConnectionId::new(1)]);
        assert_eq!(room.connection_ids(), vec![ConnectionId::new(2)]);
        match rx1.try_recv() {
            Ok(Outbound::Close { code, .. }) => assert_eq!(code, CLOSE_SUPERSEDED),
            other => panic!("expected close, got {other:?}"),
        }
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_reconcile_mismatched_member_evicted_without_close() {
        let (c1, mut rx1) = handle(1, "mallory");
        let (c2, _rx2) = handle(2, "alice");
        let mut room = room_with(&[&c1, &c2]);

        let report = reconcile(&mut room, 5);

        assert_eq!(report.mismatched.len(), 1);
        assert!(report.superseded.is_empty());
        assert_eq!(room.connection_ids(), vec![ConnectionId::new(2)]);
        assert!(rx1.try_recv().is_err(), "mismatched member must not be closed");
    }

    #[test]
    fn test_reconcile_limit_applies_after_mismatch_removal() {
        let (c1, _rx1) = handle(1, "mallory");
        let (c2, _rx2) = handle(2, "alice");
        let (c3, _rx3) = handle(3, "alice");
        let mut room = room_with(&[&c1, &c2, &c3]);

        let report = reconcile(&mut room, 2);

        assert!(report.superseded.is_empty());
        assert_eq!(
            room.connection_ids(),
            vec![ConnectionId::new(2), ConnectionId::new(3)]
        );
    }
}
