//! Durable notification storage boundary.
//!
//! The store is the reliable record: live delivery is best-effort, and a
//! client that missed a push recovers by reading from here.

use std::future::Future;

use beacon_protocol::UserId;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{NotificationDraft, NotificationEvent, NotificationId, StoreError};

/// Filters for [`NotificationStore::find_for_user`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationQuery {
    pub unread_only: bool,
    /// Maximum number of results. `None` means all.
    pub limit: Option<usize>,
}

impl NotificationQuery {
    pub fn unread() -> Self {
        Self {
            unread_only: true,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Persistence operations the dispatcher needs.
///
/// "Own" notifications are those addressed to the user directly. Broadcast
/// notifications are visible to everyone but owned by no one: each user
/// tracks their own read state on them, and nobody can delete them.
pub trait NotificationStore: Send + Sync + 'static {
    /// Persists a draft, assigning its id and creation time.
    fn insert(
        &self,
        draft: NotificationDraft,
    ) -> impl Future<Output = Result<NotificationEvent, StoreError>> + Send;

    /// The user's own and broadcast notifications, newest first, with read
    /// state as that user sees it.
    fn find_for_user(
        &self,
        user_id: &UserId,
        query: NotificationQuery,
    ) -> impl Future<Output = Result<Vec<NotificationEvent>, StoreError>> + Send;

    /// Number of notifications visible to the user that they haven't read.
    fn count_unread(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Marks one notification read for `user_id`. `Ok(false)` if it doesn't
    /// exist, isn't visible to `user_id`, or was already read by them.
    fn mark_read(
        &self,
        user_id: &UserId,
        id: NotificationId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Marks every notification visible to the user read; returns how many
    /// changed.
    fn mark_all_read(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Deletes one owned notification. `Ok(false)` if there was nothing to
    /// delete.
    fn delete(
        &self,
        user_id: &UserId,
        id: NotificationId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// A process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryNotificationStore {
    // Insertion order == creation order.
    records: RwLock<Vec<NotificationEvent>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored notifications, all recipients.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl NotificationStore for InMemoryNotificationStore {
    async fn insert(&self, draft: NotificationDraft) -> Result<NotificationEvent, StoreError> {
        let event = NotificationEvent::from_draft(draft);
        self.records.write().await.push(event.clone());
        Ok(event)
    }

    async fn find_for_user(
        &self,
        user_id: &UserId,
        query: NotificationQuery,
    ) -> Result<Vec<NotificationEvent>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|n| n.is_visible_to(user_id))
            .filter(|n| !query.unread_only || !n.is_read_by(user_id))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|n| n.view_for(user_id))
            .collect())
    }

    async fn count_unread(&self, user_id: &UserId) -> Result<usize, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|n| n.is_visible_to(user_id) && !n.is_read_by(user_id))
            .count())
    }

    async fn mark_read(&self, user_id: &UserId, id: NotificationId) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        Ok(records
            .iter_mut()
            .find(|n| n.id == id)
            .is_some_and(|n| n.mark_read_by(user_id, Utc::now())))
    }

    async fn mark_all_read(&self, user_id: &UserId) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        Ok(records
            .iter_mut()
            .filter(|n| n.is_visible_to(user_id))
            .map(|n| n.mark_read_by(user_id, now))
            .filter(|&changed| changed)
            .count())
    }

    async fn delete(&self, user_id: &UserId, id: NotificationId) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|n| !(n.id == id && n.is_owned_by(user_id)));
        Ok(records.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use beacon_protocol::Category;

    use super::*;

    async fn seeded() -> InMemoryNotificationStore {
        let store = InMemoryNotificationStore::new();
        for (user, title) in [("bob", "one"), ("alice", "two"), ("bob", "three")] {
            store
                .insert(NotificationDraft::to_user(user, Category::Info, title, "m"))
                .await
                .unwrap();
        }
        store
            .insert(NotificationDraft::broadcast(Category::Info, "all", "m"))
            .await
            .unwrap();
        store
    }

    fn titles(events: &[NotificationEvent]) -> Vec<&str> {
        events.iter().map(|n| n.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_find_for_user_returns_own_and_broadcast_newest_first() {
        let store = seeded().await;
        let found = store
            .find_for_user(&"bob".into(), NotificationQuery::default())
            .await
            .unwrap();
        assert_eq!(titles(&found), vec!["all", "three", "one"]);
    }

    #[tokio::test]
    async fn test_find_for_user_respects_limit() {
        let store = seeded().await;
        let found = store
            .find_for_user(&"bob".into(), NotificationQuery::default().with_limit(1))
            .await
            .unwrap();
        assert_eq!(titles(&found), vec!["all"]);
    }

    #[tokio::test]
    async fn test_mark_all_read_leaves_other_users_unread() {
        let store = seeded().await;
        let bob = UserId::from("bob");
        let alice = UserId::from("alice");

        assert_eq!(store.count_unread(&bob).await.unwrap(), 3);
        assert_eq!(store.mark_all_read(&bob).await.unwrap(), 3);
        assert_eq!(store.count_unread(&bob).await.unwrap(), 0);
        assert!(
            store
                .find_for_user(&bob, NotificationQuery::unread())
                .await
                .unwrap()
                .is_empty()
        );

        assert_eq!(store.count_unread(&alice).await.unwrap(), 2);
        let unread = store.find_for_user(&alice, NotificationQuery::unread()).await.unwrap();
        assert_eq!(titles(&unread), vec!["all", "two"]);
    }

    #[tokio::test]
    async fn test_mark_read_broadcast_is_per_user() {
        let store = seeded().await;
        let bob = UserId::from("bob");
        let alice = UserId::from("alice");
        let broadcast = store
            .find_for_user(&bob, NotificationQuery::default())
            .await
            .unwrap()
            .remove(0);
        assert_eq!(broadcast.title, "all");

        assert!(store.mark_read(&bob, broadcast.id).await.unwrap());
        assert!(!store.mark_read(&bob, broadcast.id).await.unwrap());

        let bob_unread = store.find_for_user(&bob, NotificationQuery::unread()).await.unwrap();
        assert_eq!(titles(&bob_unread), vec!["three", "one"]);
        assert_eq!(store.count_unread(&bob).await.unwrap(), bob_unread.len());

        let alice_unread = store.find_for_user(&alice, NotificationQuery::unread()).await.unwrap();
        assert_eq!(titles(&alice_unread), vec!["all", "two"]);
        assert_eq!(store.count_unread(&alice).await.unwrap(), alice_unread.len());

        let bob_view = store
            .find_for_user(&bob, NotificationQuery::default())
            .await
            .unwrap()
            .remove(0);
        assert!(bob_view.read);
        assert!(bob_view.read_by.is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_foreign_notification_is_refused() {
        let store = seeded().await;
        let alice_note = store
            .find_for_user(&"alice".into(), NotificationQuery::default())
            .await
            .unwrap()
            .into_iter()
            .find(|n| n.title == "two")
            .unwrap();

        assert!(!store.mark_read(&"bob".into(), alice_note.id).await.unwrap());
        assert!(store.mark_read(&"alice".into(), alice_note.id).await.unwrap());
        assert!(!store.mark_read(&"alice".into(), alice_note.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_broadcast_is_refused() {
        let store = seeded().await;
        let broadcast = store
            .find_for_user(&"bob".into(), NotificationQuery::default())
            .await
            .unwrap()
            .remove(0);

        assert!(!store.delete(&"bob".into(), broadcast.id).await.unwrap());
        assert_eq!(store.len().await, 4);
    }
}
