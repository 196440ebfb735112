//! Integration tests for the dispatcher: persistence, delivery, ordering and
//! credit alerts.

use std::sync::Arc;
use std::time::Duration;

use beacon_notify::{
    CreditThresholds, DispatchError, Dispatcher, InMemoryNotificationStore, NotificationDraft,
    NotificationEvent, NotificationId, NotificationQuery, NotificationStore, StoreError,
    ThresholdMode,
};
use beacon_protocol::{Category, ConversationId, ServerEvent, UserId};
use beacon_registry::{
    ConnectionHandle, ConnectionRegistry, Delivery, Outbound, OutboundReceiver, RegistryError,
};
use beacon_session::{Identity, Session};
use beacon_transport::ConnectionId;
use tokio::sync::Mutex;

// =========================================================================
// Test doubles
// =========================================================================

/// Records every delivery instead of sending it anywhere.
#[derive(Default)]
struct RecordingDelivery {
    sent: Mutex<Vec<(Option<UserId>, ServerEvent)>>,
}

impl RecordingDelivery {
    async fn sent(&self) -> Vec<(Option<UserId>, ServerEvent)> {
        self.sent.lock().await.clone()
    }
}

impl Delivery for RecordingDelivery {
    async fn deliver_to_user(&self, user_id: &UserId, event: ServerEvent) -> usize {
        self.sent.lock().await.push((Some(user_id.clone()), event));
        1
    }

    async fn broadcast(&self, event: ServerEvent) -> usize {
        self.sent.lock().await.push((None, event));
        1
    }

    async fn join_conversation_room(
        &self,
        _connection_id: ConnectionId,
        _conversation_id: ConversationId,
    ) -> Result<bool, RegistryError> {
        Ok(true)
    }

    async fn relay(
        &self,
        _conversation_id: &ConversationId,
        _sender: ConnectionId,
        _payload: serde_json::Value,
    ) -> Result<usize, RegistryError> {
        Ok(0)
    }
}

/// A store whose every operation fails.
struct FailingStore;

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".into())
}

impl NotificationStore for FailingStore {
    async fn insert(&self, _draft: NotificationDraft) -> Result<NotificationEvent, StoreError> {
        Err(down())
    }

    async fn find_for_user(
        &self,
        _user_id: &UserId,
        _query: NotificationQuery,
    ) -> Result<Vec<NotificationEvent>, StoreError> {
        Err(down())
    }

    async fn count_unread(&self, _user_id: &UserId) -> Result<usize, StoreError> {
        Err(down())
    }

    async fn mark_read(&self, _user_id: &UserId, _id: NotificationId) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn mark_all_read(&self, _user_id: &UserId) -> Result<usize, StoreError> {
        Err(down())
    }

    async fn delete(&self, _user_id: &UserId, _id: NotificationId) -> Result<bool, StoreError> {
        Err(down())
    }
}

fn recording() -> (
    Dispatcher<InMemoryNotificationStore, RecordingDelivery>,
    Arc<RecordingDelivery>,
) {
    let delivery = Arc::new(RecordingDelivery::default());
    let dispatcher = Dispatcher::new(
        Arc::new(InMemoryNotificationStore::new()),
        Arc::clone(&delivery),
    );
    (dispatcher, delivery)
}

fn low_credits(user: &str) -> NotificationDraft {
    NotificationDraft::to_user(user, Category::Warning, "Low credits", "low credits")
}

fn categories(events: &[NotificationEvent]) -> Vec<Category> {
    events.iter().map(|n| n.category).collect()
}

fn connect(id: u64, user: &str) -> (ConnectionHandle, OutboundReceiver) {
    let session = Session::bind(ConnectionId::new(id), Identity::new(user, user));
    ConnectionHandle::channel(session)
}

// =========================================================================
// Persist then deliver
// =========================================================================

#[tokio::test]
async fn test_dispatch_persists_then_delivers_to_target() {
    let (dispatcher, delivery) = recording();

    let event = dispatcher.dispatch(low_credits("bob")).await.unwrap();

    let sent = delivery.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Some(UserId::from("bob")));
    assert_eq!(sent[0].1, event.to_server_event());
    assert_eq!(dispatcher.store().len().await, 1);
}

#[tokio::test]
async fn test_dispatch_broadcast_uses_broadcast_delivery() {
    let (dispatcher, delivery) = recording();

    dispatcher
        .dispatch(NotificationDraft::broadcast(Category::Info, "Maintenance", "tonight"))
        .await
        .unwrap();

    assert_eq!(delivery.sent().await[0].0, None);
}

#[tokio::test]
async fn test_dispatch_storage_failure_delivers_nothing() {
    let delivery = Arc::new(RecordingDelivery::default());
    let dispatcher = Dispatcher::new(Arc::new(FailingStore), Arc::clone(&delivery));

    let result = dispatcher.dispatch(low_credits("bob")).await;

    assert!(matches!(result, Err(DispatchError::Storage(_))));
    assert!(delivery.sent().await.is_empty());
}

#[tokio::test]
async fn test_dispatch_to_offline_user_is_readable_later() {
    let registry = Arc::new(ConnectionRegistry::default());
    let dispatcher = Dispatcher::new(Arc::new(InMemoryNotificationStore::new()), registry);
    let bob = UserId::from("bob");

    let event = dispatcher.dispatch(low_credits("bob")).await.unwrap();

    let unread = dispatcher
        .list_for_user(&bob, NotificationQuery::unread())
        .await
        .unwrap();
    assert_eq!(unread, vec![event]);
    assert_eq!(unread[0].category, Category::Warning);
    assert_eq!(unread[0].message, "low credits");
    assert_eq!(dispatcher.unread_count(&bob).await.unwrap(), 1);
}

#[tokio::test]
async fn test_dispatches_reach_connection_in_call_order() {
    let registry = Arc::new(ConnectionRegistry::default());
    let (handle, mut rx) = connect(1, "alice");
    registry.join(&"alice".into(), handle).await;
    let dispatcher = Dispatcher::new(
        Arc::new(InMemoryNotificationStore::new()),
        Arc::clone(&registry),
    );

    let a = dispatcher
        .dispatch(NotificationDraft::to_user("alice", Category::Info, "A", "first"))
        .await
        .unwrap();
    let b = dispatcher
        .dispatch(NotificationDraft::to_user("alice", Category::Info, "B", "second"))
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Ok(Outbound::Event(event)) = rx.try_recv() {
        received.push((*event).clone());
    }
    assert_eq!(received, vec![a.to_server_event(), b.to_server_event()]);
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_after_waits_for_delay() {
    let (dispatcher, delivery) = recording();

    let task = dispatcher.welcome(&"alice".into(), "Alice", Duration::from_secs(2));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(delivery.sent().await.is_empty());

    let event = task.await.unwrap().unwrap();
    assert_eq!(event.message, "Welcome back, Alice!");
    assert_eq!(delivery.sent().await.len(), 1);
}

// =========================================================================
// Credit alerts
// =========================================================================

#[tokio::test]
async fn test_credit_change_into_warning_band_raises_one_warning() {
    let (dispatcher, _delivery) = recording();

    let raised = dispatcher
        .notify_credit_change(&"bob".into(), 1249, 1248)
        .await;

    assert_eq!(categories(&raised), vec![Category::Warning]);
}

#[tokio::test]
async fn test_credit_change_into_urgent_band_raises_warning_and_error() {
    let (dispatcher, delivery) = recording();

    let raised = dispatcher
        .notify_credit_change(&"bob".into(), 1246, 1245)
        .await;

    assert_eq!(categories(&raised), vec![Category::Warning, Category::Error]);
    assert_eq!(delivery.sent().await.len(), 2);
}

#[tokio::test]
async fn test_credit_change_crossing_mode_skips_repeat() {
    let (dispatcher, _delivery) = recording();
    let dispatcher = dispatcher.with_thresholds(CreditThresholds {
        mode: ThresholdMode::Crossing,
        ..CreditThresholds::default()
    });

    assert_eq!(
        dispatcher.notify_credit_change(&"bob".into(), 1249, 1248).await.len(),
        1
    );
    assert!(dispatcher.notify_credit_change(&"bob".into(), 1248, 1247).await.is_empty());
}

#[tokio::test]
async fn test_credit_change_with_failing_store_returns_empty() {
    let dispatcher = Dispatcher::new(
        Arc::new(FailingStore),
        Arc::new(RecordingDelivery::default()),
    );
    let raised = dispatcher
        .notify_credit_change(&"bob".into(), 1246, 1245)
        .await;
    assert!(raised.is_empty());
}

// =========================================================================
// Read path
// =========================================================================

#[tokio::test]
async fn test_read_path_mark_and_delete_own_notifications() {
    let (dispatcher, _delivery) = recording();
    let bob = UserId::from("bob");
    let first = dispatcher.dispatch(low_credits("bob")).await.unwrap();
    dispatcher.dispatch(low_credits("bob")).await.unwrap();

    assert!(dispatcher.mark_read(&bob, first.id).await.unwrap());
    assert_eq!(dispatcher.unread_count(&bob).await.unwrap(), 1);
    assert_eq!(dispatcher.mark_all_read(&bob).await.unwrap(), 1);
    assert_eq!(dispatcher.unread_count(&bob).await.unwrap(), 0);

    assert!(!dispatcher.delete(&"alice".into(), first.id).await.unwrap());
    assert!(dispatcher.delete(&bob, first.id).await.unwrap());
    let remaining = dispatcher
        .list_for_user(&bob, NotificationQuery::default())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn test_read_path_broadcast_read_state_is_per_user() {
    let (dispatcher, _delivery) = recording();
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");
    let notice = dispatcher
        .dispatch(NotificationDraft::broadcast(Category::Info, "Maintenance", "tonight"))
        .await
        .unwrap();

    assert!(dispatcher.mark_read(&alice, notice.id).await.unwrap());
    assert_eq!(dispatcher.unread_count(&alice).await.unwrap(), 0);
    assert!(
        dispatcher
            .list_for_user(&alice, NotificationQuery::unread())
            .await
            .unwrap()
            .is_empty()
    );

    assert_eq!(dispatcher.unread_count(&bob).await.unwrap(), 1);
    let bob_unread = dispatcher
        .list_for_user(&bob, NotificationQuery::unread())
        .await
        .unwrap();
    assert_eq!(bob_unread.len(), 1);
    assert_eq!(bob_unread[0].id, notice.id);
    assert!(!bob_unread[0].read);

    assert!(!dispatcher.delete(&alice, notice.id).await.unwrap());
}

#[tokio::test]
async fn test_read_path_storage_failure_surfaces() {
    let dispatcher = Dispatcher::new(
        Arc::new(FailingStore),
        Arc::new(RecordingDelivery::default()),
    );
    let result = dispatcher.unread_count(&"bob".into()).await;
    assert!(matches!(result, Err(DispatchError::Storage(_))));
}
