//! The notification dispatcher: persist, then deliver.
//!
//! ```text
//! draft ──→ store.insert ──→ Ok(event) ──→ Delivery ──→ live members
//!                │                              │
//!                └─ Err → DispatchError         └─ zero reached → debug log
//! ```
//!
//! Persistence is the reliable record. Delivery is best-effort and never
//! undoes a successful insert: a user who was offline reads the
//! notification later through the read path.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use beacon_protocol::{Recipient, UserId};
use beacon_registry::Delivery;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::{
    CreditThresholds, DispatchError, NotificationDraft, NotificationEvent, NotificationId,
    NotificationQuery, NotificationStore, triggers,
};

/// Number of ordering locks. Two recipients that hash to the same lock are
/// serialized against each other; nothing else is.
const ORDERING_SHARDS: usize = 64;

/// Persists notification drafts and pushes them to live connections.
///
/// Cheap to clone; clones share the store, the delivery target and the
/// ordering locks.
pub struct Dispatcher<S, D> {
    store: Arc<S>,
    delivery: Arc<D>,
    thresholds: CreditThresholds,
    ordering: Arc<[Mutex<()>]>,
}

impl<S, D> Clone for Dispatcher<S, D> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            delivery: Arc::clone(&self.delivery),
            thresholds: self.thresholds.clone(),
            ordering: Arc::clone(&self.ordering),
        }
    }
}

impl<S: NotificationStore, D: Delivery> Dispatcher<S, D> {
    pub fn new(store: Arc<S>, delivery: Arc<D>) -> Self {
        Self {
            store,
            delivery,
            thresholds: CreditThresholds::default(),
            ordering: (0..ORDERING_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: CreditThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn thresholds(&self) -> &CreditThresholds {
        &self.thresholds
    }

    fn ordering_lock(&self, recipient: &Recipient) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        recipient.hash(&mut hasher);
        &self.ordering[hasher.finish() as usize % self.ordering.len()]
    }

    /// Persists `draft`, then delivers it to every live connection of its
    /// recipient.
    ///
    /// Dispatches to the same recipient are serialized across both steps,
    /// so they reach each connection in call order.
    ///
    /// # Errors
    /// [`DispatchError::Storage`] if the insert fails. Nothing is delivered
    /// in that case.
    pub async fn dispatch(&self, draft: NotificationDraft) -> Result<NotificationEvent, DispatchError> {
        let _order = self.ordering_lock(&draft.recipient).lock().await;

        let event = self.store.insert(draft).await.inspect_err(|e| {
            tracing::warn!(error = %e, "notification not persisted, skipping delivery");
        })?;

        let reached = match &event.recipient {
            Recipient::User(user_id) => {
                self.delivery
                    .deliver_to_user(user_id, event.to_server_event())
                    .await
            }
            Recipient::Broadcast => self.delivery.broadcast(event.to_server_event()).await,
        };
        tracing::debug!(
            notification_id = %event.id,
            recipient = %event.recipient,
            category = %event.category,
            reached,
            "notification dispatched"
        );
        Ok(event)
    }

    /// Runs [`dispatch`](Self::dispatch) after `delay` on a background task.
    ///
    /// The delay only schedules the push. Nothing depends on it having run.
    pub fn dispatch_after(
        &self,
        delay: Duration,
        draft: NotificationDraft,
    ) -> JoinHandle<Result<NotificationEvent, DispatchError>> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.dispatch(draft).await
        })
    }

    /// Schedules the post-login greeting.
    pub fn welcome(
        &self,
        user_id: &UserId,
        display_name: &str,
        delay: Duration,
    ) -> JoinHandle<Result<NotificationEvent, DispatchError>> {
        self.dispatch_after(delay, triggers::welcome(user_id, display_name))
    }

    /// Raises credit alerts for a balance change. Call after every
    /// credit-decrementing operation.
    ///
    /// Storage failures are logged and skipped so the caller's own operation
    /// still succeeds. Returns the notifications that were persisted.
    pub async fn notify_credit_change(
        &self,
        user_id: &UserId,
        previous: i64,
        current: i64,
    ) -> Vec<NotificationEvent> {
        let mut raised = Vec::new();
        for alert in self.thresholds.evaluate(previous, current) {
            match self
                .dispatch(triggers::credit_alert(user_id, alert, current))
                .await
            {
                Ok(event) => raised.push(event),
                Err(e) => {
                    tracing::warn!(%user_id, ?alert, error = %e, "credit alert dropped");
                }
            }
        }
        raised
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    /// The user's own and broadcast notifications, newest first.
    pub async fn list_for_user(
        &self,
        user_id: &UserId,
        query: NotificationQuery,
    ) -> Result<Vec<NotificationEvent>, DispatchError> {
        Ok(self.store.find_for_user(user_id, query).await?)
    }

    pub async fn unread_count(&self, user_id: &UserId) -> Result<usize, DispatchError> {
        Ok(self.store.count_unread(user_id).await?)
    }

    pub async fn mark_read(&self, user_id: &UserId, id: NotificationId) -> Result<bool, DispatchError> {
        Ok(self.store.mark_read(user_id, id).await?)
    }

    pub async fn mark_all_read(&self, user_id: &UserId) -> Result<usize, DispatchError> {
        Ok(self.store.mark_all_read(user_id).await?)
    }

    /// Deletes one of the user's own notifications.
    pub async fn delete(&self, user_id: &UserId, id: NotificationId) -> Result<bool, DispatchError> {
        let deleted = self.store.delete(user_id, id).await?;
        if deleted {
            tracing::info!(%user_id, notification_id = %id, "notification deleted");
        }
        Ok(deleted)
    }
}
