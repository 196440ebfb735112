//! Notification records and drafts.

use std::collections::BTreeMap;
use std::fmt;

use beacon_protocol::{
    Category, NotificationMetadata, NotificationPayload, Priority, Recipient, ServerEvent, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Store-assigned notification id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(Uuid);

impl NotificationId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for NotificationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A notification not yet persisted. The store turns it into a
/// [`NotificationEvent`] by assigning an id and a creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub category: Category,
    pub metadata: Option<NotificationMetadata>,
}

impl NotificationDraft {
    /// A draft addressed to one user.
    pub fn to_user(
        user_id: impl Into<UserId>,
        category: Category,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient: Recipient::User(user_id.into()),
            title: title.into(),
            message: message.into(),
            category,
            metadata: None,
        }
    }

    /// A draft addressed to every user.
    pub fn broadcast(category: Category, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recipient: Recipient::Broadcast,
            title: title.into(),
            message: message.into(),
            category,
            metadata: None,
        }
    }

    /// Tags the draft with the subsystem that produced it.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.get_or_insert_with(Default::default).source = Some(source.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.metadata.get_or_insert_with(Default::default).priority = Some(priority);
        self
    }
}

/// A persisted notification.
///
/// Only the read state ever changes after creation. A notification addressed
/// to one user keeps it in `read` and `read_at`; a broadcast keeps one entry
/// per reader in `read_by` and leaves `read` unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: NotificationId,
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub category: Category,
    pub read: bool,
    pub metadata: Option<NotificationMetadata>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub read_by: BTreeMap<UserId, DateTime<Utc>>,
}

impl NotificationEvent {
    /// Materializes a draft with a fresh id, created now.
    pub fn from_draft(draft: NotificationDraft) -> Self {
        Self {
            id: NotificationId::new_v4(),
            recipient: draft.recipient,
            title: draft.title,
            message: draft.message,
            category: draft.category,
            read: false,
            metadata: draft.metadata,
            created_at: Utc::now(),
            read_at: None,
            read_by: BTreeMap::new(),
        }
    }

    /// Returns `true` if the notification is addressed to `user_id`
    /// specifically (not via broadcast).
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        self.recipient.user_id() == Some(user_id)
    }

    /// Returns `true` if `user_id` may see this notification.
    pub fn is_visible_to(&self, user_id: &UserId) -> bool {
        self.recipient.includes(user_id)
    }

    /// Flags the notification read. Returns `false` if it already was.
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.read {
            return false;
        }
        self.read = true;
        self.read_at = Some(at);
        true
    }

    /// Whether `user_id` has read this notification.
    pub fn is_read_by(&self, user_id: &UserId) -> bool {
        match &self.recipient {
            Recipient::User(owner) => owner == user_id && self.read,
            Recipient::Broadcast => self.read_by.contains_key(user_id),
        }
    }

    /// Records that `user_id` read this notification. Returns `false` if it
    /// isn't visible to them or they already had.
    pub fn mark_read_by(&mut self, user_id: &UserId, at: DateTime<Utc>) -> bool {
        match &self.recipient {
            Recipient::User(owner) if owner == user_id => self.mark_read(at),
            Recipient::User(_) => false,
            Recipient::Broadcast => {
                if self.read_by.contains_key(user_id) {
                    return false;
                }
                self.read_by.insert(user_id.clone(), at);
                true
            }
        }
    }

    /// This notification as `user_id` sees it: read state is theirs alone and
    /// other readers are hidden.
    pub fn view_for(&self, user_id: &UserId) -> Self {
        let mut view = self.clone();
        if let Recipient::Broadcast = self.recipient {
            view.read_at = self.read_by.get(user_id).copied();
            view.read = view.read_at.is_some();
            view.read_by.clear();
        }
        view
    }

    /// The wire form of this notification.
    pub fn to_payload(&self) -> NotificationPayload {
        NotificationPayload {
            id: self.id.to_string(),
            title: self.title.clone(),
            message: self.message.clone(),
            category: self.category,
            timestamp: self.created_at,
            read: self.read,
            user_id: self.recipient.user_id().cloned(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn to_server_event(&self) -> ServerEvent {
        ServerEvent::Notification(self.to_payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_draft_starts_unread() {
        let event = NotificationEvent::from_draft(NotificationDraft::to_user(
            "bob",
            Category::Warning,
            "Low credits",
            "low credits",
        ));
        assert!(!event.read);
        assert!(event.read_at.is_none());
        assert!(event.is_owned_by(&"bob".into()));
        assert!(!event.is_visible_to(&"alice".into()));
    }

    #[test]
    fn test_broadcast_visible_to_everyone_owned_by_no_one() {
        let event = NotificationEvent::from_draft(NotificationDraft::broadcast(
            Category::Info,
            "Maintenance",
            "tonight",
        ));
        let alice = UserId::from("alice");
        assert!(event.is_visible_to(&alice));
        assert!(!event.is_owned_by(&alice));
        assert_eq!(event.to_payload().user_id, None);
    }

    #[test]
    fn test_mark_read_is_one_shot() {
        let mut event = NotificationEvent::from_draft(NotificationDraft::to_user(
            "bob",
            Category::Info,
            "t",
            "m",
        ));
        let now = Utc::now();
        assert!(event.mark_read(now));
        assert!(!event.mark_read(Utc::now()));
        assert_eq!(event.read_at, Some(now));
    }

    #[test]
    fn test_mark_read_by_broadcast_is_per_reader() {
        let mut event = NotificationEvent::from_draft(NotificationDraft::broadcast(
            Category::Info,
            "Maintenance",
            "tonight",
        ));
        let (alice, bob) = (UserId::from("alice"), UserId::from("bob"));
        let now = Utc::now();

        assert!(event.mark_read_by(&alice, now));
        assert!(!event.mark_read_by(&alice, Utc::now()));
        assert!(event.is_read_by(&alice));
        assert!(!event.is_read_by(&bob));

        let alice_view = event.view_for(&alice);
        assert!(alice_view.read);
        assert_eq!(alice_view.read_at, Some(now));
        assert!(alice_view.read_by.is_empty());
        assert!(!event.view_for(&bob).read);
    }

    #[test]
    fn test_mark_read_by_foreign_user_is_refused() {
        let mut event = NotificationEvent::from_draft(NotificationDraft::to_user(
            "bob",
            Category::Info,
            "t",
            "m",
        ));
        assert!(!event.mark_read_by(&"alice".into(), Utc::now()));
        assert!(!event.read);
        assert!(event.mark_read_by(&"bob".into(), Utc::now()));
        assert!(event.is_read_by(&"bob".into()));
    }

    #[test]
    fn test_to_payload_carries_metadata() {
        let draft = NotificationDraft::to_user("bob", Category::Error, "Urgent", "top up")
            .with_source("credits")
            .with_priority(Priority::High);
        let payload = NotificationEvent::from_draft(draft).to_payload();
        assert_eq!(payload.user_id, Some(UserId::from("bob")));
        let metadata = payload.metadata.unwrap();
        assert_eq!(metadata.source.as_deref(), Some("credits"));
        assert_eq!(metadata.priority, Some(Priority::High));
    }
}
