//! Core protocol types for Beacon's wire format.
//!
//! Every frame on the wire is a JSON object with two keys:
//!
//! ```text
//! { "event": "notification", "data": { ...payload... } }
//! ```
//!
//! `event` is a kebab-case name and `data` is the event's payload. This is
//! serde's "adjacently tagged" enum representation, which keeps the shape
//! easy to dispatch on in browser code.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A verified user identifier, as issued by the identity provider.
///
/// Newtype wrapper so a user id can't be passed where a conversation id is
/// expected. `#[serde(transparent)]` keeps it a plain string on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a conversation (a chat thread).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Creates a conversation id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Recipient: who should receive a server event?
// ---------------------------------------------------------------------------

/// The audience of a server-initiated event.
///
/// Serialized as `{"user": "alice"}` or `"broadcast"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipient {
    /// Every live connection of one user.
    User(UserId),

    /// Every live connection of every user.
    Broadcast,
}

impl Recipient {
    /// The targeted user, or `None` for a broadcast.
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::User(user_id) => Some(user_id),
            Self::Broadcast => None,
        }
    }

    /// Returns `true` if an event for this recipient reaches `user_id`.
    pub fn includes(&self, user_id: &UserId) -> bool {
        match self {
            Self::User(target) => target == user_id,
            Self::Broadcast => true,
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(user_id) => write!(f, "user:{user_id}"),
            Self::Broadcast => f.write_str("broadcast"),
        }
    }
}

// ---------------------------------------------------------------------------
// Notification payload
// ---------------------------------------------------------------------------

/// Notification category. Serialized lowercase (`"info"`, `"warning"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Informational.
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// How prominently a client should surface a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// Optional structured metadata attached to a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMetadata {
    /// Subsystem that produced the notification (e.g. `"credits"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

/// The `notification` event's payload.
///
/// `user_id` is absent for broadcast notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub category: Category,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<NotificationMetadata>,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events a client may send after it has been admitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Start receiving `new-message` relays for a conversation.
    #[serde(rename_all = "camelCase")]
    JoinConversation { conversation_id: ConversationId },

    /// Stop receiving relays for a conversation.
    #[serde(rename_all = "camelCase")]
    LeaveConversation { conversation_id: ConversationId },

    /// Relay `message` verbatim to the other viewers of a conversation.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        conversation_id: ConversationId,
        message: serde_json::Value,
    },

    /// Keep-alive. Answered with `pong`.
    #[serde(rename_all = "camelCase")]
    Ping { client_time: u64 },
}

impl ClientEvent {
    /// Checks protocol rules that deserialization alone can't express.
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidMessage` for an empty conversation id.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let conversation_id = match self {
            Self::JoinConversation { conversation_id }
            | Self::LeaveConversation { conversation_id }
            | Self::SendMessage {
                conversation_id, ..
            } => conversation_id,
            Self::Ping { .. } => return Ok(()),
        };
        if conversation_id.as_str().trim().is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "conversationId must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Events the server pushes to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// The connection passed the session gate and joined its user room.
    #[serde(rename_all = "camelCase")]
    Connected {
        user_id: UserId,
        display_name: String,
        connection_id: u64,
    },

    /// The credential was missing, invalid, or expired. The server closes
    /// the connection right after sending this.
    AuthError { message: String },

    /// A notification addressed to this user (or to everyone).
    Notification(NotificationPayload),

    /// Best-effort relay of a message another viewer of the same
    /// conversation sent. Opaque to the server.
    NewMessage(serde_json::Value),

    /// Answer to `ping`.
    #[serde(rename_all = "camelCase")]
    Pong { client_time: u64, server_time: u64 },

    /// A client event was rejected. `code` follows HTTP conventions.
    Error { code: u16, message: String },
}

// =========================================================================
// Tests
// =========================================================================
