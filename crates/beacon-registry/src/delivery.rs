//! The `Delivery` seam between business code and the registry.
//!
//! Notification and REST code never touches connection handles. It gets a
//! `Delivery` at construction and asks it to reach users, everyone, or a
//! conversation. [`ConnectionRegistry`] is the production implementation;
//! tests substitute a recorder.

use std::future::Future;
use std::sync::Arc;

use beacon_protocol::{ConversationId, Recipient, ServerEvent, UserId};
use beacon_transport::ConnectionId;

use crate::{ConnectionRegistry, RegistryError};

/// Outbound operations available to business modules.
///
/// Every method reports how many connections were reached; zero is a normal
/// outcome, not an error.
pub trait Delivery: Send + Sync + 'static {
    /// Sends `event` to every live connection of `user_id`.
    fn deliver_to_user(
        &self,
        user_id: &UserId,
        event: ServerEvent,
    ) -> impl Future<Output = usize> + Send;

    /// Sends `event` to every live connection of every user.
    fn broadcast(&self, event: ServerEvent) -> impl Future<Output = usize> + Send;

    /// Adds a connection to a conversation room.
    fn join_conversation_room(
        &self,
        connection_id: ConnectionId,
        conversation_id: ConversationId,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send;

    /// Relays `payload` to the other members of a conversation room.
    fn relay(
        &self,
        conversation_id: &ConversationId,
        sender: ConnectionId,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send;
}

impl Delivery for ConnectionRegistry {
    async fn deliver_to_user(&self, user_id: &UserId, event: ServerEvent) -> usize {
        self.deliver(&Recipient::User(user_id.clone()), event).await
    }

    async fn broadcast(&self, event: ServerEvent) -> usize {
        self.deliver(&Recipient::Broadcast, event).await
    }

    async fn join_conversation_room(
        &self,
        connection_id: ConnectionId,
        conversation_id: ConversationId,
    ) -> Result<bool, RegistryError> {
        self.join_conversation(connection_id, conversation_id).await
    }

    async fn relay(
        &self,
        conversation_id: &ConversationId,
        sender: ConnectionId,
        payload: serde_json::Value,
    ) -> Result<usize, RegistryError> {
        ConnectionRegistry::relay(self, conversation_id, sender, payload).await
    }
}

impl<T: Delivery> Delivery for Arc<T> {
    fn deliver_to_user(
        &self,
        user_id: &UserId,
        event: ServerEvent,
    ) -> impl Future<Output = usize> + Send {
        (**self).deliver_to_user(user_id, event)
    }

    fn broadcast(&self, event: ServerEvent) -> impl Future<Output = usize> + Send {
        (**self).broadcast(event)
    }

    fn join_conversation_room(
        &self,
        connection_id: ConnectionId,
        conversation_id: ConversationId,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        (**self).join_conversation_room(connection_id, conversation_id)
    }

    fn relay(
        &self,
        conversation_id: &ConversationId,
        sender: ConnectionId,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send {
        (**self).relay(conversation_id, sender, payload)
    }
}
