//! Conversation rooms: best-effort `new-message` relay between viewers.
//!
//! Unlike user rooms, conversation rooms are not identity-scoped. Any
//! registered connection may join any conversation; membership is the only
//! check applied to a relay. Nothing here is persisted.

use std::sync::Arc;

use beacon_protocol::{ConversationId, ServerEvent};
use beacon_transport::ConnectionId;

use crate::room::ConversationRoom;
use crate::{ConnectionRegistry, RegistryError};

impl ConnectionRegistry {
    /// Adds a registered connection to a conversation room. Returns `false`
    /// if it was already a member.
    ///
    /// # Errors
    /// [`RegistryError::UnknownConnection`] if the connection never joined
    /// the registry or has already left.
    pub async fn join_conversation(
        &self,
        connection_id: ConnectionId,
        conversation_id: ConversationId,
    ) -> Result<bool, RegistryError> {
        // The connection shard stays locked across the room insert so a
        // concurrent `leave` sees either no entry or the new membership.
        let mut connections = self.connection_shard(connection_id).lock().await;
        let entry = connections
            .get_mut(&connection_id)
            .ok_or(RegistryError::UnknownConnection(connection_id))?;
        entry.conversations.insert(conversation_id.clone());

        let mut conversations = self.conversations.for_key(&conversation_id).lock().await;
        let joined = conversations
            .entry(conversation_id.clone())
            .or_insert_with(ConversationRoom::new)
            .members
            .insert(entry.handle.clone());
        drop(conversations);
        drop(connections);

        if joined {
            tracing::debug!(%connection_id, %conversation_id, "joined conversation");
        }
        Ok(joined)
    }

    /// Removes a connection from one conversation room. Returns `false` if
    /// it wasn't a member.
    pub async fn leave_conversation(
        &self,
        connection_id: ConnectionId,
        conversation_id: &ConversationId,
    ) -> bool {
        if let Some(entry) = self
            .connection_shard(connection_id)
            .lock()
            .await
            .get_mut(&connection_id)
        {
            entry.conversations.remove(conversation_id);
        }
        self.remove_from_conversation(conversation_id, connection_id)
            .await
    }

    pub(crate) async fn remove_from_conversation(
        &self,
        conversation_id: &ConversationId,
        connection_id: ConnectionId,
    ) -> bool {
        let mut conversations = self.conversations.for_key(conversation_id).lock().await;
        let Some(room) = conversations.get_mut(conversation_id) else {
            return false;
        };
        let removed = room.members.remove(connection_id).is_some();
        if room.members.is_empty() {
            conversations.remove(conversation_id);
        }
        removed
    }

    /// Connection ids currently viewing a conversation.
    pub async fn conversation_members(&self, conversation_id: &ConversationId) -> Vec<ConnectionId> {
        self.conversations
            .for_key(conversation_id)
            .lock()
            .await
            .get(conversation_id)
            .map(|room| room.members.ids())
            .unwrap_or_default()
    }

    /// Sends `payload` as a `new-message` event to every other member of the
    /// conversation room. Returns how many connections it reached.
    ///
    /// # Errors
    /// [`RegistryError::NotInConversation`] if `sender` is not a member.
    pub async fn relay(
        &self,
        conversation_id: &ConversationId,
        sender: ConnectionId,
        payload: serde_json::Value,
    ) -> Result<usize, RegistryError> {
        let conversations = self.conversations.for_key(conversation_id).lock().await;
        let room = conversations
            .get(conversation_id)
            .filter(|room| room.members.contains(sender))
            .ok_or_else(|| RegistryError::NotInConversation {
                conversation_id: conversation_id.clone(),
                connection_id: sender,
            })?;

        let event = Arc::new(ServerEvent::NewMessage(payload));
        Ok(room.relay(&event, sender))
    }
}
