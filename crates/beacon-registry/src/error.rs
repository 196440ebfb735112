//! Error types for the registry layer.

use beacon_protocol::ConversationId;
use beacon_transport::ConnectionId;

/// Errors that can occur during registry operations.
///
/// Delivery itself never fails: a recipient with no live connections is a
/// normal outcome and shows up as a zero count, not an error.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The connection never joined (or already left) the registry.
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    /// The connection tried to relay into a conversation it hasn't joined.
    #[error("connection {connection_id} is not in conversation {conversation_id}")]
    NotInConversation {
        conversation_id: ConversationId,
        connection_id: ConnectionId,
    },
}
