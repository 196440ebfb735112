//! Session types: the record of an admitted connection.
//!
//! A session is created once, when the gate admits a connection, and is
//! never re-bound to another identity. A credential refresh is a new
//! connection with a new session.

use std::time::Duration;

use beacon_protocol::UserId;
use beacon_transport::ConnectionId;
use chrono::{DateTime, Utc};

use crate::Identity;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for the session gate.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long credential verification may take before the connection is
    /// dropped.
    ///
    /// Default: 5 seconds.
    pub handshake_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An admitted connection bound to a verified user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The transport connection this session is bound to.
    pub connection_id: ConnectionId,

    /// The identity the credential resolved to. Immutable for the
    /// session's lifetime.
    pub user_id: UserId,

    pub display_name: String,

    /// When the gate admitted the connection.
    pub connected_at: DateTime<Utc>,
}

impl Session {
    /// Binds a connection to an identity, stamped with the current time.
    pub fn bind(connection_id: ConnectionId, identity: Identity) -> Self {
        Self {
            connection_id,
            user_id: identity.user_id,
            display_name: identity.display_name,
            connected_at: Utc::now(),
        }
    }

    /// Returns `true` if this session is bound to `user_id`.
    pub fn belongs_to(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }
}
