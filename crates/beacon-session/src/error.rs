//! Error types for the session layer.

use std::time::Duration;

/// Errors raised while admitting a connection.
///
/// Every variant is terminal for the connection attempt: the gate never
/// retries and never admits a connection partially.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection was opened without a credential.
    #[error("missing credential")]
    MissingCredential,

    /// The credential was rejected by the
    /// [`IdentityVerifier`](crate::IdentityVerifier).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The credential was well-formed but is past its expiry.
    #[error("credential expired")]
    Expired,

    /// Verification didn't finish inside the handshake window.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
}
