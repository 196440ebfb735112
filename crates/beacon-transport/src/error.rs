//! Error types for the transport layer.

/// Errors raised by a [`Transport`](crate::Transport) or one of its
/// [`Connection`](crate::Connection)s.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// A client connected but the WebSocket upgrade did not complete.
    #[error("upgrade failed: {0}")]
    UpgradeFailed(String),

    /// The peer didn't finish the upgrade inside the handshake window.
    #[error("upgrade from {addr} timed out after {after:?}")]
    UpgradeTimedOut {
        addr: std::net::SocketAddr,
        after: std::time::Duration,
    },

    /// A frame could not be written. The peer is usually gone.
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}
