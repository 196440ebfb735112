//! Transport abstraction layer for Beacon.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the persistent-connection protocol, plus the default WebSocket
//! implementation.
//!
//! Accepting is split in two. [`Transport::accept`] only takes the socket
//! off the listener and returns a [`PendingConnection`]; the protocol
//! handshake runs in [`PendingConnection::upgrade`], on the caller's
//! per-connection task, so a peer that stalls mid-handshake never holds up
//! the accept loop.
//!
//! A connection is anonymous at this layer. The only identity-related thing
//! the transport does is capture the credential the client presented when
//! the connection was opened ([`Handshake`]); verifying it is the session
//! layer's job.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{PendingWebSocket, WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::SocketAddr;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What the client presented while the connection was being opened.
///
/// The credential is taken from the upgrade request, either the `token`
/// query parameter or an `Authorization: Bearer <token>` header. The header
/// wins when both are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    /// Raw bearer credential, if any was supplied.
    pub credential: Option<String>,
    /// Remote address of the peer.
    pub peer_addr: Option<SocketAddr>,
}

/// Close code sent when a connection fails authentication.
pub const CLOSE_AUTH_FAILED: u16 = 4001;

/// Close code sent when a connection is superseded by a newer one.
pub const CLOSE_SUPERSEDED: u16 = 4002;

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// An accepted socket that hasn't completed its handshake.
    type Pending: PendingConnection<Connection = Self::Connection, Error = Self::Error>;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next incoming socket. Doesn't read from it.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// An accepted socket whose protocol handshake is still to run.
///
/// [`upgrade`](Self::upgrade) waits on the peer and has no deadline of its
/// own; callers bound it.
pub trait PendingConnection: Send + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    fn peer_addr(&self) -> SocketAddr;

    /// Runs the handshake and captures the [`Handshake`] credential.
    async fn upgrade(self) -> Result<Self::Connection, Self::Error>;
}

/// A single connection that can send and receive frames.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends data to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection with a normal close code.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Closes the connection with an application-specific code and reason.
    ///
    /// Defaults to a plain [`close`](Self::close) for transports without
    /// close codes.
    async fn close_with(
        &self,
        _code: u16,
        _reason: &str,
    ) -> Result<(), Self::Error> {
        self.close().await
    }

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns what the client presented when opening the connection.
    fn handshake(&self) -> &Handshake;
}

/// Extracts a bearer credential from a request's query string and
/// `Authorization` header value.
///
/// Empty values count as absent.
pub fn extract_credential(
    query: Option<&str>,
    authorization: Option<&str>,
) -> Option<String> {
    let from_header = authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "token")
        .map(|(_, value)| value.to_string())
        .filter(|token| !token.is_empty())
}
