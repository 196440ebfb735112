//! Connection authentication for Beacon.
//!
//! This crate turns an anonymous transport connection into a [`Session`]
//! bound to a verified user:
//!
//! 1. **Verification**: the [`IdentityVerifier`] trait resolves a bearer
//!    token to an [`Identity`]. [`HmacTokenVerifier`] is the built-in one.
//! 2. **Gating**: the [`SessionGate`] runs verification once per
//!    connection, inside a bounded handshake window, before the connection
//!    may exchange any event.
//!
//! # How it fits in the stack
//!
//! ```text
//! Registry Layer (above)  ← rooms are keyed by the session's user id
//!     ↕
//! Session Layer (this crate)  ← who is on the other end of a connection
//!     ↕
//! Transport + Protocol (below)  ← handshake credential, UserId
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod gate;
mod session;
mod token;

pub use auth::{Identity, IdentityVerifier};
pub use error::SessionError;
pub use gate::SessionGate;
pub use session::{Session, SessionConfig};
pub use token::HmacTokenVerifier;
