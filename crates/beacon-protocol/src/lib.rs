//! Wire protocol for Beacon.
//!
//! This crate defines the "language" that clients and the server speak:
//!
//! - **Types** ([`ClientEvent`], [`ServerEvent`], [`NotificationPayload`],
//!   [`UserId`], ...): the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those structures are
//!   converted to and from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer doesn't know about connections or rooms.
//!
//! ```text
//! Transport (bytes) → Protocol (events) → Session (identity) → Registry (rooms)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    Category, ClientEvent, ConversationId, NotificationMetadata,
    NotificationPayload, Priority, Recipient, ServerEvent, UserId,
};
