//! Connection rooms for Beacon.
//!
//! The registry is the only shared mutable structure in a Beacon server. It
//! knows every admitted connection, which user it is bound to, and which
//! conversations it is watching.
//!
//! # Key types
//!
//! - [`ConnectionRegistry`]: sharded user rooms, join/leave/deliver
//! - [`ConnectionHandle`]: a session plus its outbound queue
//! - [`UserRoom`]: the live connections of one user
//! - [`Reconciliation`]: what the churn reconciler evicted on a join
//! - [`Delivery`]: the trait business code delivers through
//!
//! ```text
//! Notify / handler (above)  ← Delivery::deliver_to_user, relay
//!     ↕
//! Registry (this crate)  ← user rooms, conversation rooms
//!     ↕
//! Session + Protocol (below)  ← Session, ServerEvent
//! ```

mod config;
mod delivery;
mod error;
mod reconcile;
mod registry;
mod relay;
mod room;

pub use config::RegistryConfig;
pub use delivery::Delivery;
pub use error::RegistryError;
pub use reconcile::Reconciliation;
pub use registry::{ConnectionRegistry, JoinReport};
pub use room::{ConnectionHandle, Outbound, OutboundReceiver, OutboundSender, UserRoom};
