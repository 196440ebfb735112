//! # Beacon
//!
//! Real-time, per-user notification delivery over authenticated WebSocket
//! connections.
//!
//! A client connects with a bearer token, the session gate binds the
//! connection to a user, and from then on anything business code dispatches
//! to that user (or to everyone) is persisted and pushed to every live
//! connection the user holds.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use beacon::prelude::*;
//!
//! # async fn run() -> Result<(), BeaconError> {
//! let server = BeaconServerBuilder::new()
//!     .config(BeaconConfig::default())
//!     .build(
//!         HmacTokenVerifier::new("secret"),
//!         Arc::new(InMemoryNotificationStore::new()),
//!     )
//!     .await?;
//!
//! let dispatcher = server.dispatcher().clone();
//! tokio::spawn(async move {
//!     let draft = triggers::profile_updated(&"alice".into());
//!     let _ = dispatcher.dispatch(draft).await;
//! });
//!
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;
pub mod telemetry;

pub use config::{
    BeaconConfig, ConfigError, ENV_BIND, ENV_MAX_CONNECTIONS_PER_USER, ENV_TOKEN_SECRET,
};
pub use error::BeaconError;
pub use server::{BeaconServer, BeaconServerBuilder};

/// Re-exports for the common case.
pub mod prelude {
    pub use beacon_notify::{
        CreditThresholds, DispatchError, Dispatcher, InMemoryNotificationStore, NotificationDraft,
        NotificationEvent, NotificationQuery, NotificationStore, ThresholdMode, triggers,
    };
    pub use beacon_protocol::{Category, ConversationId, Recipient, ServerEvent, UserId};
    pub use beacon_registry::{ConnectionRegistry, Delivery};
    pub use beacon_session::{HmacTokenVerifier, Identity, IdentityVerifier, SessionError};

    pub use crate::{BeaconConfig, BeaconError, BeaconServer, BeaconServerBuilder};
}
