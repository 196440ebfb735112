//! Notifications for Beacon.
//!
//! Business code describes *what* to tell a user as a
//! [`NotificationDraft`]; the [`Dispatcher`] persists it through a
//! [`NotificationStore`] and pushes it to whoever is connected through a
//! [`Delivery`](beacon_registry::Delivery).
//!
//! - [`NotificationDraft`] / [`NotificationEvent`]: drafts and persisted records
//! - [`NotificationStore`] / [`InMemoryNotificationStore`]: the durable record
//! - [`CreditThresholds`]: credit-balance alert rules
//! - [`triggers`]: ready-made drafts for each notification source

mod dispatcher;
mod error;
mod model;
mod store;
mod thresholds;
pub mod triggers;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, StoreError};
pub use model::{NotificationDraft, NotificationEvent, NotificationId};
pub use store::{InMemoryNotificationStore, NotificationQuery, NotificationStore};
pub use thresholds::{CreditAlert, CreditThresholds, ThresholdMode};
