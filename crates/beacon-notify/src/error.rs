//! Error types for the notification layer.

/// Errors reported by a [`NotificationStore`](crate::NotificationStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation.
    #[error("notification store unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the [`Dispatcher`](crate::Dispatcher).
///
/// Delivery problems are never errors here. Only persistence can fail a
/// dispatch, and when it does nothing is delivered.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to persist notification: {0}")]
    Storage(#[from] StoreError),
}
