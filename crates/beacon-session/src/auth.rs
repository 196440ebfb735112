//! The identity verification hook.
//!
//! Beacon doesn't issue or own credentials; an external auth component
//! does. Beacon defines the [`IdentityVerifier`] trait, a single async
//! method that turns a bearer token into an [`Identity`], and the
//! [`SessionGate`](crate::SessionGate) calls it for every new connection.
//!
//! A trait keeps the gate independent of the credential format: HMAC
//! tokens in production ([`HmacTokenVerifier`](crate::HmacTokenVerifier)),
//! a lookup table in tests.

use beacon_protocol::UserId;

use crate::SessionError;

/// Who a verified credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Verifies a bearer token and returns the identity it was issued to.
///
/// `Send + Sync + 'static` because one verifier is shared by every
/// connection task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use beacon_session::{Identity, IdentityVerifier, SessionError};
///
/// /// Accepts `user:<name>` tokens. Development only.
/// struct DevVerifier;
///
/// impl IdentityVerifier for DevVerifier {
///     async fn verify(&self, token: &str) -> Result<Identity, SessionError> {
///         let name = token.strip_prefix("user:").ok_or_else(|| {
///             SessionError::AuthFailed("expected user:<name>".into())
///         })?;
///         Ok(Identity::new(name, name))
///     }
/// }
/// ```
pub trait IdentityVerifier: Send + Sync + 'static {
    /// Validates `token` and returns the identity it was issued to.
    ///
    /// # Errors
    /// - `SessionError::AuthFailed`: token is malformed or forged
    /// - `SessionError::Expired`: token is past its expiry
    fn verify(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}
