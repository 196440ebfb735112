//! The session gate: the one place a connection gets an identity.
//!
//! ```text
//! upgrade request ──→ Handshake { credential } ──→ admit()
//!                                                    │
//!                          ┌─────────────────────────┴──────────┐
//!                          ▼                                    ▼
//!                  Ok(Session) → join user room        Err(SessionError) → auth-error + close
//! ```
//!
//! The gate is the only suspension point before admission: a connection
//! can't join a room until `admit` has resolved.

use beacon_transport::{ConnectionId, Handshake};

use crate::{Identity, IdentityVerifier, Session, SessionConfig, SessionError};

/// Verifies connection credentials inside a bounded handshake window.
pub struct SessionGate<V: IdentityVerifier> {
    verifier: V,
    config: SessionConfig,
}

impl<V: IdentityVerifier> SessionGate<V> {
    pub fn new(verifier: V, config: SessionConfig) -> Self {
        Self { verifier, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Resolves a raw credential to an identity.
    ///
    /// # Errors
    /// - [`SessionError::MissingCredential`]: no (or an empty) credential
    /// - [`SessionError::HandshakeTimeout`]: the verifier took longer than
    ///   `config.handshake_timeout`
    /// - whatever the verifier returned, otherwise
    pub async fn authenticate(
        &self,
        credential: Option<&str>,
    ) -> Result<Identity, SessionError> {
        let token = credential
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(SessionError::MissingCredential)?;

        let window = self.config.handshake_timeout;
        let identity = tokio::time::timeout(window, self.verifier.verify(token))
            .await
            .map_err(|_| SessionError::HandshakeTimeout(window))??;

        if identity.user_id.as_str().is_empty() {
            return Err(SessionError::AuthFailed(
                "verifier returned an empty user id".into(),
            ));
        }

        Ok(identity)
    }

    /// Authenticates the credential captured during the handshake and binds
    /// the connection to the resulting identity.
    pub async fn admit(
        &self,
        connection_id: ConnectionId,
        handshake: &Handshake,
    ) -> Result<Session, SessionError> {
        match self.authenticate(handshake.credential.as_deref()).await {
            Ok(identity) => {
                tracing::info!(
                    %connection_id,
                    user_id = %identity.user_id,
                    "connection admitted"
                );
                Ok(Session::bind(connection_id, identity))
            }
            Err(e) => {
                tracing::info!(
                    %connection_id,
                    peer = ?handshake.peer_addr,
                    error = %e,
                    "connection refused"
                );
                Err(e)
            }
        }
    }
}
