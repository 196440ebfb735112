//! Stateless HMAC bearer tokens.
//!
//! Format: `v1.<payload>.<signature>`, where `payload` is the base64url
//! (unpadded) JSON claims and `signature` is base64url HMAC-SHA256 over the
//! encoded payload.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{Identity, IdentityVerifier, SessionError};

const TOKEN_VERSION: &str = "v1";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// User id.
    sub: String,
    /// Display name.
    name: String,
    /// Expiry, seconds since the Unix epoch.
    exp: i64,
}

/// Mints and verifies `v1` HMAC tokens with a shared secret.
#[derive(Clone)]
pub struct HmacTokenVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for HmacTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacTokenVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl HmacTokenVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Issues a token for `identity` that stays valid for `ttl`.
    pub fn mint(&self, identity: &Identity, ttl: Duration) -> String {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let exp = Utc::now().timestamp().saturating_add(ttl_secs);
        let claims = Claims {
            sub: identity.user_id.to_string(),
            name: identity.display_name.clone(),
            exp,
        };
        // A struct of strings and an integer always serializes.
        let json = serde_json::to_vec(&claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes()));
        format!("{TOKEN_VERSION}.{payload}.{signature}")
    }

    /// Checks the signature and expiry of `token`.
    ///
    /// # Errors
    /// - [`SessionError::AuthFailed`]: wrong format, bad signature, or
    ///   unreadable claims
    /// - [`SessionError::Expired`]: `exp` is in the past
    pub fn verify_token(&self, token: &str) -> Result<Identity, SessionError> {
        let mut parts = token.split('.');
        let (Some(version), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionError::AuthFailed("invalid token format".into()));
        };
        if version != TOKEN_VERSION {
            return Err(SessionError::AuthFailed(format!(
                "unsupported token version {version}"
            )));
        }

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SessionError::AuthFailed("malformed signature".into()))?;
        if !constant_time_eq(&self.sign(payload.as_bytes()), &provided) {
            return Err(SessionError::AuthFailed("invalid token signature".into()));
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| SessionError::AuthFailed("malformed payload".into()))?;
        let claims: Claims = serde_json::from_slice(&json)
            .map_err(|e| SessionError::AuthFailed(format!("unreadable claims: {e}")))?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(SessionError::Expired);
        }

        Ok(Identity::new(claims.sub, claims.name))
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length; `new_from_slice` can't fail here.
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

impl IdentityVerifier for HmacTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, SessionError> {
        self.verify_token(token)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> HmacTokenVerifier {
        HmacTokenVerifier::new("test-secret")
    }

    fn alice() -> Identity {
        Identity::new("alice", "Alice")
    }

    #[test]
    fn test_mint_then_verify_returns_identity() {
        let token = verifier().mint(&alice(), Duration::from_secs(60));
        assert!(token.starts_with("v1."));
        assert_eq!(verifier().verify_token(&token).unwrap(), alice());
    }

    #[test]
    fn test_verify_with_other_secret_fails() {
        let token = HmacTokenVerifier::new("other").mint(&alice(), Duration::from_secs(60));
        assert!(matches!(
            verifier().verify_token(&token),
            Err(SessionError::AuthFailed(_))
        ));
    }

    #[test]
    fn test_verify_tampered_payload_fails() {
        let token = verifier().mint(&alice(), Duration::from_secs(60));
        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Claims {
                sub: "mallory".into(),
                name: "Mallory".into(),
                exp: i64::MAX,
            })
            .unwrap(),
        );
        let signature = token.rsplit('.').next().unwrap();
        let forged = format!("v1.{forged_claims}.{signature}");
        assert!(matches!(
            verifier().verify_token(&forged),
            Err(SessionError::AuthFailed(_))
        ));
    }

    #[test]
    fn test_verify_expired_token_fails() {
        let token = verifier().mint(&alice(), Duration::ZERO);
        assert!(matches!(
            verifier().verify_token(&token),
            Err(SessionError::Expired)
        ));
    }

    #[test]
    fn test_verify_garbage_fails() {
        for token in ["", "v1", "v1.a", "v2.a.b", "v1.a.b.c", "v1.!!.??"] {
            assert!(
                matches!(verifier().verify_token(token), Err(SessionError::AuthFailed(_))),
                "token {token:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", verifier());
        assert!(!debug.contains("test-secret"));
    }
}
