//! Local session token manager
//!
//! Issues and verifies signed, time-boxed JWTs bound to a local user id and
//! role. Tokens are stateless-verifiable; there is no revocation list.
//! Early invalidation (user deleted or disabled mid-lifetime) is handled by
//! the bridge cross-referencing the user directory at verify time.
use crate::config::SessionSettings;
use crate::error::Result;
use crate::models::{Role, SessionClaims, SessionToken};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionTokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl_seconds: i64,
}

impl SessionTokenManager {
    pub fn new(settings: &SessionSettings) -> Self {
        let mut validation = Validation::default();
        validation.set_issuer(&[settings.issuer.clone()]);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            issuer: settings.issuer.clone(),
            ttl_seconds: settings.ttl_seconds,
        }
    }

    /// Mint a session token for a user known to exist in the directory
    pub fn issue(&self, user_id: Uuid, role: Role) -> Result<SessionToken> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            role: role.as_str().to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.ttl_seconds,
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding)?;
        Ok(SessionToken {
            token,
            expires_in: self.ttl_seconds,
        })
    }

    /// Verify signature, expiry, and issuer; returns the claims
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let data = decode::<SessionClaims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}
