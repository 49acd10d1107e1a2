//! External identity provider interface
//!
//! The provider is the system of record for credentials: it owns password
//! hashing, credential storage, and short-lived provider assertions. The
//! bridge consumes it through this trait and never sees a password hash.
mod http;

pub use http::HttpIdentityProvider;

use crate::error::Result;
use async_trait::async_trait;

/// Provider-side session: an externally-hosted credential id plus a
/// short-lived provider assertion
#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub provider_uid: String,
    pub provider_token: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a credential record; first side-effecting step of sign-up
    async fn create_credential(&self, email: &str, password: &str) -> Result<ProviderSession>;

    /// Authenticate an existing credential
    async fn authenticate(&self, email: &str, password: &str) -> Result<ProviderSession>;

    /// Exchange a still-valid provider token for a fresh one
    async fn reauthenticate(&self, provider_token: &str) -> Result<ProviderSession>;

    /// Delete a credential record (sign-up compensation)
    async fn delete_credential(&self, provider_uid: &str) -> Result<()>;

    /// Invalidate the provider-side session for a token
    async fn invalidate_session(&self, provider_token: &str) -> Result<()>;

    /// Set a new password for a credential
    async fn update_password(&self, email: &str, new_password: &str) -> Result<()>;

    /// Move a credential to a new email address
    async fn update_email(&self, provider_uid: &str, new_email: &str) -> Result<()>;
}
