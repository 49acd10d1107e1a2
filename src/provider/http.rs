//! HTTP adapter for the external identity provider
//!
//! Talks to the provider's credential API with a service bearer token. Every
//! call carries a finite deadline; a deadline hit maps to `ProviderTimeout`
//! (external state unknown) which callers must treat differently from a
//! rejection.
use crate::config::ProviderSettings;
use crate::error::{BridgeError, Result};
use crate::provider::{IdentityProvider, ProviderSession};
use crate::validators::mask_email;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct HttpIdentityProvider {
    config: ProviderSettings,
    http: Client,
}

impl HttpIdentityProvider {
    pub fn new(config: ProviderSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BridgeError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;
        Ok(response)
    }

    /// Translate a non-success provider status into the bridge taxonomy
    ///
    /// Raw provider error codes are logged but never passed through.
    async fn translate_failure(response: reqwest::Response, context: &str) -> BridgeError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                debug!(context, status = %status, "provider rejected request");
                BridgeError::InvalidCredentials
            }
            StatusCode::CONFLICT => BridgeError::EmailAlreadyInUse,
            StatusCode::BAD_REQUEST => {
                warn!(context, status = %status, body = %body, "provider rejected payload");
                BridgeError::InvalidInput("Provider rejected the request".to_string())
            }
            _ => {
                error!(context, status = %status, body = %body, "provider call failed");
                BridgeError::ProviderUnavailable
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn create_credential(&self, email: &str, password: &str) -> Result<ProviderSession> {
        let request = CredentialRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let response = self.post_json("/v1/credentials", &request).await?;
        if !response.status().is_success() {
            return Err(Self::translate_failure(response, "create_credential").await);
        }

        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::Internal(format!("Bad provider response: {}", e)))?;

        debug!(email = %mask_email(email), provider_uid = %body.uid, "provider credential created");
        Ok(ProviderSession {
            provider_uid: body.uid,
            provider_token: body.token,
        })
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<ProviderSession> {
        let request = CredentialRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let response = self.post_json("/v1/sessions", &request).await?;
        if !response.status().is_success() {
            return Err(Self::translate_failure(response, "authenticate").await);
        }

        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::Internal(format!("Bad provider response: {}", e)))?;

        Ok(ProviderSession {
            provider_uid: body.uid,
            provider_token: body.token,
        })
    }

    async fn reauthenticate(&self, provider_token: &str) -> Result<ProviderSession> {
        let request = RefreshRequest {
            token: provider_token.to_string(),
        };

        let response = self.post_json("/v1/sessions/refresh", &request).await?;
        if !response.status().is_success() {
            // A revoked or expired provider session is a dead local session
            let err = Self::translate_failure(response, "reauthenticate").await;
            return Err(match err {
                BridgeError::InvalidCredentials => BridgeError::SessionInvalid,
                other => other,
            });
        }

        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::Internal(format!("Bad provider response: {}", e)))?;

        Ok(ProviderSession {
            provider_uid: body.uid,
            provider_token: body.token,
        })
    }

    async fn delete_credential(&self, provider_uid: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/v1/credentials/{}", provider_uid)))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        // Already-gone counts as deleted for compensation purposes
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::translate_failure(response, "delete_credential").await)
    }

    async fn invalidate_session(&self, provider_token: &str) -> Result<()> {
        let request = RefreshRequest {
            token: provider_token.to_string(),
        };

        let response = self.post_json("/v1/sessions/invalidate", &request).await?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::translate_failure(response, "invalidate_session").await)
    }

    async fn update_password(&self, email: &str, new_password: &str) -> Result<()> {
        let request = CredentialRequest {
            email: email.to_string(),
            password: new_password.to_string(),
        };

        let response = self.post_json("/v1/credentials/password", &request).await?;
        if !response.status().is_success() {
            return Err(Self::translate_failure(response, "update_password").await);
        }
        Ok(())
    }

    async fn update_email(&self, provider_uid: &str, new_email: &str) -> Result<()> {
        let request = UpdateEmailRequest {
            email: new_email.to_string(),
        };

        let response = self
            .post_json(&format!("/v1/credentials/{}/email", provider_uid), &request)
            .await?;
        if !response.status().is_success() {
            return Err(Self::translate_failure(response, "update_email").await);
        }
        Ok(())
    }
}

// ===== Provider API request/response types =====

#[derive(Debug, Serialize)]
struct CredentialRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct RefreshRequest {
    token: String,
}

#[derive(Debug, Serialize)]
struct UpdateEmailRequest {
    email: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    uid: String,
    token: String,
}
