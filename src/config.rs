//! Configuration for the identity bridge service
//!
//! Loaded once at startup from environment variables (with a `.env` file in
//! development) and injected explicitly into each component. There is no
//! module-level configuration cache; reload means restart or rebuilding the
//! affected component with fresh `Settings`.

use anyhow::{Context, Result};
use std::env;
use tracing::info;

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub provider: ProviderSettings,
    pub session: SessionSettings,
    pub codes: CodeSettings,
    pub email: EmailSettings,
    pub consent: ConsentSettings,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            server: ServerSettings::from_env()?,
            database: DatabaseSettings::from_env()?,
            provider: ProviderSettings::from_env()?,
            session: SessionSettings::from_env()?,
            codes: CodeSettings::from_env()?,
            email: EmailSettings::from_env()?,
            consent: ConsentSettings::from_env(),
        })
    }
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid SERVER_PORT")?,
        })
    }
}

/// Database connection settings
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("Invalid DATABASE_MIN_CONNECTIONS")?,
            acquire_timeout: env::var("DATABASE_ACQUIRE_TIMEOUT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DATABASE_ACQUIRE_TIMEOUT")?,
        })
    }
}

/// External identity provider API settings
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_url: String,
    pub api_key: String,
    /// Finite deadline on every provider call; a timeout surfaces as
    /// `ProviderTimeout` so callers can tell "unknown" from "rejected"
    pub timeout_secs: u64,
}

impl ProviderSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            api_url: env::var("PROVIDER_API_URL").context("PROVIDER_API_URL must be set")?,
            api_key: env::var("PROVIDER_API_KEY").context("PROVIDER_API_KEY must be set")?,
            timeout_secs: env::var("PROVIDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid PROVIDER_TIMEOUT_SECS")?,
        })
    }
}

/// Local session token settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub secret: String,
    pub issuer: String,
    pub ttl_seconds: i64,
}

impl SessionSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            secret: env::var("SESSION_SECRET").context("SESSION_SECRET must be set")?,
            issuer: env::var("SESSION_ISSUER").unwrap_or_else(|_| "identity-bridge".to_string()),
            ttl_seconds: env::var("SESSION_TTL_SECONDS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .context("Invalid SESSION_TTL_SECONDS")?,
        })
    }
}

/// One-time verification code settings
#[derive(Debug, Clone)]
pub struct CodeSettings {
    pub length: usize,
    pub ttl_seconds: i64,
    pub max_attempts: i32,
}

impl CodeSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            length: env::var("CODE_LENGTH")
                .unwrap_or_else(|_| "6".to_string())
                .parse()
                .context("Invalid CODE_LENGTH")?,
            ttl_seconds: env::var("CODE_TTL_SECONDS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .context("Invalid CODE_TTL_SECONDS")?,
            max_attempts: env::var("CODE_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid CODE_MAX_ATTEMPTS")?,
        })
    }
}

impl Default for CodeSettings {
    fn default() -> Self {
        Self {
            length: 6,
            ttl_seconds: 900,
            max_attempts: 5,
        }
    }
}

/// SMTP configuration for code delivery
#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    pub use_starttls: bool,
}

impl EmailSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            smtp_host: env::var("SMTP_HOST").unwrap_or_default(),
            smtp_port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .context("Invalid SMTP_PORT")?,
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            smtp_from: env::var("SMTP_FROM")
                .unwrap_or_else(|_| "noreply@example.com".to_string()),
            use_starttls: env::var("SMTP_USE_STARTTLS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        })
    }
}

/// Device-token consent policy for the sign-up flow
///
/// The flow can treat consent as mandatory or optional; this is an explicit
/// policy parameter, not a hidden rule.
#[derive(Debug, Clone)]
pub struct ConsentSettings {
    pub signup_requires_consent: bool,
}

impl ConsentSettings {
    fn from_env() -> Self {
        Self {
            signup_requires_consent: env::var("CONSENT_REQUIRED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn session_settings_from_env() {
        env::set_var("SESSION_SECRET", "test-secret");
        env::set_var("SESSION_TTL_SECONDS", "7200");

        let settings = SessionSettings::from_env().unwrap();
        assert_eq!(settings.secret, "test-secret");
        assert_eq!(settings.ttl_seconds, 7200);
        assert_eq!(settings.issuer, "identity-bridge");

        env::remove_var("SESSION_SECRET");
        env::remove_var("SESSION_TTL_SECONDS");
    }

    #[test]
    #[serial]
    fn code_settings_defaults() {
        env::remove_var("CODE_LENGTH");
        env::remove_var("CODE_TTL_SECONDS");
        env::remove_var("CODE_MAX_ATTEMPTS");

        let settings = CodeSettings::from_env().unwrap();
        assert_eq!(settings.length, 6);
        assert_eq!(settings.ttl_seconds, 900);
        assert_eq!(settings.max_attempts, 5);
    }

    #[test]
    #[serial]
    fn consent_policy_defaults_to_optional() {
        env::remove_var("CONSENT_REQUIRED");
        assert!(!ConsentSettings::from_env().signup_requires_consent);

        env::set_var("CONSENT_REQUIRED", "true");
        assert!(ConsentSettings::from_env().signup_requires_consent);
        env::remove_var("CONSENT_REQUIRED");
    }
}
