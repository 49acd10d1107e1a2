//! One-time verification code store
//!
//! Issues fixed-length numeric codes, persists only a salted hash, and
//! enforces single consumption with a bounded attempt budget. At most one
//! code is active per (email, purpose) pair; issuing supersedes the prior
//! one.
use crate::config::CodeSettings;
use crate::db::CodeRepository;
use crate::error::{BridgeError, Result};
use crate::models::{CodePurpose, VerificationCode};
use crate::validators::{mask_email, validate_code_shape};
use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Superseded rows consulted to distinguish an old code from a typo
const SUPERSEDED_LOOKBACK: i64 = 5;

#[derive(Clone)]
pub struct CodeStore {
    repo: Arc<dyn CodeRepository>,
    settings: CodeSettings,
}

/// Salted hash of a code; the plaintext never reaches storage
fn hash_code(salt: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_salt() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    hex::encode(bytes)
}

fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

impl CodeStore {
    pub fn new(repo: Arc<dyn CodeRepository>, settings: CodeSettings) -> Self {
        Self { repo, settings }
    }

    /// Issue a fresh code, superseding any active one for the pair
    ///
    /// Returns the plaintext exactly once, for out-of-band delivery.
    pub async fn issue(&self, email: &str, purpose: CodePurpose) -> Result<String> {
        let email = email.to_lowercase();
        let plaintext = generate_code(self.settings.length);
        let salt = generate_salt();
        let now = Utc::now();

        let code = VerificationCode {
            id: Uuid::new_v4(),
            email: email.clone(),
            purpose,
            code_hash: hash_code(&salt, &plaintext),
            salt,
            expires_at: now + Duration::seconds(self.settings.ttl_seconds),
            consumed: false,
            attempts: 0,
            created_at: now,
        };

        self.repo.supersede_and_insert(code).await?;

        info!(
            email = %mask_email(&email),
            purpose = purpose.as_str(),
            "verification code issued"
        );

        Ok(plaintext)
    }

    /// Reissue; identical to `issue`, the supersede is the point
    pub async fn resend(&self, email: &str, purpose: CodePurpose) -> Result<String> {
        self.issue(email, purpose).await
    }

    /// Verify and consume a candidate code
    ///
    /// Consumption is check-and-set: of two concurrent calls with the
    /// correct code exactly one succeeds, the other sees
    /// `CodeAlreadyConsumed`.
    pub async fn verify(&self, email: &str, purpose: CodePurpose, candidate: &str) -> Result<()> {
        let email = email.to_lowercase();

        // Shape check fails before any side effect
        if !validate_code_shape(candidate, self.settings.length) {
            return Err(BridgeError::InvalidInput(
                "Malformed verification code".to_string(),
            ));
        }

        let Some(latest) = self.repo.latest(&email, purpose).await? else {
            return Err(BridgeError::CodeExpired);
        };

        if latest.consumed {
            return Err(BridgeError::CodeAlreadyConsumed);
        }
        if latest.is_expired(Utc::now()) {
            return Err(BridgeError::CodeExpired);
        }
        if latest.attempts >= self.settings.max_attempts {
            return Err(BridgeError::TooManyAttempts);
        }

        // Attempts count regardless of correctness
        let attempts = self.repo.record_attempt(&email, purpose, latest.id).await?;
        if attempts > self.settings.max_attempts {
            warn!(
                email = %mask_email(&email),
                purpose = purpose.as_str(),
                attempts,
                "verification attempt budget exhausted"
            );
            return Err(BridgeError::TooManyAttempts);
        }

        if hash_code(&latest.salt, candidate) != latest.code_hash {
            // An old code superseded by a reissue reports as consumed, not
            // as a typo
            let history = self.repo.recent(&email, purpose, SUPERSEDED_LOOKBACK).await?;
            for old in history.iter().skip(1) {
                if hash_code(&old.salt, candidate) == old.code_hash {
                    return Err(BridgeError::CodeAlreadyConsumed);
                }
            }
            return Err(BridgeError::CodeMismatch);
        }

        if !self.repo.consume(&email, purpose, latest.id).await? {
            return Err(BridgeError::CodeAlreadyConsumed);
        }

        info!(
            email = %mask_email(&email),
            purpose = purpose.as_str(),
            "verification code consumed"
        );
        Ok(())
    }
}
