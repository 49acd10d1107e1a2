//! Storage layer for the identity bridge
//!
//! Each collaborator the bridge persists through is a trait with a Postgres
//! implementation (production) and an in-memory implementation (tests and
//! infrastructure-free development).
pub mod codes;
pub mod memory;
pub mod reconciliation;
pub mod users;

pub use codes::PgCodeRepository;
pub use memory::{MemoryCodeRepository, MemoryReconciliationJournal, MemoryUserDirectory};
pub use reconciliation::PgReconciliationJournal;
pub use users::PgUserDirectory;

use crate::error::Result;
use crate::models::{CodePurpose, NewUser, User, VerificationCode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Local authority over application users
///
/// `create_user` writes the user row and its identity link in one
/// transaction: a user exists if and only if its link exists.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_provider_uid(&self, provider_uid: &str) -> Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn create_user(&self, profile: &NewUser, provider_uid: &str) -> Result<User>;
    async fn provider_uid(&self, user_id: Uuid) -> Result<Option<String>>;
    async fn update_email(&self, user_id: Uuid, new_email: &str) -> Result<()>;
    async fn mark_email_verified(&self, email: &str) -> Result<()>;
    async fn record_login(&self, user_id: Uuid) -> Result<()>;
    async fn register_device_token(&self, user_id: Uuid, token: &str) -> Result<()>;
}

/// Backing store for one-time verification codes
#[async_trait]
pub trait CodeRepository: Send + Sync {
    /// Mark any active code for (email, purpose) consumed, then insert
    async fn supersede_and_insert(&self, code: VerificationCode) -> Result<()>;

    /// Most recently issued code for the pair, regardless of state
    async fn latest(&self, email: &str, purpose: CodePurpose) -> Result<Option<VerificationCode>>;

    /// Recent codes for the pair, newest first (superseded-code detection)
    async fn recent(
        &self,
        email: &str,
        purpose: CodePurpose,
        limit: i64,
    ) -> Result<Vec<VerificationCode>>;

    /// Increment the attempt counter; returns the new count
    async fn record_attempt(&self, email: &str, purpose: CodePurpose, id: Uuid) -> Result<i32>;

    /// Atomic check-and-set consumption; `true` iff this call consumed it
    async fn consume(&self, email: &str, purpose: CodePurpose, id: Uuid) -> Result<bool>;
}

/// Operation recorded for out-of-band compensation retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOperation {
    /// Delete an orphaned provider credential (sign-up compensation)
    DeleteCredential,
    /// Move a provider credential back to its previous email address
    RevertEmail,
}

impl ReconcileOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOperation::DeleteCredential => "delete-credential",
            ReconcileOperation::RevertEmail => "revert-email",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "delete-credential" => Some(ReconcileOperation::DeleteCredential),
            "revert-email" => Some(ReconcileOperation::RevertEmail),
            _ => None,
        }
    }
}

/// Journaled compensation failure awaiting retry
#[derive(Debug, Clone)]
pub struct ReconciliationEntry {
    pub id: Uuid,
    pub provider_uid: String,
    pub email: String,
    pub operation: ReconcileOperation,
    pub last_error: String,
    pub attempts: i32,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Durable journal of failed compensations
///
/// Nothing that leaves the two systems of record inconsistent is silently
/// swallowed: every entry carries enough identifying data to reconcile the
/// provider manually if retries keep failing.
#[async_trait]
pub trait ReconciliationJournal: Send + Sync {
    async fn record(
        &self,
        provider_uid: &str,
        email: &str,
        operation: ReconcileOperation,
        error: &str,
    ) -> Result<Uuid>;

    async fn pending(&self, limit: i64) -> Result<Vec<ReconciliationEntry>>;
    async fn mark_resolved(&self, id: Uuid) -> Result<()>;
    async fn record_failure(&self, id: Uuid, error: &str) -> Result<()>;
}
