use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Purpose of a one-time verification code
///
/// One active code may exist per (email, purpose) pair; issuing a new code
/// for the same pair supersedes the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodePurpose {
    EmailVerification,
    PasswordReset,
    EmailChangeCurrent,
    EmailChangeNew,
}

impl CodePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePurpose::EmailVerification => "email-verification",
            CodePurpose::PasswordReset => "password-reset",
            CodePurpose::EmailChangeCurrent => "email-change-current",
            CodePurpose::EmailChangeNew => "email-change-new",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "email-verification" => Some(CodePurpose::EmailVerification),
            "password-reset" => Some(CodePurpose::PasswordReset),
            "email-change-current" => Some(CodePurpose::EmailChangeCurrent),
            "email-change-new" => Some(CodePurpose::EmailChangeNew),
            _ => None,
        }
    }
}

/// Stored verification code
///
/// Only the salted hash is persisted; the plaintext is returned once to the
/// caller for out-of-band delivery and never stored.
#[derive(Debug, Clone)]
pub struct VerificationCode {
    pub id: Uuid,
    pub email: String,
    pub purpose: CodePurpose,
    pub code_hash: String,
    pub salt: String,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl VerificationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
