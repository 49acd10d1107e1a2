//! In-memory storage backends
//!
//! Used by the test suite and by infrastructure-free development. Semantics
//! match the Postgres implementations: atomic uniqueness on email, CAS code
//! consumption, bounded code history per (email, purpose).
use crate::db::{
    CodeRepository, ReconcileOperation, ReconciliationEntry, ReconciliationJournal, UserDirectory,
};
use crate::error::{BridgeError, Result};
use crate::models::{CodePurpose, NewUser, User, VerificationCode};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

/// Codes kept per (email, purpose); enough to recognize a superseded code
const CODE_HISTORY: usize = 5;

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: DashMap<String, User>,
    links: DashMap<String, Uuid>,
    emails_by_id: DashMap<Uuid, String>,
    device_tokens: DashMap<(Uuid, String), chrono::DateTime<Utc>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn has_device_token(&self, user_id: Uuid, token: &str) -> bool {
        self.device_tokens
            .contains_key(&(user_id, token.to_string()))
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users.get(email).map(|u| u.clone()))
    }

    async fn find_by_provider_uid(&self, provider_uid: &str) -> Result<Option<User>> {
        let Some(user_id) = self.links.get(provider_uid).map(|id| *id) else {
            return Ok(None);
        };
        self.find_by_id(user_id).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let Some(email) = self.emails_by_id.get(&id).map(|e| e.clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&email).map(|u| u.clone()))
    }

    async fn create_user(&self, profile: &NewUser, provider_uid: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            email: profile.email.clone(),
            name: profile.name.clone(),
            phone: profile.phone.clone(),
            address: profile.address.clone(),
            role: profile.role,
            email_verified: false,
            created_at: Utc::now(),
            last_login_at: None,
        };

        // Entry API makes check-and-insert atomic, matching the database
        // unique constraint under concurrent sign-ups
        match self.users.entry(profile.email.clone()) {
            Entry::Occupied(_) => return Err(BridgeError::EmailAlreadyInUse),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
            }
        }
        self.links.insert(provider_uid.to_string(), user.id);
        self.emails_by_id.insert(user.id, user.email.clone());

        Ok(user)
    }

    async fn provider_uid(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self
            .links
            .iter()
            .find(|entry| *entry.value() == user_id)
            .map(|entry| entry.key().clone()))
    }

    async fn update_email(&self, user_id: Uuid, new_email: &str) -> Result<()> {
        let Some(old_email) = self.emails_by_id.get(&user_id).map(|e| e.clone()) else {
            return Err(BridgeError::SessionInvalid);
        };

        let Some((_, mut user)) = self.users.remove(&old_email) else {
            return Err(BridgeError::SessionInvalid);
        };
        user.email = new_email.to_string();
        user.email_verified = true;

        match self.users.entry(new_email.to_string()) {
            Entry::Occupied(_) => {
                // Put the old record back; the new address is taken
                user.email = old_email.clone();
                self.users.insert(old_email, user);
                return Err(BridgeError::EmailAlreadyInUse);
            }
            Entry::Vacant(slot) => {
                slot.insert(user);
            }
        }
        self.emails_by_id.insert(user_id, new_email.to_string());
        Ok(())
    }

    async fn mark_email_verified(&self, email: &str) -> Result<()> {
        if let Some(mut user) = self.users.get_mut(email) {
            user.email_verified = true;
        }
        Ok(())
    }

    async fn record_login(&self, user_id: Uuid) -> Result<()> {
        if let Some(email) = self.emails_by_id.get(&user_id).map(|e| e.clone()) {
            if let Some(mut user) = self.users.get_mut(&email) {
                user.last_login_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn register_device_token(&self, user_id: Uuid, token: &str) -> Result<()> {
        self.device_tokens
            .insert((user_id, token.to_string()), Utc::now());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCodeRepository {
    // Newest first per (email, purpose)
    codes: DashMap<(String, CodePurpose), Vec<VerificationCode>>,
}

impl MemoryCodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CodeRepository for MemoryCodeRepository {
    async fn supersede_and_insert(&self, code: VerificationCode) -> Result<()> {
        let key = (code.email.clone(), code.purpose);
        let mut history = self.codes.entry(key).or_default();
        for prior in history.iter_mut() {
            if !prior.consumed {
                prior.consumed = true;
            }
        }
        history.insert(0, code);
        history.truncate(CODE_HISTORY);
        Ok(())
    }

    async fn latest(&self, email: &str, purpose: CodePurpose) -> Result<Option<VerificationCode>> {
        Ok(self
            .codes
            .get(&(email.to_string(), purpose))
            .and_then(|history| history.first().cloned()))
    }

    async fn recent(
        &self,
        email: &str,
        purpose: CodePurpose,
        limit: i64,
    ) -> Result<Vec<VerificationCode>> {
        Ok(self
            .codes
            .get(&(email.to_string(), purpose))
            .map(|history| history.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn record_attempt(&self, email: &str, purpose: CodePurpose, id: Uuid) -> Result<i32> {
        let mut history = self
            .codes
            .get_mut(&(email.to_string(), purpose))
            .ok_or_else(|| BridgeError::Internal("code not found".to_string()))?;
        let code = history
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| BridgeError::Internal("code not found".to_string()))?;
        code.attempts += 1;
        Ok(code.attempts)
    }

    async fn consume(&self, email: &str, purpose: CodePurpose, id: Uuid) -> Result<bool> {
        // The shard lock held by get_mut makes this a true check-and-set
        let mut history = self
            .codes
            .get_mut(&(email.to_string(), purpose))
            .ok_or_else(|| BridgeError::Internal("code not found".to_string()))?;
        let code = history
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| BridgeError::Internal("code not found".to_string()))?;
        if code.consumed {
            return Ok(false);
        }
        code.consumed = true;
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemoryReconciliationJournal {
    entries: DashMap<Uuid, ReconciliationEntry>,
}

impl MemoryReconciliationJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unresolved_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.resolved_at.is_none())
            .count()
    }
}

#[async_trait]
impl ReconciliationJournal for MemoryReconciliationJournal {
    async fn record(
        &self,
        provider_uid: &str,
        email: &str,
        operation: ReconcileOperation,
        error: &str,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.entries.insert(
            id,
            ReconciliationEntry {
                id,
                provider_uid: provider_uid.to_string(),
                email: email.to_string(),
                operation,
                last_error: error.to_string(),
                attempts: 0,
                resolved_at: None,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn pending(&self, limit: i64) -> Result<Vec<ReconciliationEntry>> {
        let mut pending: Vec<ReconciliationEntry> = self
            .entries
            .iter()
            .filter(|e| e.resolved_at.is_none())
            .map(|e| e.clone())
            .collect();
        pending.sort_by_key(|e| e.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn mark_resolved(&self, id: Uuid) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            entry.resolved_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            entry.attempts += 1;
            entry.last_error = error.to_string();
        }
        Ok(())
    }
}
