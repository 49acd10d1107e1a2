//! Shared test harness: a scripted identity provider and a recording email
//! dispatcher wired to the in-memory storage backends.
#![allow(dead_code)]

use async_trait::async_trait;
use identity_bridge::config::{CodeSettings, ConsentSettings, SessionSettings};
use identity_bridge::db::{
    MemoryCodeRepository, MemoryReconciliationJournal, MemoryUserDirectory, ReconciliationJournal,
    UserDirectory,
};
use identity_bridge::error::{BridgeError, Result};
use identity_bridge::models::CodePurpose;
use identity_bridge::provider::{IdentityProvider, ProviderSession};
use identity_bridge::services::{CodeStore, EmailDispatch, IdentityBridge, SessionTokenManager};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted stand-in for the external identity provider
///
/// Credentials are a uid counter plus an in-memory (email, password) map;
/// individual operations can be failed on demand to drive the compensation
/// paths.
#[derive(Default)]
pub struct FakeIdentityProvider {
    next_uid: AtomicU64,
    credentials: Mutex<Vec<Credential>>,
    pub deleted: Mutex<Vec<String>>,
    pub email_updates: Mutex<Vec<(String, String)>>,
    pub invalidated: Mutex<Vec<String>>,
    pub fail_delete: AtomicBool,
    pub fail_invalidate: AtomicBool,
    /// None = unlimited; Some(n) = allow n more email updates, then fail
    pub email_update_budget: Mutex<Option<u32>>,
}

struct Credential {
    uid: String,
    email: String,
    password: String,
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.lock().unwrap().len()
    }

    pub fn credential_email(&self, uid: &str) -> Option<String> {
        self.credentials
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.uid == uid)
            .map(|c| c.email.clone())
    }

    pub fn password_for(&self, email: &str) -> Option<String> {
        self.credentials
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.email == email)
            .map(|c| c.password.clone())
    }

    fn session_for(&self, uid: &str) -> ProviderSession {
        ProviderSession {
            provider_uid: uid.to_string(),
            provider_token: format!("ptok-{}", uid),
        }
    }

    fn uid_for_token(token: &str) -> Option<&str> {
        token.strip_prefix("ptok-")
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn create_credential(&self, email: &str, password: &str) -> Result<ProviderSession> {
        let mut credentials = self.credentials.lock().unwrap();
        if credentials.iter().any(|c| c.email == email) {
            return Err(BridgeError::EmailAlreadyInUse);
        }
        let uid = format!("uid-{}", self.next_uid.fetch_add(1, Ordering::SeqCst));
        credentials.push(Credential {
            uid: uid.clone(),
            email: email.to_string(),
            password: password.to_string(),
        });
        Ok(self.session_for(&uid))
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<ProviderSession> {
        let credentials = self.credentials.lock().unwrap();
        let uid = credentials
            .iter()
            .find(|c| c.email == email && c.password == password)
            .map(|c| c.uid.clone())
            .ok_or(BridgeError::InvalidCredentials)?;
        Ok(self.session_for(&uid))
    }

    async fn reauthenticate(&self, provider_token: &str) -> Result<ProviderSession> {
        let uid = Self::uid_for_token(provider_token).ok_or(BridgeError::SessionInvalid)?;
        let invalidated = self.invalidated.lock().unwrap();
        if invalidated.iter().any(|t| t == provider_token) {
            return Err(BridgeError::SessionInvalid);
        }
        let credentials = self.credentials.lock().unwrap();
        if !credentials.iter().any(|c| c.uid == uid) {
            return Err(BridgeError::SessionInvalid);
        }
        Ok(self.session_for(uid))
    }

    async fn delete_credential(&self, provider_uid: &str) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(BridgeError::ProviderUnavailable);
        }
        self.credentials
            .lock()
            .unwrap()
            .retain(|c| c.uid != provider_uid);
        self.deleted.lock().unwrap().push(provider_uid.to_string());
        Ok(())
    }

    async fn invalidate_session(&self, provider_token: &str) -> Result<()> {
        if self.fail_invalidate.load(Ordering::SeqCst) {
            return Err(BridgeError::ProviderUnavailable);
        }
        self.invalidated
            .lock()
            .unwrap()
            .push(provider_token.to_string());
        Ok(())
    }

    async fn update_password(&self, email: &str, new_password: &str) -> Result<()> {
        let mut credentials = self.credentials.lock().unwrap();
        let credential = credentials
            .iter_mut()
            .find(|c| c.email == email)
            .ok_or(BridgeError::InvalidCredentials)?;
        credential.password = new_password.to_string();
        Ok(())
    }

    async fn update_email(&self, provider_uid: &str, new_email: &str) -> Result<()> {
        {
            let mut budget = self.email_update_budget.lock().unwrap();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(BridgeError::ProviderUnavailable);
                }
                *remaining -= 1;
            }
        }
        let mut credentials = self.credentials.lock().unwrap();
        let credential = credentials
            .iter_mut()
            .find(|c| c.uid == provider_uid)
            .ok_or(BridgeError::InvalidCredentials)?;
        credential.email = new_email.to_string();
        self.email_updates
            .lock()
            .unwrap()
            .push((provider_uid.to_string(), new_email.to_string()));
        Ok(())
    }
}

/// Directory wrapper whose writes can be failed on demand, for driving the
/// compensation paths
pub struct FlakyDirectory {
    inner: Arc<MemoryUserDirectory>,
    pub fail_create_user: AtomicBool,
    pub fail_update_email: AtomicBool,
    pub fail_register_device_token: AtomicBool,
}

impl FlakyDirectory {
    pub fn new(inner: Arc<MemoryUserDirectory>) -> Self {
        Self {
            inner,
            fail_create_user: AtomicBool::new(false),
            fail_update_email: AtomicBool::new(false),
            fail_register_device_token: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl UserDirectory for FlakyDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<identity_bridge::models::User>> {
        self.inner.find_by_email(email).await
    }

    async fn find_by_provider_uid(
        &self,
        provider_uid: &str,
    ) -> Result<Option<identity_bridge::models::User>> {
        self.inner.find_by_provider_uid(provider_uid).await
    }

    async fn find_by_id(
        &self,
        id: uuid::Uuid,
    ) -> Result<Option<identity_bridge::models::User>> {
        self.inner.find_by_id(id).await
    }

    async fn create_user(
        &self,
        profile: &identity_bridge::models::NewUser,
        provider_uid: &str,
    ) -> Result<identity_bridge::models::User> {
        if self.fail_create_user.load(Ordering::SeqCst) {
            return Err(BridgeError::Database("injected create_user failure".into()));
        }
        self.inner.create_user(profile, provider_uid).await
    }

    async fn provider_uid(&self, user_id: uuid::Uuid) -> Result<Option<String>> {
        self.inner.provider_uid(user_id).await
    }

    async fn update_email(&self, user_id: uuid::Uuid, new_email: &str) -> Result<()> {
        if self.fail_update_email.load(Ordering::SeqCst) {
            return Err(BridgeError::Database("injected update_email failure".into()));
        }
        self.inner.update_email(user_id, new_email).await
    }

    async fn mark_email_verified(&self, email: &str) -> Result<()> {
        self.inner.mark_email_verified(email).await
    }

    async fn record_login(&self, user_id: uuid::Uuid) -> Result<()> {
        self.inner.record_login(user_id).await
    }

    async fn register_device_token(&self, user_id: uuid::Uuid, token: &str) -> Result<()> {
        if self.fail_register_device_token.load(Ordering::SeqCst) {
            return Err(BridgeError::Database(
                "injected register_device_token failure".into(),
            ));
        }
        self.inner.register_device_token(user_id, token).await
    }
}

/// Captures dispatched codes so tests can read the plaintext a real user
/// would receive by email
#[derive(Default)]
pub struct RecordingDispatch {
    pub sent: Mutex<Vec<(CodePurpose, String, String)>>,
}

impl RecordingDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(_, to, _)| to == email)
            .map(|(_, _, code)| code.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl EmailDispatch for RecordingDispatch {
    async fn send_code(&self, purpose: CodePurpose, email: &str, code: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((purpose, email.to_string(), code.to_string()));
        Ok(())
    }
}

/// Everything a flow test needs to inspect after driving the bridge
pub struct TestHarness {
    pub bridge: IdentityBridge,
    pub directory: Arc<MemoryUserDirectory>,
    pub provider: Arc<FakeIdentityProvider>,
    pub journal: Arc<MemoryReconciliationJournal>,
    pub dispatch: Arc<RecordingDispatch>,
}

pub fn harness() -> TestHarness {
    harness_with_consent(false)
}

pub fn harness_with_consent(signup_requires_consent: bool) -> TestHarness {
    let directory = Arc::new(MemoryUserDirectory::new());
    let provider = Arc::new(FakeIdentityProvider::new());
    let journal = Arc::new(MemoryReconciliationJournal::new());
    let dispatch = Arc::new(RecordingDispatch::new());

    let codes = CodeStore::new(Arc::new(MemoryCodeRepository::new()), CodeSettings::default());
    let sessions = SessionTokenManager::new(&SessionSettings {
        secret: "integration-test-secret".to_string(),
        issuer: "identity-bridge".to_string(),
        ttl_seconds: 3600,
    });

    let bridge = IdentityBridge::new(
        Arc::clone(&directory) as Arc<dyn UserDirectory>,
        Arc::clone(&provider) as Arc<dyn IdentityProvider>,
        Arc::clone(&journal) as Arc<dyn ReconciliationJournal>,
        Arc::clone(&dispatch) as Arc<dyn EmailDispatch>,
        codes,
        sessions,
        &ConsentSettings {
            signup_requires_consent,
        },
    );

    TestHarness {
        bridge,
        directory,
        provider,
        journal,
        dispatch,
    }
}

/// Harness whose directory writes can be failed mid-saga
pub struct FlakyHarness {
    pub bridge: IdentityBridge,
    pub directory: Arc<MemoryUserDirectory>,
    pub flaky: Arc<FlakyDirectory>,
    pub provider: Arc<FakeIdentityProvider>,
    pub journal: Arc<MemoryReconciliationJournal>,
    pub dispatch: Arc<RecordingDispatch>,
}

pub fn flaky_harness() -> FlakyHarness {
    let directory = Arc::new(MemoryUserDirectory::new());
    let flaky = Arc::new(FlakyDirectory::new(Arc::clone(&directory)));
    let provider = Arc::new(FakeIdentityProvider::new());
    let journal = Arc::new(MemoryReconciliationJournal::new());
    let dispatch = Arc::new(RecordingDispatch::new());

    let codes = CodeStore::new(Arc::new(MemoryCodeRepository::new()), CodeSettings::default());
    let sessions = SessionTokenManager::new(&SessionSettings {
        secret: "integration-test-secret".to_string(),
        issuer: "identity-bridge".to_string(),
        ttl_seconds: 3600,
    });

    let bridge = IdentityBridge::new(
        Arc::clone(&flaky) as Arc<dyn UserDirectory>,
        Arc::clone(&provider) as Arc<dyn IdentityProvider>,
        Arc::clone(&journal) as Arc<dyn ReconciliationJournal>,
        Arc::clone(&dispatch) as Arc<dyn EmailDispatch>,
        codes,
        sessions,
        &ConsentSettings {
            signup_requires_consent: false,
        },
    );

    FlakyHarness {
        bridge,
        directory,
        flaky,
        provider,
        journal,
        dispatch,
    }
}

pub fn signin_input(email: &str, password: &str) -> identity_bridge::services::SignInInput {
    identity_bridge::services::SignInInput {
        email: email.to_string(),
        password: password.to_string(),
        device_token: None,
    }
}

pub fn signup_input(email: &str) -> identity_bridge::services::SignUpInput {
    identity_bridge::services::SignUpInput {
        email: email.to_string(),
        password: "correct-horse-battery".to_string(),
        name: "Test User".to_string(),
        phone: "+34600123456".to_string(),
        address: None,
        role: identity_bridge::models::Role::Client,
        device_token: None,
        notification_permission: None,
    }
}
