//! Identity bridge sagas
//!
//! Orchestrates the two systems of record: the external identity provider
//! (credentials) and the local user directory (users, roles, links). Every
//! multi-step operation either completes, compensates, or journals the
//! inconsistency it could not undo. The original failure is always the error
//! a caller sees; compensation trouble is logged and journaled, never
//! surfaced in its place.
use crate::config::ConsentSettings;
use crate::db::{ReconcileOperation, ReconciliationJournal, UserDirectory};
use crate::error::{BridgeError, Result};
use crate::models::{CodePurpose, NewUser, Role, SessionToken, User};
use crate::provider::IdentityProvider;
use crate::services::code_store::CodeStore;
use crate::services::consent::{ConsentOutcome, NotificationConsentGate, PermissionState};
use crate::services::email::EmailDispatch;
use crate::services::session::SessionTokenManager;
use crate::services::tickets::{FlowTickets, TicketKind};
use crate::validators::{mask_email, validate_email, validate_password_shape, validate_phone};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

const REDIRECT_VERIFY_EMAIL: &str = "/verify-email";
const REDIRECT_ACCOUNT: &str = "/account";
const REDIRECT_ADMIN: &str = "/admin";

/// Sign-up input after HTTP-level deserialization
#[derive(Debug, Clone)]
pub struct SignUpInput {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: String,
    pub address: Option<String>,
    pub role: Role,
    pub device_token: Option<String>,
    pub notification_permission: Option<PermissionState>,
}

#[derive(Debug, Clone)]
pub struct SignInInput {
    pub email: String,
    pub password: String,
    pub device_token: Option<String>,
}

/// Result of an operation that establishes a session
#[derive(Debug, Serialize)]
pub struct AuthOutcome {
    pub user: User,
    pub session: SessionToken,
    pub provider_token: String,
    /// Carried in the response envelope, not the data payload
    #[serde(skip)]
    pub redirect: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SignOutOutcome {
    /// False when the provider could not be reached; local sign-out still
    /// completed
    pub provider_session_revoked: bool,
}

/// Where a two-phase email change stands after a code was consumed
#[derive(Debug, Serialize)]
#[serde(tag = "phase", rename_all = "kebab-case")]
pub enum ChangeEmailProgress {
    /// The code sent to the current address was consumed; the ticket gates
    /// phase two
    CurrentVerified { ticket: String },
    /// The code sent to the new address was consumed and the email changed
    Completed { email: String },
}

pub struct IdentityBridge {
    directory: Arc<dyn UserDirectory>,
    provider: Arc<dyn IdentityProvider>,
    journal: Arc<dyn ReconciliationJournal>,
    email: Arc<dyn EmailDispatch>,
    codes: CodeStore,
    sessions: SessionTokenManager,
    consent: NotificationConsentGate,
    tickets: FlowTickets,
}

impl IdentityBridge {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        provider: Arc<dyn IdentityProvider>,
        journal: Arc<dyn ReconciliationJournal>,
        email: Arc<dyn EmailDispatch>,
        codes: CodeStore,
        sessions: SessionTokenManager,
        consent_settings: &ConsentSettings,
    ) -> Self {
        Self {
            directory,
            provider,
            journal,
            email,
            codes,
            sessions,
            consent: NotificationConsentGate::new(consent_settings.signup_requires_consent),
            tickets: FlowTickets::new(),
        }
    }

    /// Sign-up saga
    ///
    /// Side effects happen in a fixed order: provider credential first, then
    /// the local user + link transaction. A local failure compensates by
    /// deleting the credential; if the compensation itself fails, the orphan
    /// is journaled for the reconciliation worker and the caller still sees
    /// the original error.
    pub async fn sign_up(&self, input: SignUpInput) -> Result<AuthOutcome> {
        let email = input.email.to_lowercase();
        if !validate_email(&email) {
            return Err(BridgeError::InvalidInput("Invalid email address".into()));
        }
        if !validate_password_shape(&input.password) {
            return Err(BridgeError::InvalidInput(
                "Password must be between 8 and 128 characters".into(),
            ));
        }
        if !validate_phone(&input.phone) {
            return Err(BridgeError::InvalidInput("Invalid phone number".into()));
        }

        // Fast-fail; the directory's unique constraint still decides races
        if self.directory.find_by_email(&email).await?.is_some() {
            return Err(BridgeError::EmailAlreadyInUse);
        }

        // Consent is resolved before any side effect touches either system.
        // A retry with an explicit grant overrides a recorded denial, so a
        // rejection here is never a permanent lockout.
        let consent = self.consent.resolve(&email, input.notification_permission);
        if self.consent.requires_consent() && consent != ConsentOutcome::Granted {
            return Err(BridgeError::ConsentRequired);
        }

        let provider_session = self.provider.create_credential(&email, &input.password).await?;

        let profile = NewUser {
            email: email.clone(),
            name: input.name,
            phone: input.phone,
            address: input.address,
            role: input.role,
        };

        let user = match self.directory.create_user(&profile, &provider_session.provider_uid).await
        {
            Ok(user) => user,
            Err(original) => {
                self.compensate_credential(&provider_session.provider_uid, &email).await;
                self.consent.reset(&email);
                return Err(original);
            }
        };

        // The account exists from here on; a device-token hiccup must not
        // cost the caller their session
        if consent == ConsentOutcome::Granted {
            if let Some(token) = &input.device_token {
                if let Err(err) = self.directory.register_device_token(user.id, token).await {
                    warn!(
                        user_id = %user.id,
                        error = %err,
                        "device token registration failed after sign-up"
                    );
                }
            }
        }

        let session = self.sessions.issue(user.id, user.role)?;
        self.send_code_best_effort(&email, CodePurpose::EmailVerification).await;

        info!(
            user_id = %user.id,
            email = %mask_email(&email),
            consent = ?consent,
            "sign-up completed"
        );

        Ok(AuthOutcome {
            user,
            session,
            provider_token: provider_session.provider_token,
            redirect: REDIRECT_VERIFY_EMAIL,
        })
    }

    pub async fn sign_in(&self, input: SignInInput) -> Result<AuthOutcome> {
        let email = input.email.to_lowercase();
        let provider_session = self.provider.authenticate(&email, &input.password).await?;

        let Some(user) = self
            .directory
            .find_by_provider_uid(&provider_session.provider_uid)
            .await?
        else {
            // The provider knows this credential but the directory does not.
            // No session is minted; the caller gets the same generic message
            // as a bad password.
            warn!(
                provider_uid = %provider_session.provider_uid,
                email = %mask_email(&email),
                "credential authenticated but no directory row; account inconsistent"
            );
            return Err(BridgeError::AccountInconsistent);
        };

        self.directory.record_login(user.id).await?;
        if let Some(token) = &input.device_token {
            self.directory.register_device_token(user.id, token).await?;
        }

        let session = self.sessions.issue(user.id, user.role)?;
        let redirect = match user.role {
            Role::Admin => REDIRECT_ADMIN,
            _ => REDIRECT_ACCOUNT,
        };

        info!(user_id = %user.id, email = %mask_email(&email), "sign-in completed");
        Ok(AuthOutcome {
            user,
            session,
            provider_token: provider_session.provider_token,
            redirect,
        })
    }

    /// Exchange a still-valid provider token for a fresh local session
    pub async fn refresh(&self, provider_token: &str) -> Result<AuthOutcome> {
        let provider_session = self.provider.reauthenticate(provider_token).await?;

        let Some(user) = self
            .directory
            .find_by_provider_uid(&provider_session.provider_uid)
            .await?
        else {
            return Err(BridgeError::SessionInvalid);
        };

        let session = self.sessions.issue(user.id, user.role)?;
        Ok(AuthOutcome {
            user,
            session,
            provider_token: provider_session.provider_token,
            redirect: REDIRECT_ACCOUNT,
        })
    }

    /// Sign out: provider session first, local state regardless of outcome
    pub async fn sign_out(&self, provider_token: &str) -> SignOutOutcome {
        let provider_session_revoked = match self.provider.invalidate_session(provider_token).await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "provider session invalidation failed during sign-out");
                false
            }
        };
        SignOutOutcome {
            provider_session_revoked,
        }
    }

    /// Verify a bearer token and cross-check the directory
    ///
    /// A valid signature on a token for a deleted user is still an invalid
    /// session.
    pub async fn authorize(&self, token: &str) -> Result<User> {
        let claims = self.sessions.verify(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| BridgeError::TokenInvalid)?;
        self.directory
            .find_by_id(user_id)
            .await?
            .ok_or(BridgeError::SessionInvalid)
    }

    // --- email verification ---

    pub async fn request_email_verification(&self, email: &str) -> Result<()> {
        self.request_code_for_known_user(email, CodePurpose::EmailVerification).await
    }

    pub async fn verify_email_code(&self, email: &str, code: &str) -> Result<&'static str> {
        let email = email.to_lowercase();
        self.codes.verify(&email, CodePurpose::EmailVerification, code).await?;
        self.directory.mark_email_verified(&email).await?;
        info!(email = %mask_email(&email), "email verified");
        Ok(REDIRECT_ACCOUNT)
    }

    // --- password reset ---

    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        self.request_code_for_known_user(email, CodePurpose::PasswordReset).await
    }

    /// Consume a reset code; the returned ticket gates `update_password`
    pub async fn verify_password_reset_code(&self, email: &str, code: &str) -> Result<String> {
        let email = email.to_lowercase();
        self.codes.verify(&email, CodePurpose::PasswordReset, code).await?;
        Ok(self.tickets.issue(TicketKind::PasswordReset, &email))
    }

    pub async fn update_password(
        &self,
        email: &str,
        ticket: &str,
        new_password: &str,
    ) -> Result<()> {
        let email = email.to_lowercase();
        if !validate_password_shape(new_password) {
            return Err(BridgeError::InvalidInput(
                "Password must be between 8 and 128 characters".into(),
            ));
        }
        self.tickets.consume(ticket, TicketKind::PasswordReset, &email)?;
        self.provider.update_password(&email, new_password).await?;
        info!(email = %mask_email(&email), "password updated");
        Ok(())
    }

    // --- two-phase email change ---

    /// Phase one: challenge the CURRENT address
    pub async fn request_email_change(&self, user: &User) -> Result<()> {
        let code = self.codes.issue(&user.email, CodePurpose::EmailChangeCurrent).await?;
        self.email
            .send_code(CodePurpose::EmailChangeCurrent, &user.email, &code)
            .await
    }

    /// Phase two entry: a phase-one ticket plus the new address
    ///
    /// Nothing is mutated here; the change stays pending until the code sent
    /// to the new address is consumed.
    pub async fn confirm_new_email(
        &self,
        user: &User,
        ticket: &str,
        new_email: &str,
    ) -> Result<()> {
        let new_email = new_email.to_lowercase();
        if !validate_email(&new_email) {
            return Err(BridgeError::InvalidInput("Invalid email address".into()));
        }
        if new_email == user.email {
            return Err(BridgeError::InvalidInput(
                "New email matches the current address".into(),
            ));
        }
        self.tickets.consume(ticket, TicketKind::EmailChange, &user.email)?;

        if self.directory.find_by_email(&new_email).await?.is_some() {
            return Err(BridgeError::EmailAlreadyInUse);
        }

        self.tickets.record_pending_change(user.id, &user.email, &new_email);
        let code = self.codes.issue(&new_email, CodePurpose::EmailChangeNew).await?;
        self.email
            .send_code(CodePurpose::EmailChangeNew, &new_email, &code)
            .await
    }

    /// Consume either email-change code
    ///
    /// An address with a pending change is the NEW address finishing phase
    /// two; anything else is a CURRENT address finishing phase one.
    pub async fn verify_email_change_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<ChangeEmailProgress> {
        let email = email.to_lowercase();

        if self.tickets.has_pending_change(&email) {
            self.codes.verify(&email, CodePurpose::EmailChangeNew, code).await?;
            let Some(pending) = self.tickets.take_pending_change(&email) else {
                return Err(BridgeError::SessionInvalid);
            };
            self.complete_email_change(pending.user_id, &pending.current_email, &email).await?;
            return Ok(ChangeEmailProgress::Completed { email });
        }

        self.codes.verify(&email, CodePurpose::EmailChangeCurrent, code).await?;
        Ok(ChangeEmailProgress::CurrentVerified {
            ticket: self.tickets.issue(TicketKind::EmailChange, &email),
        })
    }

    /// The only place an email address actually changes
    async fn complete_email_change(
        &self,
        user_id: Uuid,
        current_email: &str,
        new_email: &str,
    ) -> Result<()> {
        let Some(provider_uid) = self.directory.provider_uid(user_id).await? else {
            warn!(
                user_id = %user_id,
                email = %mask_email(current_email),
                "email change for a user with no identity link"
            );
            return Err(BridgeError::AccountInconsistent);
        };

        self.provider.update_email(&provider_uid, new_email).await?;

        if let Err(original) = self.directory.update_email(user_id, new_email).await {
            // Provider already moved; put it back or journal the divergence
            if let Err(revert_err) =
                self.provider.update_email(&provider_uid, current_email).await
            {
                error!(
                    provider_uid = %provider_uid,
                    email = %mask_email(current_email),
                    error = %revert_err,
                    "email revert failed; journaling for reconciliation"
                );
                self.journal_or_log(
                    &provider_uid,
                    current_email,
                    ReconcileOperation::RevertEmail,
                    &revert_err,
                )
                .await;
            }
            return Err(original);
        }

        info!(
            user_id = %user_id,
            old = %mask_email(current_email),
            new = %mask_email(new_email),
            "email change completed"
        );
        Ok(())
    }

    // --- internals ---

    /// Issue and dispatch a code, but only for an address the directory
    /// knows; unknown addresses succeed silently so the endpoint does not
    /// confirm account existence
    async fn request_code_for_known_user(&self, email: &str, purpose: CodePurpose) -> Result<()> {
        let email = email.to_lowercase();
        if self.directory.find_by_email(&email).await?.is_none() {
            info!(
                email = %mask_email(&email),
                purpose = purpose.as_str(),
                "code requested for unknown address; not issued"
            );
            return Ok(());
        }
        let code = self.codes.issue(&email, purpose).await?;
        self.email.send_code(purpose, &email, &code).await
    }

    /// Sign-up's verification email must not fail an already-created account
    async fn send_code_best_effort(&self, email: &str, purpose: CodePurpose) {
        let result = match self.codes.issue(email, purpose).await {
            Ok(code) => self.email.send_code(purpose, email, &code).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(
                email = %mask_email(email),
                purpose = purpose.as_str(),
                error = %err,
                "verification code dispatch failed after sign-up"
            );
        }
    }

    async fn compensate_credential(&self, provider_uid: &str, email: &str) {
        if let Err(err) = self.provider.delete_credential(provider_uid).await {
            error!(
                provider_uid = %provider_uid,
                email = %mask_email(email),
                error = %err,
                "credential compensation failed; journaling orphan"
            );
            self.journal_or_log(provider_uid, email, ReconcileOperation::DeleteCredential, &err)
                .await;
        } else {
            info!(
                provider_uid = %provider_uid,
                email = %mask_email(email),
                "orphaned credential deleted"
            );
        }
    }

    /// Last line of defense: if even the journal write fails, the full
    /// identifying context goes to the log
    async fn journal_or_log(
        &self,
        provider_uid: &str,
        email: &str,
        operation: ReconcileOperation,
        cause: &BridgeError,
    ) {
        if let Err(journal_err) = self
            .journal
            .record(provider_uid, email, operation, &cause.to_string())
            .await
        {
            error!(
                provider_uid = %provider_uid,
                email = %mask_email(email),
                operation = operation.as_str(),
                cause = %cause,
                error = %journal_err,
                "failed to journal compensation failure"
            );
        }
    }
}
