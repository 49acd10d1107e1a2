//! Outbound email dispatch for one-time codes
//!
//! The bridge only cares that a code reached its address; message bodies are
//! one-line plaintext. Without SMTP configuration the dispatcher runs in
//! no-op mode and logs what it would have sent, which keeps local
//! development and tests free of mail infrastructure.
use crate::error::{BridgeError, Result};
use crate::models::CodePurpose;
use crate::validators::mask_email;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::config::EmailSettings;

#[async_trait]
pub trait EmailDispatch: Send + Sync {
    async fn send_code(&self, purpose: CodePurpose, email: &str, code: &str) -> Result<()>;
}

fn subject_for(purpose: CodePurpose) -> &'static str {
    match purpose {
        CodePurpose::EmailVerification => "Verify your email address",
        CodePurpose::PasswordReset => "Your password reset code",
        CodePurpose::EmailChangeCurrent => "Confirm your email change",
        CodePurpose::EmailChangeNew => "Confirm your new email address",
    }
}

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Disabled,
}

pub struct SmtpEmailDispatch {
    transport: Transport,
    from: Mailbox,
}

impl SmtpEmailDispatch {
    pub fn new(settings: &EmailSettings) -> anyhow::Result<Self> {
        let from: Mailbox = settings
            .smtp_from
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid SMTP_FROM address: {e}"))?;

        if settings.smtp_host.is_empty() {
            warn!("SMTP_HOST not set; email dispatch runs in no-op mode");
            return Ok(Self {
                transport: Transport::Disabled,
                from,
            });
        }

        let mut builder = if settings.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.smtp_host)
        };
        builder = builder.port(settings.smtp_port);

        if let (Some(user), Some(pass)) = (&settings.smtp_username, &settings.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: Transport::Smtp(builder.build()),
            from,
        })
    }
}

#[async_trait]
impl EmailDispatch for SmtpEmailDispatch {
    async fn send_code(&self, purpose: CodePurpose, email: &str, code: &str) -> Result<()> {
        let transport = match &self.transport {
            Transport::Smtp(transport) => transport,
            Transport::Disabled => {
                info!(
                    email = %mask_email(email),
                    purpose = purpose.as_str(),
                    "email dispatch disabled; code not sent"
                );
                return Ok(());
            }
        };

        let to: Mailbox = email
            .parse()
            .map_err(|_| BridgeError::InvalidInput("Invalid email address".to_string()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject_for(purpose))
            .body(format!("Your verification code is: {code}"))
            .map_err(|e| BridgeError::Internal(format!("Failed to build email: {e}")))?;

        transport.send(message).await.map_err(|e| {
            warn!(
                email = %mask_email(email),
                purpose = purpose.as_str(),
                error = %e,
                "email dispatch failed"
            );
            BridgeError::Internal("Email dispatch failed".to_string())
        })?;

        info!(
            email = %mask_email(email),
            purpose = purpose.as_str(),
            "verification code dispatched"
        );
        Ok(())
    }
}
