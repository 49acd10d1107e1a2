//! Background reconciliation of failed compensations
//!
//! When a saga's compensation step fails, the journal holds an entry that
//! still points at real provider-side state. This worker drains the journal
//! on an interval and replays each entry against the provider until it
//! succeeds or its retry budget runs out; exhausted entries stay in the
//! journal for manual reconciliation.
use crate::db::{ReconcileOperation, ReconciliationJournal};
use crate::error::Result;
use crate::provider::IdentityProvider;
use crate::validators::mask_email;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_attempts: i32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            batch_size: 20,
            max_attempts: 10,
        }
    }
}

/// Replay one batch of pending entries; returns how many were resolved
pub async fn process_batch(
    journal: &Arc<dyn ReconciliationJournal>,
    provider: &Arc<dyn IdentityProvider>,
    config: &ReconcileConfig,
) -> Result<usize> {
    let mut resolved = 0;

    for entry in journal.pending(config.batch_size).await? {
        if entry.attempts >= config.max_attempts {
            warn!(
                id = %entry.id,
                provider_uid = %entry.provider_uid,
                operation = entry.operation.as_str(),
                attempts = entry.attempts,
                "reconciliation retry budget exhausted; manual intervention needed"
            );
            continue;
        }

        let outcome = match entry.operation {
            ReconcileOperation::DeleteCredential => {
                provider.delete_credential(&entry.provider_uid).await
            }
            // The journaled email is the address the credential must return to
            ReconcileOperation::RevertEmail => {
                provider.update_email(&entry.provider_uid, &entry.email).await
            }
        };

        match outcome {
            Ok(()) => {
                journal.mark_resolved(entry.id).await?;
                resolved += 1;
                info!(
                    id = %entry.id,
                    provider_uid = %entry.provider_uid,
                    email = %mask_email(&entry.email),
                    operation = entry.operation.as_str(),
                    "reconciliation entry resolved"
                );
            }
            Err(err) => {
                journal.record_failure(entry.id, &err.to_string()).await?;
                warn!(
                    id = %entry.id,
                    provider_uid = %entry.provider_uid,
                    operation = entry.operation.as_str(),
                    error = %err,
                    "reconciliation attempt failed"
                );
            }
        }
    }

    Ok(resolved)
}

pub fn spawn_reconciliation_worker(
    journal: Arc<dyn ReconciliationJournal>,
    provider: Arc<dyn IdentityProvider>,
    config: ReconcileConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            poll_interval_secs = config.poll_interval.as_secs(),
            batch_size = config.batch_size,
            "reconciliation worker started"
        );
        let mut ticker = tokio::time::interval(config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(err) = process_batch(&journal, &provider, &config).await {
                error!(error = %err, "reconciliation batch failed");
            }
        }
    })
}
