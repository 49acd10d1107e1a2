//! Postgres-backed compensation journal
use crate::db::{ReconcileOperation, ReconciliationEntry, ReconciliationJournal};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgReconciliationJournal {
    pool: PgPool,
}

impl PgReconciliationJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    provider_uid: String,
    email: String,
    operation: String,
    last_error: String,
    attempts: i32,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl EntryRow {
    fn into_entry(self) -> Result<ReconciliationEntry> {
        let operation = ReconcileOperation::from_str(&self.operation).ok_or_else(|| {
            BridgeError::Database(format!("Unknown reconcile operation: {}", self.operation))
        })?;
        Ok(ReconciliationEntry {
            id: self.id,
            provider_uid: self.provider_uid,
            email: self.email,
            operation,
            last_error: self.last_error,
            attempts: self.attempts,
            resolved_at: self.resolved_at,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl ReconciliationJournal for PgReconciliationJournal {
    async fn record(
        &self,
        provider_uid: &str,
        email: &str,
        operation: ReconcileOperation,
        error: &str,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO reconciliation_entries
                (id, provider_uid, email, operation, last_error, attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, 0, NOW())
            "#,
        )
        .bind(id)
        .bind(provider_uid)
        .bind(email)
        .bind(operation.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn pending(&self, limit: i64) -> Result<Vec<ReconciliationEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT id, provider_uid, email, operation, last_error, attempts, resolved_at, created_at
            FROM reconciliation_entries
            WHERE resolved_at IS NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntryRow::into_entry).collect()
    }

    async fn mark_resolved(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE reconciliation_entries SET resolved_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE reconciliation_entries SET attempts = attempts + 1, last_error = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
