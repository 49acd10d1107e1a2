//! Postgres-backed verification code repository
use crate::db::CodeRepository;
use crate::error::Result;
use crate::models::{CodePurpose, VerificationCode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgCodeRepository {
    pool: PgPool,
}

impl PgCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CodeRow {
    id: Uuid,
    email: String,
    purpose: String,
    code_hash: String,
    salt: String,
    expires_at: DateTime<Utc>,
    consumed: bool,
    attempts: i32,
    created_at: DateTime<Utc>,
}

impl CodeRow {
    fn into_code(self) -> Option<VerificationCode> {
        let purpose = CodePurpose::from_str(&self.purpose)?;
        Some(VerificationCode {
            id: self.id,
            email: self.email,
            purpose,
            code_hash: self.code_hash,
            salt: self.salt,
            expires_at: self.expires_at,
            consumed: self.consumed,
            attempts: self.attempts,
            created_at: self.created_at,
        })
    }
}

const CODE_COLUMNS: &str =
    "id, email, purpose, code_hash, salt, expires_at, consumed, attempts, created_at";

#[async_trait]
impl CodeRepository for PgCodeRepository {
    async fn supersede_and_insert(&self, code: VerificationCode) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Supersede-on-issue: at most one active code per (email, purpose)
        sqlx::query(
            r#"
            UPDATE verification_codes
            SET consumed = TRUE, consumed_at = NOW()
            WHERE email = $1 AND purpose = $2 AND consumed = FALSE
            "#,
        )
        .bind(&code.email)
        .bind(code.purpose.as_str())
        .execute(tx.as_mut())
        .await?;

        sqlx::query(
            r#"
            INSERT INTO verification_codes
                (id, email, purpose, code_hash, salt, expires_at, consumed, attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, 0, $7)
            "#,
        )
        .bind(code.id)
        .bind(&code.email)
        .bind(code.purpose.as_str())
        .bind(&code.code_hash)
        .bind(&code.salt)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn latest(&self, email: &str, purpose: CodePurpose) -> Result<Option<VerificationCode>> {
        let row = sqlx::query_as::<_, CodeRow>(&format!(
            r#"
            SELECT {} FROM verification_codes
            WHERE email = $1 AND purpose = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            CODE_COLUMNS
        ))
        .bind(email)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(CodeRow::into_code))
    }

    async fn recent(
        &self,
        email: &str,
        purpose: CodePurpose,
        limit: i64,
    ) -> Result<Vec<VerificationCode>> {
        let rows = sqlx::query_as::<_, CodeRow>(&format!(
            r#"
            SELECT {} FROM verification_codes
            WHERE email = $1 AND purpose = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
            CODE_COLUMNS
        ))
        .bind(email)
        .bind(purpose.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(CodeRow::into_code).collect())
    }

    async fn record_attempt(&self, _email: &str, _purpose: CodePurpose, id: Uuid) -> Result<i32> {
        let attempts = sqlx::query_scalar::<_, i32>(
            "UPDATE verification_codes SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(attempts)
    }

    async fn consume(&self, _email: &str, _purpose: CodePurpose, id: Uuid) -> Result<bool> {
        // Check-and-set: of two concurrent verifies with the correct code,
        // exactly one sees rows_affected == 1
        let result = sqlx::query(
            r#"
            UPDATE verification_codes
            SET consumed = TRUE, consumed_at = NOW()
            WHERE id = $1 AND consumed = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
