//! Postgres-backed user directory
use crate::db::UserDirectory;
use crate::error::{BridgeError, Result};
use crate::models::{NewUser, Role, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw row projection; role is stored as lowercase text
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    phone: String,
    address: Option<String>,
    role: String,
    email_verified: bool,
    created_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl UserRow {
    fn into_user(self) -> Result<User> {
        let role = Role::from_str(&self.role)
            .ok_or_else(|| BridgeError::Database(format!("Unknown role value: {}", self.role)))?;
        Ok(User {
            id: self.id,
            email: self.email,
            name: self.name,
            phone: self.phone,
            address: self.address,
            role,
            email_verified: self.email_verified,
            created_at: self.created_at,
            last_login_at: self.last_login_at,
        })
    }
}

const USER_COLUMNS: &str =
    "id, email, name, phone, address, role, email_verified, created_at, last_login_at";

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn find_by_provider_uid(&self, provider_uid: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT u.{} FROM users u
            JOIN identity_links l ON l.user_id = u.id
            WHERE l.provider_uid = $1
            "#,
            USER_COLUMNS.replace(", ", ", u.")
        ))
        .bind(provider_uid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn create_user(&self, profile: &NewUser, provider_uid: &str) -> Result<User> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        // User row and identity link are one transaction: no orphans in
        // either direction. The unique constraint on email is the source of
        // truth when concurrent sign-ups race past the fast-fail check.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, phone, address, role, email_verified, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
            "#,
        )
        .bind(id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(&profile.phone)
        .bind(&profile.address)
        .bind(profile.role.as_str())
        .bind(now)
        .execute(tx.as_mut())
        .await?;

        sqlx::query("INSERT INTO identity_links (provider_uid, user_id) VALUES ($1, $2)")
            .bind(provider_uid)
            .bind(id)
            .execute(tx.as_mut())
            .await?;

        tx.commit().await?;

        Ok(User {
            id,
            email: profile.email.clone(),
            name: profile.name.clone(),
            phone: profile.phone.clone(),
            address: profile.address.clone(),
            role: profile.role,
            email_verified: false,
            created_at: now,
            last_login_at: None,
        })
    }

    async fn provider_uid(&self, user_id: Uuid) -> Result<Option<String>> {
        let uid = sqlx::query_scalar::<_, String>(
            "SELECT provider_uid FROM identity_links WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(uid)
    }

    async fn update_email(&self, user_id: Uuid, new_email: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE users SET email = $2, email_verified = TRUE WHERE id = $1")
                .bind(user_id)
                .bind(new_email)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(BridgeError::SessionInvalid);
        }
        Ok(())
    }

    async fn mark_email_verified(&self, email: &str) -> Result<()> {
        sqlx::query("UPDATE users SET email_verified = TRUE WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_login(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn register_device_token(&self, user_id: Uuid, token: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO device_tokens (user_id, token, registered_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id, token) DO UPDATE SET registered_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
