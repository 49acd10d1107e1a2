use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Application role, stored as lowercase text in the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Provider,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "client" => Some(Role::Client),
            "provider" => Some(Role::Provider),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Client
    }
}

/// User record - owned by the local user directory
///
/// A user row exists if and only if its identity link exists; both are
/// written in a single transaction during sign-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: String,
    pub address: Option<String>,
    pub role: Role,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_email_verified(&self) -> bool {
        self.email_verified
    }
}

/// Profile fields captured at sign-up, before a user row exists
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub phone: String,
    pub address: Option<String>,
    pub role: Role,
}

/// Link between an external provider credential and a local user
#[derive(Debug, Clone)]
pub struct IdentityLink {
    pub provider_uid: String,
    pub user_id: Uuid,
}

/// Registered push-notification device token
#[derive(Debug, Clone, Serialize)]
pub struct DeviceToken {
    pub user_id: Uuid,
    pub token: String,
    pub registered_at: DateTime<Utc>,
}
