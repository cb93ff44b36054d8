//! Data models shared across LoanDesk modules

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod auth;
pub use auth::*;

/// User model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    pub name: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub active: bool,
    pub oauth_provider_id: Option<String>,
    pub oauth_uid: Option<String>,
    #[serde(skip_serializing)]
    pub oauth_access_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            login: user.login,
            name: user.name,
            email: user.email,
            role: user.role,
            oauth_provider_id: user.oauth_provider_id,
            created_at: user.created_at,
        }
    }
}

/// User roles
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Portal,
    Internal,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Portal => "portal",
            UserRole::Internal => "internal",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "portal" => Some(UserRole::Portal),
            "internal" => Some(UserRole::Internal),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// Values for a user about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub login: String,
    pub name: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub oauth_provider_id: Option<String>,
    pub oauth_uid: Option<String>,
    pub oauth_access_token: Option<String>,
}

impl NewUser {
    /// Materialize the record with a fresh id and timestamps
    pub fn into_user(self) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            login: self.login,
            name: self.name,
            email: self.email,
            role: self.role,
            active: true,
            oauth_provider_id: self.oauth_provider_id,
            oauth_uid: self.oauth_uid,
            oauth_access_token: self.oauth_access_token,
            created_at: now,
            updated_at: now,
        }
    }
}

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}
