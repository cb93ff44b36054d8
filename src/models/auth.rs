//! Authentication models for LoanDesk

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use super::UserRole;

/// User response (sanitized for API)
#[derive(Debug, Serialize, Clone)]
pub struct UserResponse {
    pub id: Uuid,
    pub login: String,
    pub name: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub oauth_provider_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Query parameters of the identity provider callback
#[derive(Debug, Deserialize, Default, Clone)]
pub struct OAuthSigninParams {
    pub code: Option<String>,
    pub access_token: Option<String>,
    /// Opaque JSON state echoed back by the provider
    pub state: Option<String>,
}

/// Session issued after a successful sign-in
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub login: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}
