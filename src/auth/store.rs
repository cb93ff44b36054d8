//! Persistence seam for user records

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{NewUser, User};
use crate::store::StoreError;

/// Record store operations needed by the identity bridge
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    /// Write provider, subject id and access token onto a user
    async fn link_oauth(
        &self,
        user_id: Uuid,
        provider_id: &str,
        oauth_uid: &str,
        access_token: &str,
    ) -> Result<(), StoreError>;

    async fn find_users_by_oauth(
        &self,
        provider_id: &str,
        oauth_uid: &str,
    ) -> Result<Vec<User>, StoreError>;

    async fn update_access_token(&self, user_id: Uuid, access_token: &str)
        -> Result<(), StoreError>;

    /// Redeem a signup token. A token issued to an existing user links that
    /// user with the OAuth fields of `user`; otherwise a new user is created.
    ///
    /// Fails with `NotFound` when the token is unknown, used or expired.
    async fn signup_with_token(&self, token: &str, user: NewUser) -> Result<User, StoreError>;
}
