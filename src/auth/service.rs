//! OAuth sign-in service
//!
//! Maps an external identity onto a local user: code exchange, claims
//! retrieval, user lookup or creation, linking, and the signup-token
//! fallback when linking cannot be verified.

use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewUser, OAuthSigninParams, SessionResponse, User, UserRole};
use crate::store::StoreError;

use super::claims::{decode_id_token, ClaimsError, IdentityClaims};
use super::jwt::{generate_session_token, JwtError};
use super::provider::{IdentityProvider, OAuthProviderConfig};
use super::store::UserStore;

/// OAuth service errors
#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("Access Denied: {0}")]
    AccessDenied(String),

    #[error("Identity provider unreachable: {0}")]
    Provider(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Token error: {0}")]
    Token(#[from] JwtError),
}

impl From<reqwest::Error> for OAuthError {
    fn from(e: reqwest::Error) -> Self {
        OAuthError::Provider(e.to_string())
    }
}

impl From<ClaimsError> for OAuthError {
    fn from(e: ClaimsError) -> Self {
        OAuthError::AccessDenied(e.to_string())
    }
}

/// Provisioning rules for identities without a local user
#[derive(Debug, Clone, Default)]
pub struct SignupPolicy {
    /// Create local users for unknown identities
    pub allow_signup: bool,
    /// Login of the user whose role new users copy
    pub template_user: Option<String>,
    /// Skip the signup-token fallback entirely
    pub no_user_creation: bool,
}

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub jwt_secret: String,
    pub ttl_seconds: i64,
}

/// Identity bridge service
#[derive(Clone)]
pub struct OAuthService {
    users: Arc<dyn UserStore>,
    identity_provider: Arc<dyn IdentityProvider>,
    provider: OAuthProviderConfig,
    policy: SignupPolicy,
    session: SessionSettings,
}

impl OAuthService {
    /// Create a new OAuthService
    pub fn new(
        users: Arc<dyn UserStore>,
        identity_provider: Arc<dyn IdentityProvider>,
        provider: OAuthProviderConfig,
        policy: SignupPolicy,
        session: SessionSettings,
    ) -> Self {
        Self {
            users,
            identity_provider,
            provider,
            policy,
            session,
        }
    }

    /// Authenticate the provider callback and issue a session
    pub async fn authenticate(
        &self,
        params: OAuthSigninParams,
    ) -> Result<SessionResponse, OAuthError> {
        tracing::info!(provider = %self.provider.id, "Starting OAuth authentication");

        let (access_token, claims) = match (&params.code, &params.access_token) {
            (Some(code), _) => self.validate_code(code).await?,
            (None, Some(token)) => (token.clone(), self.fetch_claims(token).await?),
            (None, None) => {
                return Err(OAuthError::AccessDenied(
                    "neither code nor access token supplied".to_string(),
                ))
            }
        };

        let user = self
            .signin(&claims, &access_token, params.state.as_deref())
            .await?;

        let token = generate_session_token(&user, &self.session.jwt_secret, self.session.ttl_seconds)?;
        tracing::info!(login = %user.login, "OAuth authentication successful");

        Ok(SessionResponse {
            login: user.login.clone(),
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: self.session.ttl_seconds,
            user: user.into(),
        })
    }

    /// Get a user by ID
    pub async fn get_user_by_id(&self, user_id: Uuid) -> Result<User, OAuthError> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| OAuthError::AccessDenied("user not found".to_string()))
    }

    /// Get a user by ID, refusing deactivated accounts
    pub async fn active_user(&self, user_id: Uuid) -> Result<User, OAuthError> {
        let user = self.get_user_by_id(user_id).await?;
        ensure_active(&user)?;
        Ok(user)
    }

    /// Get JWT secret (for middleware access)
    pub fn jwt_secret(&self) -> &str {
        &self.session.jwt_secret
    }

    // ===== Private Helper Methods =====

    /// Exchange the code and collect the claims of the identity behind it
    async fn validate_code(&self, code: &str) -> Result<(String, IdentityClaims), OAuthError> {
        let response = self
            .identity_provider
            .exchange_code(&self.provider, code)
            .await?;

        if let Some(error) = response.error {
            tracing::warn!(
                provider = %self.provider.id,
                error = %error,
                description = ?response.error_description,
                "Token endpoint refused the authorization code"
            );
            return Err(OAuthError::AccessDenied(error));
        }

        let access_token = response
            .access_token
            .ok_or_else(|| OAuthError::AccessDenied("no access token returned".to_string()))?;

        let claims = match response.id_token {
            Some(id_token) => decode_id_token(&id_token)?,
            None => self.fetch_claims(&access_token).await?,
        };

        Ok((access_token, claims))
    }

    async fn fetch_claims(&self, access_token: &str) -> Result<IdentityClaims, OAuthError> {
        let claims = self
            .identity_provider
            .fetch_profile(&self.provider, access_token)
            .await?;
        if let Some(error) = claims.error() {
            return Err(OAuthError::AccessDenied(error));
        }
        Ok(claims)
    }

    /// Resolve, link and verify the local user
    async fn signin(
        &self,
        claims: &IdentityClaims,
        access_token: &str,
        state: Option<&str>,
    ) -> Result<User, OAuthError> {
        let subject = claims.subject_id().ok_or_else(|| {
            tracing::warn!("Validation failed: no subject id in claims");
            OAuthError::AccessDenied("no subject id in claims".to_string())
        })?;
        let email = claims
            .email()
            .ok_or_else(|| OAuthError::AccessDenied("no email in claims".to_string()))?;

        let user = match self.users.find_user_by_login(&email).await? {
            Some(user) => user,
            None => self.provision_user(&email, claims).await?,
        };
        ensure_active(&user)?;

        // The link is written before it is verified; a failed verification
        // leaves it in place.
        self.users
            .link_oauth(user.id, &self.provider.id, &subject, access_token)
            .await?;

        match self.verify_link(&subject, access_token).await {
            Ok(user) => Ok(user),
            Err(e) => {
                tracing::error!(error = %e, oauth_uid = %subject, "Error during OAuth sign-in");
                let user = self
                    .fallback_signup(claims, &subject, access_token, state)
                    .await?;
                ensure_active(&user)?;
                Ok(user)
            }
        }
    }

    async fn provision_user(&self, email: &str, claims: &IdentityClaims) -> Result<User, OAuthError> {
        if !self.policy.allow_signup {
            tracing::warn!(login = %email, "Access Denied: signup disabled for unknown user");
            return Err(OAuthError::AccessDenied(
                "user is not registered".to_string(),
            ));
        }

        let role = self.template_role().await?;
        tracing::info!(login = %email, role = role.as_str(), "No user found, creating new user");

        Ok(self
            .users
            .create_user(NewUser {
                login: email.to_string(),
                name: claims.display_name().unwrap_or_else(|| email.to_string()),
                email: Some(email.to_string()),
                role,
                oauth_provider_id: None,
                oauth_uid: None,
                oauth_access_token: None,
            })
            .await?)
    }

    async fn template_role(&self) -> Result<UserRole, OAuthError> {
        let Some(login) = &self.policy.template_user else {
            return Ok(UserRole::Portal);
        };
        match self.users.find_user_by_login(login).await? {
            Some(template) => Ok(template.role),
            None => {
                tracing::warn!(template = %login, "Template user not found, using portal role");
                Ok(UserRole::Portal)
            }
        }
    }

    /// Exactly one user must now carry the (provider, subject) pair
    async fn verify_link(&self, subject: &str, access_token: &str) -> Result<User, OAuthError> {
        let mut linked = self
            .users
            .find_users_by_oauth(&self.provider.id, subject)
            .await?;
        linked.retain(|user| user.active);

        match linked.len() {
            1 => {
                let user = linked.remove(0);
                self.users.update_access_token(user.id, access_token).await?;
                Ok(user)
            }
            0 => Err(OAuthError::AccessDenied(format!(
                "no user linked to {}",
                subject
            ))),
            n => Err(OAuthError::AccessDenied(format!(
                "{} users linked to {}",
                n, subject
            ))),
        }
    }

    /// Redeem the signup token carried in the `state` parameter
    async fn fallback_signup(
        &self,
        claims: &IdentityClaims,
        subject: &str,
        access_token: &str,
        state: Option<&str>,
    ) -> Result<User, OAuthError> {
        if self.policy.no_user_creation {
            return Err(OAuthError::AccessDenied("user creation disabled".to_string()));
        }

        let token = state
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .and_then(|state| state.get("t").and_then(|t| t.as_str()).map(str::to_string))
            .ok_or_else(|| OAuthError::AccessDenied("no signup token in state".to_string()))?;

        let email = claims.email();
        let values = NewUser {
            login: email.clone().unwrap_or_else(|| subject.to_string()),
            name: claims
                .display_name()
                .unwrap_or_else(|| subject.to_string()),
            email,
            role: UserRole::Portal,
            oauth_provider_id: Some(self.provider.id.clone()),
            oauth_uid: Some(subject.to_string()),
            oauth_access_token: Some(access_token.to_string()),
        };

        self.users
            .signup_with_token(&token, values)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Signup error");
                OAuthError::AccessDenied("signup failed".to_string())
            })
    }
}

fn ensure_active(user: &User) -> Result<(), OAuthError> {
    if !user.active {
        tracing::warn!(login = %user.login, "Access Denied: user is deactivated");
        return Err(OAuthError::AccessDenied("user is deactivated".to_string()));
    }
    Ok(())
}
