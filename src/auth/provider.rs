//! Identity provider client
//!
//! Talks to the provider's token endpoint (authorization-code exchange) and
//! profile endpoint (claims for a bearer token).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::claims::IdentityClaims;
use super::service::OAuthError;

/// Static settings of the identity provider
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    /// Identifier stored on linked users
    pub id: String,
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: String,
    pub profile_endpoint: String,
    pub redirect_uri: String,
}

/// Token endpoint response
#[derive(Debug, Deserialize, Default, Clone)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Provider calls used by the sign-in flow
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange an authorization code at the token endpoint
    async fn exchange_code(
        &self,
        provider: &OAuthProviderConfig,
        code: &str,
    ) -> Result<TokenResponse, OAuthError>;

    /// Fetch the claims of the holder of `access_token`
    async fn fetch_profile(
        &self,
        provider: &OAuthProviderConfig,
        access_token: &str,
    ) -> Result<IdentityClaims, OAuthError>;
}

/// HTTP implementation backed by reqwest
#[derive(Clone, Default)]
pub struct HttpIdentityProvider {
    http_client: reqwest::Client,
}

impl HttpIdentityProvider {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange_code(
        &self,
        provider: &OAuthProviderConfig,
        code: &str,
    ) -> Result<TokenResponse, OAuthError> {
        tracing::debug!(endpoint = %provider.token_endpoint, "Exchanging authorization code");

        let params = [
            ("client_id", provider.client_id.as_str()),
            ("client_secret", provider.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", provider.redirect_uri.as_str()),
        ];

        // Error responses carry a JSON body with `error`, so the status is not checked here
        let response = self
            .http_client
            .post(&provider.token_endpoint)
            .form(&params)
            .send()
            .await?;

        Ok(response.json::<TokenResponse>().await?)
    }

    async fn fetch_profile(
        &self,
        provider: &OAuthProviderConfig,
        access_token: &str,
    ) -> Result<IdentityClaims, OAuthError> {
        tracing::debug!(endpoint = %provider.profile_endpoint, "Fetching identity claims");

        let claims = self
            .http_client
            .get(&provider.profile_endpoint)
            .bearer_auth(access_token)
            .send()
            .await?
            .json::<Map<String, Value>>()
            .await?;

        Ok(IdentityClaims::new(claims))
    }
}
