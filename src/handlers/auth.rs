//! Authentication HTTP handlers
//!
//! Identity provider callback and current-user lookup.

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use super::AuthenticatedUser;
use crate::auth::OAuthService;
use crate::error::ApiError;
use crate::models::{ApiResponse, OAuthSigninParams, SessionResponse, UserResponse};

/// GET /auth/oauth/signin - Provider callback, issues a session token
pub async fn oauth_signin(
    State(service): State<Arc<OAuthService>>,
    Query(params): Query<OAuthSigninParams>,
) -> Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    let session = service.authenticate(params).await.map_err(|e| {
        tracing::warn!(error = %e, "OAuth sign-in refused");
        ApiError::from(e)
    })?;

    Ok(Json(ApiResponse::ok(session)))
}

/// GET /auth/me - Get current authenticated user
pub async fn get_current_user(
    State(service): State<Arc<OAuthService>>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user = service.get_user_by_id(user.user_id).await?;
    Ok(Json(ApiResponse::ok(user.into())))
}
