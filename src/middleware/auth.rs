//! Authentication middleware
//!
//! Extractors verifying the session token issued after OAuth sign-in.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{get_user_id_from_claims, verify_token, JwtError, OAuthError, OAuthService};
use crate::models::UserRole;

/// Authenticated user extracted from the session token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub login: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    /// Back-office users may act on other people's loans
    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Internal | UserRole::Admin)
    }
}

#[derive(Debug, Serialize)]
struct AuthError {
    error: AuthErrorDetails,
}

#[derive(Debug, Serialize)]
struct AuthErrorDetails {
    code: &'static str,
    message: &'static str,
}

fn reject(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    (
        status,
        Json(AuthError {
            error: AuthErrorDetails { code, message },
        }),
    )
        .into_response()
}

/// Extractor for authenticated users
///
/// ```rust,ignore
/// async fn protected_handler(user: AuthenticatedUser) -> impl IntoResponse {
///     format!("Hello, {}", user.login)
/// }
/// ```
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<OAuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    reject(
                        StatusCode::UNAUTHORIZED,
                        "MISSING_TOKEN",
                        "Authorization header with Bearer token required",
                    )
                })?;

        let oauth_service = Arc::<OAuthService>::from_ref(state);

        let claims = verify_token(bearer.token(), oauth_service.jwt_secret()).map_err(|e| {
            tracing::debug!(error = %e, "Session token refused");
            match e {
                JwtError::TokenExpired => {
                    reject(StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", "Token has expired")
                }
                _ => reject(StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "Invalid token"),
            }
        })?;

        let user_id = get_user_id_from_claims(&claims).map_err(|_| {
            reject(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid user ID in token",
            )
        })?;

        UserRole::parse(&claims.role).ok_or_else(|| {
            reject(StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "Invalid role in token")
        })?;

        // Deactivation takes effect on tokens already handed out
        let user = oauth_service.active_user(user_id).await.map_err(|e| match e {
            OAuthError::AccessDenied(_) => reject(
                StatusCode::UNAUTHORIZED,
                "ACCOUNT_DISABLED",
                "User account is not active",
            ),
            other => {
                tracing::error!(error = %other, "Session user lookup failed");
                reject(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Could not verify session",
                )
            }
        })?;

        Ok(AuthenticatedUser {
            user_id,
            login: user.login,
            role: user.role,
        })
    }
}

/// Authenticated back-office user (internal or admin role)
pub struct StaffUser(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for StaffUser
where
    Arc<OAuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        if !user.is_staff() {
            return Err(reject(
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Loan officer access required",
            ));
        }

        Ok(StaffUser(user))
    }
}
