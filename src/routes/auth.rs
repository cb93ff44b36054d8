//! Authentication routes

use axum::{routing::get, Router};

use crate::handlers::auth;
use crate::state::AppState;

/// Create authentication routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/oauth/signin", get(auth::oauth_signin))
        .route("/auth/me", get(auth::get_current_user))
}
