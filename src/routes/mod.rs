//! Route definitions for the LoanDesk API

mod auth;
mod loan;

pub use auth::auth_routes;
pub use loan::{loan_routes, loan_type_routes};

use axum::{middleware::from_fn, routing::get, Router};
use tower::ServiceBuilder;

use crate::handlers::health;
use crate::middleware;
use crate::state::AppState;

/// Assemble every route with the tracing and security layers applied
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .merge(auth_routes())
        .merge(loan_type_routes())
        .merge(loan_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(middleware::request_tracing))
                .layer(from_fn(middleware::security_headers)),
        )
}
