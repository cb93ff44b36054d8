//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::OAuthService;
use crate::loan::LoanService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub loan_service: Arc<LoanService>,
    pub oauth_service: Arc<OAuthService>,
}

impl AppState {
    pub fn new(loan_service: Arc<LoanService>, oauth_service: Arc<OAuthService>) -> Self {
        Self {
            loan_service,
            oauth_service,
        }
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<OAuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.oauth_service.clone()
    }
}
