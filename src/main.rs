//! LoanDesk Backend Server
//!
//! HTTP API for loan requests and their repayment schedules, with sign-in
//! delegated to an OAuth identity provider.

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use loandesk_server::auth::{
    HttpIdentityProvider, OAuthProviderConfig, OAuthService, SessionSettings, SignupPolicy,
};
use loandesk_server::config::Config;
use loandesk_server::loan::{LoanService, LoanSettings};
use loandesk_server::state::AppState;
use loandesk_server::store::PgStore;
use loandesk_server::{db, middleware, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting LoanDesk");

    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(PgStore::new(pool));

    let loan_service = Arc::new(LoanService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        LoanSettings {
            mail_sender: config.mail_sender.clone(),
            interest_account_id: config.loan_interest_account.clone(),
            repayment_account_id: config.loan_repayment_account.clone(),
        },
    ));

    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;

    let oauth_service = Arc::new(OAuthService::new(
        store,
        Arc::new(HttpIdentityProvider::new(http_client)),
        OAuthProviderConfig {
            id: config.oauth.provider_id.clone(),
            client_id: config.oauth.client_id.clone(),
            client_secret: config.oauth.client_secret.clone(),
            token_endpoint: config.oauth.token_endpoint.clone(),
            profile_endpoint: config.oauth.profile_endpoint.clone(),
            redirect_uri: config.oauth.redirect_uri.clone(),
        },
        SignupPolicy {
            allow_signup: config.oauth.allow_signup,
            template_user: config.oauth.template_user.clone(),
            no_user_creation: config.oauth.no_user_creation,
        },
        SessionSettings {
            jwt_secret: config.jwt_secret.clone(),
            ttl_seconds: config.jwt_session_ttl_seconds,
        },
    ));

    let mut app = routes::build_router(AppState::new(loan_service, oauth_service))
        .layer(configure_cors(&config));
    if config.environment.is_production() {
        app = app.layer(axum::middleware::from_fn(middleware::hsts_header));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn configure_cors(config: &Config) -> CorsLayer {
    let Some(allowed) = config
        .cors_allowed_origins
        .as_deref()
        .filter(|s| !s.is_empty())
    else {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = allowed
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
