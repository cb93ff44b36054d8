//! Configuration management for LoanDesk
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use std::env;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// JWT secret for session signing
    pub jwt_secret: String,

    /// Session token TTL in seconds (default: 3600)
    pub jwt_session_ttl_seconds: i64,

    /// Sender address of borrower notifications
    pub mail_sender: String,

    /// Ledger account receiving the interest part of installments
    pub loan_interest_account: String,

    /// Ledger account receiving the principal part of installments
    pub loan_repayment_account: String,

    /// Identity provider settings
    pub oauth: OAuthConfig,
}

/// Identity provider configuration
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub provider_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: String,
    pub profile_endpoint: String,
    pub redirect_uri: String,
    /// Create local users for unknown identities
    pub allow_signup: bool,
    /// Login of the user whose role is copied onto new users
    pub template_user: Option<String>,
    /// Disable the signup-token fallback
    pub no_user_creation: bool,
}

fn env_flag(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(format!(
                "{} must be a boolean, got '{}'",
                key, value
            ))),
        },
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::from_str(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .unwrap_or(5);

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS").ok();

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| "development-secret-change-in-production".to_string());
        if environment.is_production() && jwt_secret.starts_with("development-") {
            return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()));
        }

        let jwt_session_ttl_seconds = env::var("JWT_SESSION_TTL_SECONDS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse::<i64>()
            .unwrap_or(3600);

        let mail_sender =
            env::var("MAIL_SENDER").unwrap_or_else(|_| "loans@localhost".to_string());

        let loan_interest_account =
            env::var("LOAN_INTEREST_ACCOUNT").unwrap_or_else(|_| "loan_interest".to_string());
        let loan_repayment_account =
            env::var("LOAN_REPAYMENT_ACCOUNT").unwrap_or_else(|_| "loan_repayment".to_string());

        let oauth = OAuthConfig {
            provider_id: env::var("OAUTH_PROVIDER_ID").unwrap_or_else(|_| "azure".to_string()),
            client_id: env::var("OAUTH_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("OAUTH_CLIENT_SECRET").unwrap_or_default(),
            token_endpoint: env::var("OAUTH_TOKEN_ENDPOINT").unwrap_or_else(|_| {
                "https://login.microsoftonline.com/common/oauth2/v2.0/token".to_string()
            }),
            profile_endpoint: env::var("OAUTH_PROFILE_ENDPOINT")
                .unwrap_or_else(|_| "https://graph.microsoft.com/v1.0/me".to_string()),
            redirect_uri: env::var("OAUTH_REDIRECT_URI").unwrap_or_else(|_| {
                format!("http://localhost:{}/auth/oauth/signin", port)
            }),
            allow_signup: env_flag("OAUTH_ALLOW_SIGNUP", false)?,
            template_user: env::var("OAUTH_TEMPLATE_USER")
                .ok()
                .filter(|login| !login.is_empty()),
            no_user_creation: env_flag("OAUTH_NO_USER_CREATION", false)?,
        };

        Ok(Config {
            database_url,
            environment,
            port,
            db_max_connections,
            cors_allowed_origins,
            log_level,
            jwt_secret,
            jwt_session_ttl_seconds,
            mail_sender,
            loan_interest_account,
            loan_repayment_account,
            oauth,
        })
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> String {
        // Mask password in database URL for logging
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let prefix = &self.database_url[..colon_pos + 1];
                let suffix = &self.database_url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.database_url.clone()
    }
}
