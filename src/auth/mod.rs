//! Authentication module for LoanDesk
//!
//! Delegates sign-in to an external OAuth identity provider.
//! - Authorization-code exchange and claims retrieval
//! - Local user lookup, provisioning and linking
//! - Session token issuance and verification

mod claims;
mod jwt;
mod provider;
mod service;
mod store;

pub use claims::{decode_id_token, ClaimsError, IdentityClaims};
pub use jwt::{generate_session_token, get_user_id_from_claims, verify_token, Claims, JwtError};
pub use provider::{HttpIdentityProvider, IdentityProvider, OAuthProviderConfig, TokenResponse};
pub use service::{OAuthError, OAuthService, SessionSettings, SignupPolicy};
pub use store::UserStore;
