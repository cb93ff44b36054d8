//! Middleware for the LoanDesk API
//!
//! Request tracing, security headers and session authentication.

pub mod auth;
mod security;
mod tracing;

pub use auth::{AuthenticatedUser, StaffUser};
pub use security::{hsts_header, security_headers};
pub use tracing::request_tracing;
