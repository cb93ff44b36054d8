//! API handlers for the LoanDesk backend

pub mod auth;
pub mod health;
pub mod loan;
pub mod loan_type;

// Re-export the extractors from middleware for handler use
pub use crate::middleware::auth::{AuthenticatedUser, StaffUser};
