//! LoanDesk Backend Library
//!
//! Loan request lifecycle with flat repayment schedules, and sign-in
//! through an external OAuth identity provider.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod loan;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod routes;
pub mod state;
pub mod store;
