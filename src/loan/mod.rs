//! Loan domain module
//!
//! Loan types, loan requests with their lifecycle, and flat repayment
//! schedules.

mod model;
pub mod schedule;
mod service;
mod state;
mod store;

pub use model::*;
pub use schedule::{Cadence, Installment, ScheduleError, ScheduleTerms};
pub use service::{LoanError, LoanService, LoanSettings};
pub use state::LoanState;
pub use store::LoanStore;
