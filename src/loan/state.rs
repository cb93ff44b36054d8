//! Loan request lifecycle states and the allowed transitions between them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Loan request state
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "loan_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanState {
    Draft,
    Confirmed,
    Waiting,
    Approved,
    Disbursed,
    Rejected,
    Closed,
}

impl LoanState {
    pub const ALL: [LoanState; 7] = [
        LoanState::Draft,
        LoanState::Confirmed,
        LoanState::Waiting,
        LoanState::Approved,
        LoanState::Disbursed,
        LoanState::Rejected,
        LoanState::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanState::Draft => "draft",
            LoanState::Confirmed => "confirmed",
            LoanState::Waiting => "waiting",
            LoanState::Approved => "approved",
            LoanState::Disbursed => "disbursed",
            LoanState::Rejected => "rejected",
            LoanState::Closed => "closed",
        }
    }

    /// Whether a request in this state prevents the partner from opening another one
    pub fn blocks_new_request(&self) -> bool {
        !matches!(
            self,
            LoanState::Draft | LoanState::Rejected | LoanState::Closed
        )
    }

    /// Whether the repayment schedule may still be regenerated
    pub fn allows_schedule_changes(&self) -> bool {
        matches!(
            self,
            LoanState::Draft | LoanState::Confirmed | LoanState::Waiting
        )
    }

    pub fn can_transition_to(&self, next: LoanState) -> bool {
        use LoanState::*;

        matches!(
            (self, next),
            (Draft, Confirmed)
                | (Draft | Confirmed, Waiting)
                | (Waiting, Approved)
                | (Approved, Disbursed)
                | (Disbursed, Closed)
                | (Draft | Confirmed | Waiting | Approved, Rejected)
        )
    }
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
