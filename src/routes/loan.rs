//! Loan route definitions

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::{loan, loan_type};
use crate::state::AppState;

pub fn loan_type_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/loan-types",
            post(loan_type::create_loan_type).get(loan_type::list_loan_types),
        )
        .route("/api/loan-types/:id", get(loan_type::get_loan_type))
}

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans", post(loan::create_loan).get(loan::list_loans))
        .route("/api/loans/:id", get(loan::get_loan))
        .route("/api/loans/:id/terms", put(loan::update_terms))
        .route("/api/loans/:id/loan-type", put(loan::change_loan_type))
        .route(
            "/api/loans/:id/compute-repayment",
            post(loan::compute_repayment),
        )
        .route("/api/loans/:id/confirm", post(loan::confirm_loan))
        .route(
            "/api/loans/:id/request-approval",
            post(loan::request_approval),
        )
        .route("/api/loans/:id/approve", post(loan::approve_loan))
        .route("/api/loans/:id/disburse", post(loan::disburse_loan))
        .route("/api/loans/:id/close", post(loan::close_loan))
        .route("/api/loans/:id/reject", post(loan::begin_rejection))
        .route("/api/loans/:id/reject/reason", post(loan::reject_loan))
        .route("/api/loans/:id/repayments", get(loan::list_repayments))
        .route(
            "/api/loans/:id/repayments/:line_id/pay",
            post(loan::pay_repayment),
        )
}
