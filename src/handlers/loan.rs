//! Loan request HTTP handlers
//!
//! Lifecycle actions answer with a [`LoanAction`]: either the updated loan
//! or an advisory explaining why nothing changed.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::{AuthenticatedUser, StaffUser};
use crate::error::ApiError;
use crate::loan::{
    ChangeLoanTypeRequest, CreateLoanRequest, ListLoansQuery, LoanAction, LoanResponse,
    LoanService, LoanTerms, RejectLoanRequest, RejectionPrompt, RepaymentLine,
};
use crate::models::ApiResponse;

type ActionResult = Result<Json<ApiResponse<LoanAction>>, ApiError>;

/// POST /api/loans - Open a loan request
pub async fn create_loan(
    State(service): State<Arc<LoanService>>,
    user: AuthenticatedUser,
    Json(request): Json<CreateLoanRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LoanResponse>>), ApiError> {
    request.validate()?;
    let loan = service.create_loan(request).await?;
    tracing::debug!(loan_id = %loan.id, by = %user.login, "Loan request opened");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(loan.into()))))
}

/// GET /api/loans
pub async fn list_loans(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListLoansQuery>,
) -> Result<Json<ApiResponse<Vec<LoanResponse>>>, ApiError> {
    let loans = service.list_loans(query).await?;
    Ok(Json(ApiResponse::ok(
        loans.into_iter().map(LoanResponse::from).collect(),
    )))
}

/// GET /api/loans/:id
pub async fn get_loan(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LoanResponse>>, ApiError> {
    let loan = service.get_loan(id).await?;
    Ok(Json(ApiResponse::ok(loan.into())))
}

/// PUT /api/loans/:id/terms - Edit a draft request
pub async fn update_terms(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(terms): Json<LoanTerms>,
) -> Result<Json<ApiResponse<LoanResponse>>, ApiError> {
    terms.validate()?;
    let loan = service.update_terms(id, terms).await?;
    Ok(Json(ApiResponse::ok(loan.into())))
}

/// PUT /api/loans/:id/loan-type
pub async fn change_loan_type(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangeLoanTypeRequest>,
) -> Result<Json<ApiResponse<LoanResponse>>, ApiError> {
    let loan = service.change_loan_type(id, request.loan_type_id).await?;
    Ok(Json(ApiResponse::ok(loan.into())))
}

/// POST /api/loans/:id/compute-repayment - (Re)generate the schedule
pub async fn compute_repayment(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<RepaymentLine>>>, ApiError> {
    let lines = service.compute_repayment(id).await?;
    Ok(Json(ApiResponse::ok(lines)))
}

/// GET /api/loans/:id/repayments
pub async fn list_repayments(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<RepaymentLine>>>, ApiError> {
    let lines = service.repayment_lines(id).await?;
    Ok(Json(ApiResponse::ok(lines)))
}

/// POST /api/loans/:id/repayments/:line_id/pay
pub async fn pay_repayment(
    State(service): State<Arc<LoanService>>,
    StaffUser(_user): StaffUser,
    Path((id, line_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<RepaymentLine>>, ApiError> {
    let line = service.mark_line_paid(id, line_id).await?;
    Ok(Json(ApiResponse::ok(line)))
}

/// POST /api/loans/:id/confirm
pub async fn confirm_loan(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ActionResult {
    Ok(Json(ApiResponse::ok(service.confirm(id).await?)))
}

/// POST /api/loans/:id/request-approval
pub async fn request_approval(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ActionResult {
    Ok(Json(ApiResponse::ok(service.request_approval(id).await?)))
}

/// POST /api/loans/:id/approve
pub async fn approve_loan(
    State(service): State<Arc<LoanService>>,
    StaffUser(user): StaffUser,
    Path(id): Path<Uuid>,
) -> ActionResult {
    let action = service.approve(id).await?;
    tracing::info!(loan_id = %id, by = %user.login, "Loan approved");
    Ok(Json(ApiResponse::ok(action)))
}

/// POST /api/loans/:id/disburse
pub async fn disburse_loan(
    State(service): State<Arc<LoanService>>,
    StaffUser(user): StaffUser,
    Path(id): Path<Uuid>,
) -> ActionResult {
    let action = service.disburse(id).await?;
    tracing::info!(loan_id = %id, by = %user.login, "Loan disbursed");
    Ok(Json(ApiResponse::ok(action)))
}

/// POST /api/loans/:id/close
pub async fn close_loan(
    State(service): State<Arc<LoanService>>,
    StaffUser(_user): StaffUser,
    Path(id): Path<Uuid>,
) -> ActionResult {
    Ok(Json(ApiResponse::ok(service.close(id).await?)))
}

/// POST /api/loans/:id/reject - Ask for a rejection reason
pub async fn begin_rejection(
    State(service): State<Arc<LoanService>>,
    StaffUser(_user): StaffUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RejectionPrompt>>, ApiError> {
    let prompt = service.begin_rejection(id).await?;
    Ok(Json(ApiResponse::ok(prompt)))
}

/// POST /api/loans/:id/reject/reason - Reject with the given reason
pub async fn reject_loan(
    State(service): State<Arc<LoanService>>,
    StaffUser(user): StaffUser,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectLoanRequest>,
) -> ActionResult {
    request.validate()?;
    let action = service.reject_with_reason(id, &request.reason).await?;
    tracing::info!(loan_id = %id, by = %user.login, "Loan rejected");
    Ok(Json(ApiResponse::ok(action)))
}
