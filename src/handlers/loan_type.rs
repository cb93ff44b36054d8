//! Loan type HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::{AuthenticatedUser, StaffUser};
use crate::error::ApiError;
use crate::loan::{CreateLoanTypeRequest, LoanService, LoanTypeResponse};
use crate::models::ApiResponse;

/// POST /api/loan-types - Define a loan type
pub async fn create_loan_type(
    State(service): State<Arc<LoanService>>,
    StaffUser(user): StaffUser,
    Json(request): Json<CreateLoanTypeRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LoanTypeResponse>>), ApiError> {
    request.validate()?;
    let loan_type = service.create_loan_type(request).await?;
    tracing::info!(loan_type_id = %loan_type.id, by = %user.login, "Loan type created");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(loan_type.into()))))
}

/// GET /api/loan-types
pub async fn list_loan_types(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
) -> Result<Json<ApiResponse<Vec<LoanTypeResponse>>>, ApiError> {
    let types = service.list_loan_types().await?;
    Ok(Json(ApiResponse::ok(
        types.into_iter().map(LoanTypeResponse::from).collect(),
    )))
}

/// GET /api/loan-types/:id
pub async fn get_loan_type(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LoanTypeResponse>>, ApiError> {
    let loan_type = service.get_loan_type(id).await?;
    Ok(Json(ApiResponse::ok(loan_type.into())))
}
