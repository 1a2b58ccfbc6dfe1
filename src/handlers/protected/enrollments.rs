use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::database::models::{Enrollment, Payment};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::enrollment_service::PaymentInput;
use crate::state::AppState;
use crate::types::Principal;
use crate::workflow::enrollment::EnrollmentSubmission;

#[derive(Debug, Deserialize)]
pub struct AssessRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub enrollment: Enrollment,
}

/// POST /api/enrollments - student submits an enrollment with uploaded documents
pub async fn submit(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<EnrollmentSubmission>, JsonRejection>,
) -> ApiResult<Enrollment> {
    let Json(submission) = payload?;
    let enrollment = state.enrollments().submit(&principal, &submission).await?;
    Ok(ApiResponse::created(enrollment))
}

/// GET /api/enrollments/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Enrollment> {
    let Path(id) = id?;
    Ok(ApiResponse::success(state.enrollments().get(&principal, id).await?))
}

/// POST /api/enrollments/:id/verify
pub async fn verify(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Enrollment> {
    let Path(id) = id?;
    Ok(ApiResponse::success(state.enrollments().verify(&principal, id).await?))
}

/// POST /api/enrollments/:id/assess - body `{ "amount": "15000.00" }`
pub async fn assess(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<AssessRequest>, JsonRejection>,
) -> ApiResult<Enrollment> {
    let Path(id) = id?;
    let Json(body) = payload?;
    let enrollment = state.enrollments().assess_fees(&principal, id, body.amount).await?;
    Ok(ApiResponse::success(enrollment))
}

/// POST /api/enrollments/:id/reject - body `{ "reason": "..." }`
pub async fn reject(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<RejectRequest>, JsonRejection>,
) -> ApiResult<Enrollment> {
    let Path(id) = id?;
    let Json(body) = payload?;
    let enrollment = state.enrollments().reject(&principal, id, &body.reason).await?;
    Ok(ApiResponse::success(enrollment))
}

/// POST /api/enrollments/:id/clear
pub async fn clear(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Enrollment> {
    let Path(id) = id?;
    Ok(ApiResponse::success(state.enrollments().clear(&principal, id).await?))
}

/// POST /api/enrollments/:id/payments
pub async fn record_payment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<PaymentInput>, JsonRejection>,
) -> ApiResult<PaymentReceipt> {
    let Path(id) = id?;
    let Json(input) = payload?;
    let (payment, enrollment) = state.enrollments().record_payment(&principal, id, &input).await?;
    Ok(ApiResponse::created(PaymentReceipt { payment, enrollment }))
}

/// GET /api/enrollments/:id/payments
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Vec<Payment>> {
    let Path(id) = id?;
    Ok(ApiResponse::success(state.enrollments().payments(&principal, id).await?))
}
