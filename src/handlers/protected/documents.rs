use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, rejection::QueryRejection, Path, Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::database::models::DocumentRequest;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::document_service::{DocumentRequestReceipt, PriceQuote};
use crate::state::AppState;
use crate::types::Principal;
use crate::workflow::document_request::{DocumentRequestInput, DocumentRequestStatus};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub student_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: DocumentRequestStatus,
}

/// Request dates are checked against the server's local calendar day
fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// POST /api/document-requests/quote - validate and price without storing
pub async fn quote(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<DocumentRequestInput>, JsonRejection>,
) -> ApiResult<PriceQuote> {
    let Json(input) = payload?;
    Ok(ApiResponse::success(state.document_requests().quote(&principal, &input, today())?))
}

/// POST /api/document-requests
pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<DocumentRequestInput>, JsonRejection>,
) -> ApiResult<DocumentRequestReceipt> {
    let Json(input) = payload?;
    let receipt = state.document_requests().create(&principal, &input, today()).await?;
    Ok(ApiResponse::created(receipt))
}

/// GET /api/document-requests[?student_id=] - students see their own requests
pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Vec<DocumentRequest>> {
    let Query(query) = query?;
    let student_id = query.student_id.unwrap_or(principal.id);
    let requests = state.document_requests().list_for_student(&principal, student_id).await?;
    Ok(ApiResponse::success(requests))
}

/// POST /api/document-requests/:id/status - body `{ "status": "Processing" }`
pub async fn update_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<DocumentRequest> {
    let Path(id) = id?;
    let Json(body) = payload?;
    let request = state
        .document_requests()
        .update_status(&principal, id, body.status)
        .await?;
    Ok(ApiResponse::success(request))
}
