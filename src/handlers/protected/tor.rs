use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::database::models::TorRequest;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::tor_service::{EquivalencySubmission, TorEvaluation, TorRequestDetail};
use crate::state::AppState;
use crate::types::Principal;
use crate::workflow::tor::{EquivalencyInput, TorDecision};

#[derive(Debug, Deserialize)]
pub struct EquivalencyBatch {
    #[serde(default)]
    pub equivalencies: Vec<EquivalencyInput>,
}

#[derive(Debug, Deserialize)]
pub struct RequiredCourse {
    pub program_course_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: TorDecision,
    pub remarks: Option<String>,
}

type TorPath = Result<Path<i64>, PathRejection>;

/// GET /api/tor/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: TorPath,
) -> ApiResult<TorRequestDetail> {
    let Path(id) = id?;
    Ok(ApiResponse::success(state.transcripts().get(&principal, id).await?))
}

/// GET /api/tor/:id/evaluation
pub async fn evaluation(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: TorPath,
) -> ApiResult<TorEvaluation> {
    let Path(id) = id?;
    Ok(ApiResponse::success(state.transcripts().evaluation(&principal, id).await?))
}

/// POST /api/tor/:id/equivalencies
pub async fn submit_equivalencies(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: TorPath,
    payload: Result<Json<EquivalencyBatch>, JsonRejection>,
) -> ApiResult<EquivalencySubmission> {
    let Path(id) = id?;
    let Json(batch) = payload?;
    let result = state
        .transcripts()
        .submit_equivalencies(&principal, id, &batch.equivalencies)
        .await?;
    Ok(ApiResponse::success(result))
}

/// POST /api/tor/:id/required-courses
pub async fn assign_required_course(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: TorPath,
    payload: Result<Json<RequiredCourse>, JsonRejection>,
) -> ApiResult<TorEvaluation> {
    let Path(id) = id?;
    let Json(body) = payload?;
    let evaluation = state
        .transcripts()
        .assign_required_course(&principal, id, body.program_course_id)
        .await?;
    Ok(ApiResponse::success(evaluation))
}

/// POST /api/tor/:id/decision - body `{ "decision": "approve" | "reject", "remarks": "..." }`
pub async fn decide(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: TorPath,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> ApiResult<TorRequest> {
    let Path(id) = id?;
    let Json(body) = payload?;
    let request = state
        .transcripts()
        .decide(&principal, id, body.decision, body.remarks.as_deref())
        .await?;
    Ok(ApiResponse::success(request))
}
