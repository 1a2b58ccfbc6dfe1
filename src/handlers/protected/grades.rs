use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::database::models::{ApprovalQueueEntry, ClassGradeSummary, FinalGrade};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::types::Principal;
use crate::workflow::grade::GradeEntry;

#[derive(Debug, Deserialize)]
pub struct GradeSubmission {
    #[serde(default)]
    pub grades: Vec<GradeEntry>,
}

type ClassPath = Result<Path<(i64, i64)>, PathRejection>;

/// PUT /api/classes/:program_course_id/:class_assignment_id/grades
pub async fn submit(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    class: ClassPath,
    payload: Result<Json<GradeSubmission>, JsonRejection>,
) -> ApiResult<ClassGradeSummary> {
    let Path((program_course_id, class_assignment_id)) = class?;
    let Json(body) = payload?;
    let summary = state
        .grades()
        .submit_grades(&principal, program_course_id, class_assignment_id, &body.grades)
        .await?;
    Ok(ApiResponse::success(summary))
}

/// POST /api/classes/:program_course_id/:class_assignment_id/approve
pub async fn approve(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    class: ClassPath,
) -> ApiResult<ClassGradeSummary> {
    let Path((program_course_id, class_assignment_id)) = class?;
    let summary = state
        .grades()
        .approve(&principal, program_course_id, class_assignment_id)
        .await?;
    Ok(ApiResponse::success(summary))
}

/// POST /api/classes/:program_course_id/:class_assignment_id/reject
pub async fn reject(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    class: ClassPath,
) -> ApiResult<ClassGradeSummary> {
    let Path((program_course_id, class_assignment_id)) = class?;
    let summary = state
        .grades()
        .reject(&principal, program_course_id, class_assignment_id)
        .await?;
    Ok(ApiResponse::success(summary))
}

/// GET /api/approvals - classes waiting on the caller's approval stage
pub async fn queue(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Vec<ApprovalQueueEntry>> {
    Ok(ApiResponse::success(state.grades().approval_queue(&principal).await?))
}

/// GET /api/students/:id/grades/final
pub async fn final_grades(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    student: Result<Path<i64>, PathRejection>,
) -> ApiResult<Vec<FinalGrade>> {
    let Path(student_id) = student?;
    Ok(ApiResponse::success(state.grades().final_grades(&principal, student_id).await?))
}
