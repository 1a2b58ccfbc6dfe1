use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use crate::workflow::grade::{GradeStatus, Remark};

/// A class awaiting action at some approval stage
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApprovalQueueEntry {
    pub program_course_id: i64,
    pub class_assignment_id: i64,
    pub section: String,
    pub course_code: String,
    pub course_name: String,
    pub semester: String,
    pub total_grades: i64,
}

/// Grade count and derived status of one class after an action
#[derive(Debug, Clone, Serialize)]
pub struct ClassGradeSummary {
    pub program_course_id: i64,
    pub class_assignment_id: i64,
    pub total_grades: i64,
    pub approval_status: GradeStatus,
    /// False when the call found the class already in the requested state
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FinalGrade {
    pub program_course_id: i64,
    pub course_code: String,
    pub course_name: String,
    pub units: Decimal,
    pub semester: String,
    pub final_grade: Decimal,
    #[sqlx(skip)]
    pub remark: Option<Remark>,
}
