use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use crate::workflow::tor::TorStatus;

pub const TOR_REQUEST_COLUMNS: &str =
    "id, enrollment_id, student_id, program_id, year_id, semester, status, remarks, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TorRequest {
    pub id: i64,
    pub enrollment_id: i64,
    pub student_id: i64,
    pub program_id: i64,
    pub year_id: i64,
    pub semester: String,
    #[sqlx(try_from = "String")]
    pub status: TorStatus,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CourseEquivalency {
    pub id: i64,
    pub tor_request_id: i64,
    pub external_course_code: String,
    pub external_course_name: String,
    pub external_grade: String,
    pub external_units: Decimal,
    pub equivalent_course_id: i64,
    pub source_school: String,
    pub source_academic_year: String,
}
