use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use crate::workflow::enrollment::{EnrollmentStatus, StudentType};

pub const ENROLLMENT_COLUMNS: &str = "id, student_id, program_id, year_id, semester, academic_year, \
     student_type, status, remaining_balance, previous_school, previous_program, \
     previous_academic_year, status_reason, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub program_id: i64,
    pub year_id: i64,
    pub semester: String,
    pub academic_year: String,
    #[sqlx(try_from = "String")]
    pub student_type: StudentType,
    #[sqlx(try_from = "String")]
    pub status: EnrollmentStatus,
    pub remaining_balance: Decimal,
    pub previous_school: Option<String>,
    pub previous_program: Option<String>,
    pub previous_academic_year: Option<String>,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub enrollment_id: i64,
    pub amount: Decimal,
    pub reference: Option<String>,
    pub recorded_by: i64,
    pub created_at: DateTime<Utc>,
}
