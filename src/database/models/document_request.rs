use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use crate::workflow::document_request::DocumentRequestStatus;

pub const DOCUMENT_REQUEST_COLUMNS: &str = "id, enrollment_id, student_id, doc_type, academic_credentials, \
     certification, description, request_date, year_graduated, grade_strand_course, level_attended, \
     document_price, status, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DocumentRequest {
    pub id: i64,
    pub enrollment_id: i64,
    pub student_id: i64,
    pub doc_type: String,
    pub academic_credentials: Vec<String>,
    pub certification: Vec<String>,
    pub description: String,
    pub request_date: NaiveDate,
    pub year_graduated: i32,
    pub grade_strand_course: String,
    pub level_attended: Vec<String>,
    pub document_price: Decimal,
    #[sqlx(try_from = "String")]
    pub status: DocumentRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
