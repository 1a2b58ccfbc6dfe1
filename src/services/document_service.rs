use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

use crate::auth::policy::Capability;
use crate::database::models::document_request::DOCUMENT_REQUEST_COLUMNS;
use crate::database::models::enrollment::ENROLLMENT_COLUMNS;
use crate::database::models::{DocumentRequest, Enrollment};
use crate::database::with_retry;
use crate::types::Principal;
use crate::workflow::document_request::{
    DocType, DocumentRequestInput, DocumentRequestStatus, PricedItem, ValidatedDocumentRequest,
};
use crate::workflow::enrollment::EnrollmentStatus;
use crate::workflow::{Step, WorkflowError};

#[derive(Debug, Clone, Serialize)]
pub struct PriceQuote {
    pub doc_type: DocType,
    pub items: Vec<PricedItem>,
    pub document_price: Decimal,
}

/// A created request with the enrollment balance it was billed to
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRequestReceipt {
    pub request: DocumentRequest,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
}

pub struct DocumentRequestService {
    pool: PgPool,
    retries: u32,
}

impl DocumentRequestService {
    pub fn new(pool: PgPool, retries: u32) -> Self {
        Self { pool, retries }
    }

    /// Price a request without storing anything
    pub fn quote(
        &self,
        principal: &Principal,
        input: &DocumentRequestInput,
        today: NaiveDate,
    ) -> Result<PriceQuote, WorkflowError> {
        principal.require(Capability::RequestDocuments)?;
        let validated = input.validate(today)?;
        Ok(PriceQuote {
            doc_type: validated.doc_type,
            items: validated.items,
            document_price: validated.document_price,
        })
    }

    /// Store a request and add its price to the student's active enrollment
    /// balance in the same transaction.
    pub async fn create(
        &self,
        principal: &Principal,
        input: &DocumentRequestInput,
        today: NaiveDate,
    ) -> Result<DocumentRequestReceipt, WorkflowError> {
        principal.require(Capability::RequestDocuments)?;
        let validated = input.validate(today)?;

        let student_id = principal.id;
        let validated = &validated;
        let receipt = with_retry(self.retries, move || self.create_once(student_id, validated)).await?;
        info!(
            "document request {} ({}) by student {}: {} -> balance {}",
            receipt.request.id,
            receipt.request.doc_type,
            student_id,
            receipt.request.document_price,
            receipt.balance_after
        );
        Ok(receipt)
    }

    async fn create_once(
        &self,
        student_id: i64,
        validated: &ValidatedDocumentRequest,
    ) -> Result<DocumentRequestReceipt, WorkflowError> {
        let mut tx = self.pool.begin().await?;

        let billable: Vec<String> = EnrollmentStatus::ALL
            .iter()
            .filter(|status| status.accepts_document_requests())
            .map(|status| status.as_str().to_string())
            .collect();
        let sql = format!(
            "SELECT {} FROM enrollment
             WHERE student_id = $1 AND status = ANY($2)
             ORDER BY created_at DESC, id DESC
             LIMIT 1
             FOR UPDATE",
            ENROLLMENT_COLUMNS
        );
        let enrollment = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(student_id)
            .bind(&billable)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| WorkflowError::not_found("No active enrollment found for this student"))?;

        let sql = format!(
            "INSERT INTO document_request (enrollment_id, student_id, doc_type, academic_credentials, certification,
                                           description, request_date, year_graduated, grade_strand_course,
                                           level_attended, document_price, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {}",
            DOCUMENT_REQUEST_COLUMNS
        );
        let request = sqlx::query_as::<_, DocumentRequest>(&sql)
            .bind(enrollment.id)
            .bind(student_id)
            .bind(validated.doc_type.as_str())
            .bind(&validated.academic_credentials)
            .bind(&validated.certification)
            .bind(&validated.description)
            .bind(validated.request_date)
            .bind(validated.year_graduated)
            .bind(&validated.grade_strand_course)
            .bind(&validated.level_attended)
            .bind(validated.document_price)
            .bind(DocumentRequestStatus::PendingForPayment.as_str())
            .fetch_one(&mut *tx)
            .await?;

        let balance_after: Decimal = sqlx::query_scalar(
            "UPDATE enrollment SET remaining_balance = remaining_balance + $2, updated_at = now()
             WHERE id = $1
             RETURNING remaining_balance",
        )
        .bind(enrollment.id)
        .bind(validated.document_price)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(DocumentRequestReceipt {
            request,
            balance_before: enrollment.remaining_balance,
            balance_after,
        })
    }

    pub async fn list_for_student(
        &self,
        principal: &Principal,
        student_id: i64,
    ) -> Result<Vec<DocumentRequest>, WorkflowError> {
        principal.require_record_access(student_id)?;
        let sql = format!(
            "SELECT {} FROM document_request WHERE student_id = $1 ORDER BY created_at DESC, id DESC",
            DOCUMENT_REQUEST_COLUMNS
        );
        let requests = sqlx::query_as::<_, DocumentRequest>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(requests)
    }

    /// Registrar processing. Rejecting an unpaid request takes its price back
    /// off the enrollment balance.
    pub async fn update_status(
        &self,
        principal: &Principal,
        request_id: i64,
        target: DocumentRequestStatus,
    ) -> Result<DocumentRequest, WorkflowError> {
        principal.require(Capability::ProcessDocuments)?;
        let request = with_retry(self.retries, move || self.update_status_once(request_id, target)).await?;
        info!(
            "registrar {} set document request {} to {}",
            principal.id, request_id, request.status
        );
        Ok(request)
    }

    async fn update_status_once(
        &self,
        request_id: i64,
        target: DocumentRequestStatus,
    ) -> Result<DocumentRequest, WorkflowError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {} FROM document_request WHERE id = $1", DOCUMENT_REQUEST_COLUMNS);
        let request = sqlx::query_as::<_, DocumentRequest>(&sql)
            .bind(request_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| WorkflowError::not_found(format!("Document request {} not found", request_id)))?;

        let Step::Apply { from, to } = request.status.next(target)? else {
            return Ok(request);
        };

        let sql = format!(
            "UPDATE document_request SET status = $2, updated_at = now()
             WHERE id = $1 AND status = $3
             RETURNING {}",
            DOCUMENT_REQUEST_COLUMNS
        );
        let updated = sqlx::query_as::<_, DocumentRequest>(&sql)
            .bind(request_id)
            .bind(to.as_str())
            .bind(from.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| WorkflowError::conflict("Document request was changed by another request; reload and retry"))?;

        if from == DocumentRequestStatus::PendingForPayment && to == DocumentRequestStatus::Rejected {
            sqlx::query(
                "UPDATE enrollment SET remaining_balance = GREATEST(remaining_balance - $2, 0), updated_at = now()
                 WHERE id = $1",
            )
            .bind(updated.enrollment_id)
            .bind(updated.document_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }
}
