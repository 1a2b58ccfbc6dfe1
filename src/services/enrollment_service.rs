use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use tracing::{info, warn};

use super::{conflict_on_duplicate, corrupt_status};
use crate::auth::policy::Capability;
use crate::database::models::enrollment::ENROLLMENT_COLUMNS;
use crate::database::models::{Enrollment, Payment};
use crate::database::with_retry;
use crate::storage::{sha256_hex, DocumentStorage, StorageError};
use crate::types::Principal;
use crate::workflow::enrollment::{
    validate_amount, DocumentKind, EnrollmentAction, EnrollmentStatus, EnrollmentSubmission, StudentType,
    TransitionGate, ValidatedEnrollment, MAX_AMOUNT,
};
use crate::workflow::tor::TorStatus;
use crate::workflow::{Step, WorkflowError};

/// An uploaded file read into memory, ready to persist with the enrollment
struct StoredDocument {
    kind: DocumentKind,
    content: Vec<u8>,
    sha256: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentInput {
    pub amount: Decimal,
    pub reference: Option<String>,
}

pub struct EnrollmentService {
    pool: PgPool,
    storage: Arc<dyn DocumentStorage>,
    retries: u32,
}

impl EnrollmentService {
    pub fn new(pool: PgPool, storage: Arc<dyn DocumentStorage>, retries: u32) -> Self {
        Self { pool, storage, retries }
    }

    /// Submit an enrollment for the calling student. Validation and document
    /// reads happen before the transaction; the enrollment row, its documents
    /// and, for transferees, the TOR request commit together.
    pub async fn submit(
        &self,
        principal: &Principal,
        submission: &EnrollmentSubmission,
    ) -> Result<Enrollment, WorkflowError> {
        principal.require(Capability::SubmitEnrollment)?;
        let validated = submission.validate()?;
        let documents = self.load_documents(&validated).await?;

        let student_id = principal.id;
        let (validated, documents) = (&validated, documents.as_slice());
        let enrollment = with_retry(self.retries, move || self.insert_enrollment(student_id, validated, documents)).await?;

        info!(
            "enrollment {} submitted by student {} for {} {} ({})",
            enrollment.id, student_id, enrollment.academic_year, enrollment.semester, enrollment.status
        );

        for (_, path) in &validated.documents {
            if let Err(e) = self.storage.delete(path).await {
                warn!("failed to remove temporary upload {}: {}", path, e);
            }
        }
        Ok(enrollment)
    }

    async fn load_documents(&self, validated: &ValidatedEnrollment) -> Result<Vec<StoredDocument>, WorkflowError> {
        let mut documents = Vec::with_capacity(validated.documents.len());
        for (kind, path) in &validated.documents {
            let content = match self.storage.read(path).await {
                Ok(bytes) => bytes,
                Err(StorageError::NotFound(_)) | Err(StorageError::InvalidPath(_)) => {
                    return Err(WorkflowError::validation(
                        kind.field(),
                        format!("Uploaded file '{}' was not found", path),
                    ));
                }
                Err(e) => return Err(e.into()),
            };
            let sha256 = sha256_hex(&content);
            documents.push(StoredDocument {
                kind: *kind,
                content,
                sha256,
            });
        }
        Ok(documents)
    }

    async fn insert_enrollment(
        &self,
        student_id: i64,
        validated: &ValidatedEnrollment,
        documents: &[StoredDocument],
    ) -> Result<Enrollment, WorkflowError> {
        let mut tx = self.pool.begin().await?;

        let student: Option<i64> = sqlx::query_scalar("SELECT id FROM student WHERE id = $1")
            .bind(student_id)
            .fetch_optional(&mut *tx)
            .await?;
        if student.is_none() {
            return Err(WorkflowError::not_found("Student not found"));
        }

        let program: Option<i64> = sqlx::query_scalar("SELECT id FROM program WHERE id = $1")
            .bind(validated.program_id)
            .fetch_optional(&mut *tx)
            .await?;
        if program.is_none() {
            return Err(WorkflowError::validation("programId", "Program not found"));
        }

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM enrollment
             WHERE student_id = $1 AND academic_year = $2 AND semester = $3 AND status <> $4",
        )
        .bind(student_id)
        .bind(&validated.academic_year)
        .bind(&validated.semester)
        .bind(EnrollmentStatus::Rejected.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Err(WorkflowError::conflict(DUPLICATE_ENROLLMENT));
        }

        let year_id = program_year_id(&mut tx, validated.program_id, validated.year_level).await?;
        let status = EnrollmentStatus::initial(validated.student_type);
        let previous = validated.previous.as_ref();

        let sql = format!(
            "INSERT INTO enrollment (student_id, program_id, year_id, semester, academic_year, student_type,
                                     status, previous_school, previous_program, previous_academic_year)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {}",
            ENROLLMENT_COLUMNS
        );
        let enrollment = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(student_id)
            .bind(validated.program_id)
            .bind(year_id)
            .bind(&validated.semester)
            .bind(&validated.academic_year)
            .bind(validated.student_type.as_str())
            .bind(status.as_str())
            .bind(previous.map(|p| p.school.as_str()))
            .bind(previous.map(|p| p.program.as_str()))
            .bind(previous.map(|p| p.academic_year.as_str()))
            .fetch_one(&mut *tx)
            .await
            .map_err(conflict_on_duplicate(DUPLICATE_ENROLLMENT))?;

        for document in documents {
            sqlx::query(
                "INSERT INTO enrollment_document (enrollment_id, kind, content, sha256)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(enrollment.id)
            .bind(document.kind.as_str())
            .bind(&document.content)
            .bind(&document.sha256)
            .execute(&mut *tx)
            .await?;
        }

        if validated.student_type == StudentType::Transferee {
            sqlx::query(
                "INSERT INTO tor_request (enrollment_id, student_id, program_id, year_id, semester)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(enrollment.id)
            .bind(student_id)
            .bind(validated.program_id)
            .bind(year_id)
            .bind(&validated.semester)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(enrollment)
    }

    pub async fn get(&self, principal: &Principal, enrollment_id: i64) -> Result<Enrollment, WorkflowError> {
        let mut conn = self.pool.acquire().await?;
        let enrollment = fetch_enrollment(&mut conn, enrollment_id).await?;
        principal.require_record_access(enrollment.student_id)?;
        Ok(enrollment)
    }

    pub async fn verify(&self, principal: &Principal, enrollment_id: i64) -> Result<Enrollment, WorkflowError> {
        principal.require(Capability::ReviewEnrollment)?;
        self.transition(principal, enrollment_id, EnrollmentAction::Verify, Decimal::ZERO, None)
            .await
    }

    /// Assess fees on a verified enrollment; the amount is added to its balance
    pub async fn assess_fees(
        &self,
        principal: &Principal,
        enrollment_id: i64,
        amount: Decimal,
    ) -> Result<Enrollment, WorkflowError> {
        principal.require(Capability::ReviewEnrollment)?;
        if amount < Decimal::ZERO {
            return Err(WorkflowError::validation("amount", "Assessed amount cannot be negative"));
        }
        validate_amount(amount)?;
        self.transition(principal, enrollment_id, EnrollmentAction::AssessFees, amount, None)
            .await
    }

    pub async fn reject(
        &self,
        principal: &Principal,
        enrollment_id: i64,
        reason: &str,
    ) -> Result<Enrollment, WorkflowError> {
        principal.require(Capability::ReviewEnrollment)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::validation("reason", "A reason is required to reject an enrollment"));
        }
        self.transition(principal, enrollment_id, EnrollmentAction::Reject, Decimal::ZERO, Some(reason))
            .await
    }

    /// Accounting clearance without a recorded payment (scholars, waivers)
    pub async fn clear(&self, principal: &Principal, enrollment_id: i64) -> Result<Enrollment, WorkflowError> {
        principal.require(Capability::CollectPayment)?;
        self.transition(principal, enrollment_id, EnrollmentAction::Clear, Decimal::ZERO, None)
            .await
    }

    async fn transition(
        &self,
        principal: &Principal,
        enrollment_id: i64,
        action: EnrollmentAction,
        amount: Decimal,
        reason: Option<&str>,
    ) -> Result<Enrollment, WorkflowError> {
        let enrollment = with_retry(self.retries, move || {
            self.transition_once(enrollment_id, action, amount, reason)
        })
        .await?;
        info!(
            "{} {} moved enrollment {} to {}",
            principal.role, principal.id, enrollment_id, enrollment.status
        );
        Ok(enrollment)
    }

    async fn transition_once(
        &self,
        enrollment_id: i64,
        action: EnrollmentAction,
        amount: Decimal,
        reason: Option<&str>,
    ) -> Result<Enrollment, WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let enrollment = fetch_enrollment(&mut tx, enrollment_id).await?;
        let gate = TransitionGate {
            student_type: enrollment.student_type,
            tor_status: tor_status(&mut tx, enrollment_id).await?,
        };

        let Step::Apply { from, to } = enrollment.status.next(action, gate)? else {
            return Ok(enrollment);
        };
        if enrollment.remaining_balance + amount >= Decimal::from(MAX_AMOUNT) {
            return Err(WorkflowError::validation(
                "amount",
                format!("Balance of {} cannot take {} more", enrollment.remaining_balance, amount),
            ));
        }

        let sql = format!(
            "UPDATE enrollment
             SET status = $2, remaining_balance = remaining_balance + $3,
                 status_reason = COALESCE($4, status_reason), updated_at = now()
             WHERE id = $1 AND status = $5
             RETURNING {}",
            ENROLLMENT_COLUMNS
        );
        let updated = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(enrollment_id)
            .bind(to.as_str())
            .bind(amount)
            .bind(reason)
            .bind(from.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| WorkflowError::conflict(CONCURRENT_UPDATE))?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Record a payment against the balance. A payment on an enrollment
    /// waiting for payment also clears it.
    pub async fn record_payment(
        &self,
        principal: &Principal,
        enrollment_id: i64,
        input: &PaymentInput,
    ) -> Result<(Payment, Enrollment), WorkflowError> {
        principal.require(Capability::CollectPayment)?;
        if input.amount <= Decimal::ZERO {
            return Err(WorkflowError::validation("amount", "Payment amount must be positive"));
        }
        validate_amount(input.amount)?;
        let recorded_by = principal.id;
        let result = with_retry(self.retries, move || self.record_payment_once(enrollment_id, input, recorded_by)).await?;
        info!(
            "payment {} of {} recorded on enrollment {} by {}",
            result.0.id, result.0.amount, enrollment_id, recorded_by
        );
        Ok(result)
    }

    async fn record_payment_once(
        &self,
        enrollment_id: i64,
        input: &PaymentInput,
        recorded_by: i64,
    ) -> Result<(Payment, Enrollment), WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let enrollment = fetch_enrollment(&mut tx, enrollment_id).await?;
        if enrollment.status == EnrollmentStatus::Rejected {
            return Err(WorkflowError::conflict("Cannot record a payment on a rejected enrollment"));
        }
        if input.amount > enrollment.remaining_balance {
            return Err(WorkflowError::validation(
                "amount",
                format!("Payment exceeds the remaining balance of {}", enrollment.remaining_balance),
            ));
        }

        let to = if enrollment.status == EnrollmentStatus::ForPayment {
            let gate = TransitionGate {
                student_type: enrollment.student_type,
                tor_status: None,
            };
            enrollment.status.next(EnrollmentAction::Clear, gate)?.status()
        } else {
            enrollment.status
        };

        let payment = sqlx::query_as::<_, Payment>(
            "INSERT INTO payment (enrollment_id, amount, reference, recorded_by)
             VALUES ($1, $2, $3, $4)
             RETURNING id, enrollment_id, amount, reference, recorded_by, created_at",
        )
        .bind(enrollment_id)
        .bind(input.amount)
        .bind(input.reference.as_deref().map(str::trim).filter(|r| !r.is_empty()))
        .bind(recorded_by)
        .fetch_one(&mut *tx)
        .await?;

        let sql = format!(
            "UPDATE enrollment
             SET remaining_balance = remaining_balance - $2, status = $3, updated_at = now()
             WHERE id = $1 AND status = $4 AND remaining_balance >= $2
             RETURNING {}",
            ENROLLMENT_COLUMNS
        );
        let updated = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(enrollment_id)
            .bind(input.amount)
            .bind(to.as_str())
            .bind(enrollment.status.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| WorkflowError::conflict(CONCURRENT_UPDATE))?;

        tx.commit().await?;
        Ok((payment, updated))
    }

    pub async fn payments(&self, principal: &Principal, enrollment_id: i64) -> Result<Vec<Payment>, WorkflowError> {
        let enrollment = self.get(principal, enrollment_id).await?;
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT id, enrollment_id, amount, reference, recorded_by, created_at
             FROM payment WHERE enrollment_id = $1 ORDER BY created_at, id",
        )
        .bind(enrollment.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }
}

const DUPLICATE_ENROLLMENT: &str = "An enrollment already exists for this academic year and semester";
const CONCURRENT_UPDATE: &str = "Enrollment was changed by another request; reload and retry";

pub(crate) async fn fetch_enrollment(conn: &mut PgConnection, enrollment_id: i64) -> Result<Enrollment, WorkflowError> {
    let sql = format!("SELECT {} FROM enrollment WHERE id = $1", ENROLLMENT_COLUMNS);
    sqlx::query_as::<_, Enrollment>(&sql)
        .bind(enrollment_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| WorkflowError::not_found(format!("Enrollment {} not found", enrollment_id)))
}

async fn tor_status(conn: &mut PgConnection, enrollment_id: i64) -> Result<Option<TorStatus>, WorkflowError> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM tor_request WHERE enrollment_id = $1")
        .bind(enrollment_id)
        .fetch_optional(conn)
        .await?;
    status
        .map(|s| s.parse::<TorStatus>())
        .transpose()
        .map_err(corrupt_status)
}

/// Look up the (program, year level) row, creating it on first use.
/// Concurrent creators both land on the same row through the unique key.
async fn program_year_id(conn: &mut PgConnection, program_id: i64, year_level: i16) -> Result<i64, WorkflowError> {
    sqlx::query(
        "INSERT INTO program_year (program_id, year_level) VALUES ($1, $2)
         ON CONFLICT (program_id, year_level) DO NOTHING",
    )
    .bind(program_id)
    .bind(year_level)
    .execute(&mut *conn)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM program_year WHERE program_id = $1 AND year_level = $2")
        .bind(program_id)
        .bind(year_level)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}
