use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::auth::policy::Capability;
use crate::cache::TtlCache;
use crate::database::models::tor::TOR_REQUEST_COLUMNS;
use crate::database::models::{CourseEquivalency, TorRequest};
use crate::database::with_retry;
use crate::types::Principal;
use crate::workflow::tor::{
    prepare_equivalencies, remaining_courses, CurriculumCourse, EquivalencyInput, TorDecision, TorStatus,
};
use crate::workflow::{Step, WorkflowError};

/// Credit evaluation of one TOR request against the target term's curriculum
#[derive(Debug, Clone, Serialize)]
pub struct TorEvaluation {
    pub tor_request_id: i64,
    pub student_id: i64,
    pub status: TorStatus,
    pub curriculum: Vec<CurriculumCourse>,
    pub equivalencies: Vec<CourseEquivalency>,
    pub required_courses: Vec<CurriculumCourse>,
    pub remaining_courses: Vec<CurriculumCourse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TorRequestDetail {
    #[serde(flatten)]
    pub request: TorRequest,
    pub previous_academic_year: Option<String>,
    pub equivalencies: Vec<CourseEquivalency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EquivalencySubmission {
    pub tor_request_id: i64,
    pub inserted: u64,
    pub skipped: u64,
    pub status: TorStatus,
}

pub struct TorService {
    pool: PgPool,
    evaluations: Arc<TtlCache<i64, TorEvaluation>>,
    retries: u32,
}

impl TorService {
    pub fn new(pool: PgPool, evaluations: Arc<TtlCache<i64, TorEvaluation>>, retries: u32) -> Self {
        Self {
            pool,
            evaluations,
            retries,
        }
    }

    pub async fn get(&self, principal: &Principal, tor_request_id: i64) -> Result<TorRequestDetail, WorkflowError> {
        principal.require(Capability::ViewTranscript)?;
        let mut conn = self.pool.acquire().await?;
        let request = fetch_request(&mut conn, tor_request_id).await?;
        let previous_academic_year = previous_academic_year(&mut conn, request.enrollment_id).await?;
        let equivalencies = equivalencies(&mut conn, tor_request_id).await?;
        Ok(TorRequestDetail {
            request,
            previous_academic_year,
            equivalencies,
        })
    }

    /// Read-through cached evaluation; every mutation below invalidates it
    pub async fn evaluation(&self, principal: &Principal, tor_request_id: i64) -> Result<TorEvaluation, WorkflowError> {
        principal.require(Capability::ViewTranscript)?;
        self.evaluations
            .get_or_try_insert_with(tor_request_id, move || async move {
                let mut conn = self.pool.acquire().await?;
                let request = fetch_request(&mut conn, tor_request_id).await?;
                evaluate(&mut conn, &request).await
            })
            .await
    }

    /// Record the program head's course equivalencies. Rows already on file
    /// are skipped, so resubmitting the same batch changes nothing.
    pub async fn submit_equivalencies(
        &self,
        principal: &Principal,
        tor_request_id: i64,
        inputs: &[EquivalencyInput],
    ) -> Result<EquivalencySubmission, WorkflowError> {
        principal.require(Capability::EvaluateTranscript)?;
        if inputs.is_empty() {
            return Err(WorkflowError::validation("equivalencies", "At least one equivalency is required"));
        }

        let result = with_retry(self.retries, move || self.submit_equivalencies_once(tor_request_id, inputs)).await?;
        self.evaluations.invalidate(&tor_request_id).await;
        info!(
            "program head {} recorded {} equivalencies ({} skipped) on TOR request {}",
            principal.id, result.inserted, result.skipped, tor_request_id
        );
        Ok(result)
    }

    async fn submit_equivalencies_once(
        &self,
        tor_request_id: i64,
        inputs: &[EquivalencyInput],
    ) -> Result<EquivalencySubmission, WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let request = fetch_request(&mut tx, tor_request_id).await?;
        let step = request.status.on_equivalency_submission()?;

        let window = previous_academic_year(&mut tx, request.enrollment_id)
            .await?
            .ok_or_else(|| {
                WorkflowError::validation(
                    "previousAcademicYear",
                    "Enrollment has no previous academic year on record",
                )
            })?;
        let prepared = prepare_equivalencies(inputs, &window)?;

        let course_ids: Vec<i64> = prepared.iter().map(|e| e.equivalent_course_id).collect();
        let known: Vec<i64> = sqlx::query_scalar("SELECT id FROM course WHERE id = ANY($1)")
            .bind(&course_ids)
            .fetch_all(&mut *tx)
            .await?;
        let known: HashSet<i64> = known.into_iter().collect();
        if let Some(missing) = course_ids.iter().find(|id| !known.contains(id)) {
            return Err(WorkflowError::not_found(format!("Course {} not found", missing)));
        }

        let mut inserted = 0;
        for equivalency in &prepared {
            let result = sqlx::query(
                "INSERT INTO course_equivalency (tor_request_id, external_course_code, external_course_name,
                                                 external_grade, external_units, equivalent_course_id,
                                                 source_school, source_academic_year)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (tor_request_id, external_course_code, equivalent_course_id) DO NOTHING",
            )
            .bind(tor_request_id)
            .bind(&equivalency.external_course_code)
            .bind(&equivalency.external_course_name)
            .bind(&equivalency.external_grade)
            .bind(equivalency.external_units)
            .bind(equivalency.equivalent_course_id)
            .bind(&equivalency.source_school)
            .bind(&equivalency.source_academic_year)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        if let Step::Apply { from, to } = step {
            set_status(&mut tx, tor_request_id, from, to, None).await?;
        }
        tx.commit().await?;

        Ok(EquivalencySubmission {
            tor_request_id,
            inserted,
            skipped: inputs.len() as u64 - inserted,
            status: step.status(),
        })
    }

    /// Assign a remaining curriculum course the transferee must still take
    pub async fn assign_required_course(
        &self,
        principal: &Principal,
        tor_request_id: i64,
        program_course_id: i64,
    ) -> Result<TorEvaluation, WorkflowError> {
        principal.require(Capability::EvaluateTranscript)?;
        let evaluation = with_retry(self.retries, move || {
            self.assign_required_course_once(tor_request_id, program_course_id)
        })
        .await?;
        self.evaluations.invalidate(&tor_request_id).await;
        info!(
            "program head {} assigned curriculum slot {} on TOR request {}",
            principal.id, program_course_id, tor_request_id
        );
        Ok(evaluation)
    }

    async fn assign_required_course_once(
        &self,
        tor_request_id: i64,
        program_course_id: i64,
    ) -> Result<TorEvaluation, WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let request = fetch_request(&mut tx, tor_request_id).await?;
        if !request.status.is_open() {
            return Err(WorkflowError::conflict(format!(
                "TOR request is already {} and can no longer be changed",
                request.status
            )));
        }

        let before = evaluate(&mut tx, &request).await?;
        if before.required_courses.iter().any(|c| c.program_course_id == program_course_id) {
            return Ok(before);
        }
        if !before.remaining_courses.iter().any(|c| c.program_course_id == program_course_id) {
            return Err(if before.curriculum.iter().any(|c| c.program_course_id == program_course_id) {
                WorkflowError::conflict("Course is already credited through an equivalency")
            } else {
                WorkflowError::not_found("Course is not part of the student's curriculum for this term")
            });
        }

        sqlx::query(
            "INSERT INTO student_required_course (student_id, program_course_id, tor_request_id)
             VALUES ($1, $2, $3)
             ON CONFLICT (student_id, program_course_id) DO NOTHING",
        )
        .bind(request.student_id)
        .bind(program_course_id)
        .bind(tor_request_id)
        .execute(&mut *tx)
        .await?;

        let after = evaluate(&mut tx, &request).await?;
        tx.commit().await?;
        Ok(after)
    }

    /// Registrar's verdict on a reviewed evaluation
    pub async fn decide(
        &self,
        principal: &Principal,
        tor_request_id: i64,
        decision: TorDecision,
        remarks: Option<&str>,
    ) -> Result<TorRequest, WorkflowError> {
        principal.require(Capability::DecideTranscript)?;
        let remarks = remarks.map(str::trim).filter(|r| !r.is_empty());
        let request = with_retry(self.retries, move || self.decide_once(tor_request_id, decision, remarks)).await?;
        self.evaluations.invalidate(&tor_request_id).await;
        info!(
            "registrar {} decided TOR request {}: {}",
            principal.id, tor_request_id, request.status
        );
        Ok(request)
    }

    async fn decide_once(
        &self,
        tor_request_id: i64,
        decision: TorDecision,
        remarks: Option<&str>,
    ) -> Result<TorRequest, WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let request = fetch_request(&mut tx, tor_request_id).await?;
        let Step::Apply { from, to } = request.status.on_decision(decision)? else {
            return Ok(request);
        };
        let updated = set_status(&mut tx, tor_request_id, from, to, remarks).await?;
        tx.commit().await?;
        Ok(updated)
    }
}

async fn fetch_request(conn: &mut PgConnection, tor_request_id: i64) -> Result<TorRequest, WorkflowError> {
    let sql = format!("SELECT {} FROM tor_request WHERE id = $1", TOR_REQUEST_COLUMNS);
    sqlx::query_as::<_, TorRequest>(&sql)
        .bind(tor_request_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| WorkflowError::not_found(format!("TOR request {} not found", tor_request_id)))
}

async fn previous_academic_year(conn: &mut PgConnection, enrollment_id: i64) -> Result<Option<String>, WorkflowError> {
    let year: Option<Option<String>> =
        sqlx::query_scalar("SELECT previous_academic_year FROM enrollment WHERE id = $1")
            .bind(enrollment_id)
            .fetch_optional(conn)
            .await?;
    Ok(year.flatten())
}

async fn equivalencies(conn: &mut PgConnection, tor_request_id: i64) -> Result<Vec<CourseEquivalency>, WorkflowError> {
    let rows = sqlx::query_as::<_, CourseEquivalency>(
        "SELECT id, tor_request_id, external_course_code, external_course_name, external_grade,
                external_units, equivalent_course_id, source_school, source_academic_year
         FROM course_equivalency WHERE tor_request_id = $1
         ORDER BY external_course_code, id",
    )
    .bind(tor_request_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Guarded status write; fails with a conflict if another request moved it first
async fn set_status(
    conn: &mut PgConnection,
    tor_request_id: i64,
    from: TorStatus,
    to: TorStatus,
    remarks: Option<&str>,
) -> Result<TorRequest, WorkflowError> {
    let sql = format!(
        "UPDATE tor_request SET status = $2, remarks = COALESCE($4, remarks), updated_at = now()
         WHERE id = $1 AND status = $3
         RETURNING {}",
        TOR_REQUEST_COLUMNS
    );
    sqlx::query_as::<_, TorRequest>(&sql)
        .bind(tor_request_id)
        .bind(to.as_str())
        .bind(from.as_str())
        .bind(remarks)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| WorkflowError::conflict("TOR request was changed by another request; reload and retry"))
}

const CURRICULUM_SELECT: &str = "SELECT pc.id AS program_course_id, c.id AS course_id, c.code AS course_code,
            c.name AS course_name, c.units, pc.semester, pc.major
     FROM program_course pc
     JOIN course c ON c.id = pc.course_id";

async fn evaluate(conn: &mut PgConnection, request: &TorRequest) -> Result<TorEvaluation, WorkflowError> {
    let curriculum = sqlx::query_as::<_, CurriculumCourse>(&format!(
        "{} WHERE pc.program_id = $1 AND pc.year_id = $2 AND pc.semester = $3 ORDER BY c.code",
        CURRICULUM_SELECT
    ))
    .bind(request.program_id)
    .bind(request.year_id)
    .bind(&request.semester)
    .fetch_all(&mut *conn)
    .await?;

    let equivalencies = equivalencies(&mut *conn, request.id).await?;
    let credited: HashSet<i64> = equivalencies.iter().map(|e| e.equivalent_course_id).collect();

    let required_courses = sqlx::query_as::<_, CurriculumCourse>(&format!(
        "{} JOIN student_required_course src ON src.program_course_id = pc.id
         WHERE src.student_id = $1 ORDER BY c.code",
        CURRICULUM_SELECT
    ))
    .bind(request.student_id)
    .fetch_all(&mut *conn)
    .await?;
    let assigned: HashSet<i64> = required_courses.iter().map(|c| c.program_course_id).collect();

    let remaining_courses = remaining_courses(&curriculum, &credited, &assigned);
    Ok(TorEvaluation {
        tor_request_id: request.id,
        student_id: request.student_id,
        status: request.status,
        curriculum,
        equivalencies,
        required_courses,
        remaining_courses,
    })
}
