use sqlx::{PgConnection, PgPool};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::corrupt_status;
use crate::auth::policy::Capability;
use crate::cache::TtlCache;
use crate::database::models::{ApprovalQueueEntry, ClassGradeSummary, FinalGrade};
use crate::database::with_retry;
use crate::types::{Principal, Role};
use crate::workflow::grade::{
    class_status, plan_approval, plan_reject, stage_for, validate_entries, GradeEntry, GradeStatus, Remark,
};
use crate::workflow::{Step, WorkflowError};

/// Roles whose approval queues are cached
const APPROVER_ROLES: [Role; 3] = [Role::ProgramHead, Role::Dean, Role::Registrar];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Approve,
    Reject,
}

pub struct GradeService {
    pool: PgPool,
    queues: Arc<TtlCache<Role, Vec<ApprovalQueueEntry>>>,
    retries: u32,
}

impl GradeService {
    pub fn new(pool: PgPool, queues: Arc<TtlCache<Role, Vec<ApprovalQueueEntry>>>, retries: u32) -> Self {
        Self { pool, queues, retries }
    }

    /// Enter or replace grades for a class the instructor teaches
    pub async fn submit_grades(
        &self,
        principal: &Principal,
        program_course_id: i64,
        class_assignment_id: i64,
        entries: &[GradeEntry],
    ) -> Result<ClassGradeSummary, WorkflowError> {
        principal.require(Capability::EnterGrades)?;
        validate_entries(entries)?;

        let instructor_id = principal.id;
        let summary = with_retry(self.retries, move || {
            self.submit_grades_once(instructor_id, program_course_id, class_assignment_id, entries)
        })
        .await?;

        info!(
            "instructor {} submitted {} grades for class {}/{}",
            instructor_id,
            entries.len(),
            program_course_id,
            class_assignment_id
        );
        self.invalidate_queues().await;
        Ok(summary)
    }

    async fn submit_grades_once(
        &self,
        instructor_id: i64,
        program_course_id: i64,
        class_assignment_id: i64,
        entries: &[GradeEntry],
    ) -> Result<ClassGradeSummary, WorkflowError> {
        let mut tx = self.pool.begin().await?;

        let class: Option<(i64, String)> = sqlx::query_as(
            "SELECT ca.instructor_id, pc.semester
             FROM class_assignment ca
             JOIN program_course pc ON pc.id = ca.program_course_id
             WHERE ca.id = $1 AND ca.program_course_id = $2",
        )
        .bind(class_assignment_id)
        .bind(program_course_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((assigned_instructor, semester)) = class else {
            return Err(WorkflowError::not_found("Class not found"));
        };
        if assigned_instructor != instructor_id {
            return Err(WorkflowError::forbidden("Class is assigned to another instructor"));
        }

        let student_ids: Vec<i64> = entries.iter().map(|entry| entry.student_id).collect();
        let known: HashSet<i64> = sqlx::query_scalar::<_, i64>("SELECT id FROM student WHERE id = ANY($1)")
            .bind(&student_ids)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();
        if let Some((index, entry)) = entries
            .iter()
            .enumerate()
            .find(|(_, entry)| !known.contains(&entry.student_id))
        {
            return Err(WorkflowError::not_found(format!(
                "Student {} not found (grades[{}].studentId)",
                entry.student_id, index
            )));
        }

        let (_, current) = class_state(&mut tx, program_course_id, class_assignment_id).await?;
        if !current.accepts_grade_entry() {
            return Err(WorkflowError::conflict(format!(
                "Grades are already {} and can no longer be edited",
                current
            )));
        }

        for entry in entries {
            let written = sqlx::query(
                "INSERT INTO grade (student_id, program_course_id, class_assignment_id, semester, final_grade, approval_status)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (student_id, program_course_id, class_assignment_id)
                 DO UPDATE SET final_grade = EXCLUDED.final_grade,
                               approval_status = EXCLUDED.approval_status,
                               updated_at = now()
                 WHERE grade.approval_status IN ($6, $7)",
            )
            .bind(entry.student_id)
            .bind(program_course_id)
            .bind(class_assignment_id)
            .bind(&semester)
            .bind(entry.final_grade)
            .bind(GradeStatus::Graded.as_str())
            .bind(GradeStatus::NotGraded.as_str())
            .execute(&mut *tx)
            .await?;
            if written.rows_affected() == 0 {
                return Err(WorkflowError::conflict(CONCURRENT_UPDATE));
            }
        }

        // rows left behind by an earlier rejection rejoin the class
        sqlx::query(
            "UPDATE grade SET approval_status = $3, updated_at = now()
             WHERE program_course_id = $1 AND class_assignment_id = $2
               AND approval_status = $4 AND final_grade IS NOT NULL",
        )
        .bind(program_course_id)
        .bind(class_assignment_id)
        .bind(GradeStatus::Graded.as_str())
        .bind(GradeStatus::NotGraded.as_str())
        .execute(&mut *tx)
        .await?;

        let (total_grades, approval_status) = class_state(&mut tx, program_course_id, class_assignment_id).await?;
        tx.commit().await?;

        Ok(ClassGradeSummary {
            program_course_id,
            class_assignment_id,
            total_grades,
            approval_status,
            changed: true,
        })
    }

    pub async fn approve(
        &self,
        principal: &Principal,
        program_course_id: i64,
        class_assignment_id: i64,
    ) -> Result<ClassGradeSummary, WorkflowError> {
        self.decide(principal, program_course_id, class_assignment_id, Decision::Approve)
            .await
    }

    /// Send a class back to the instructor. Grade values are kept.
    pub async fn reject(
        &self,
        principal: &Principal,
        program_course_id: i64,
        class_assignment_id: i64,
    ) -> Result<ClassGradeSummary, WorkflowError> {
        self.decide(principal, program_course_id, class_assignment_id, Decision::Reject)
            .await
    }

    async fn decide(
        &self,
        principal: &Principal,
        program_course_id: i64,
        class_assignment_id: i64,
        decision: Decision,
    ) -> Result<ClassGradeSummary, WorkflowError> {
        principal.require(Capability::ApproveGrades)?;
        let role = principal.role;
        let summary = with_retry(self.retries, move || {
            self.decide_once(role, program_course_id, class_assignment_id, decision)
        })
        .await?;

        if summary.changed {
            info!(
                "{} {} {:?} class {}/{}: now {}",
                principal.role, principal.id, decision, program_course_id, class_assignment_id, summary.approval_status
            );
            self.invalidate_queues().await;
        }
        Ok(summary)
    }

    async fn decide_once(
        &self,
        role: Role,
        program_course_id: i64,
        class_assignment_id: i64,
        decision: Decision,
    ) -> Result<ClassGradeSummary, WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let (total_grades, current) = class_state(&mut tx, program_course_id, class_assignment_id).await?;

        let step = match decision {
            Decision::Approve => plan_approval(current, role, total_grades)?,
            Decision::Reject => plan_reject(current, role, total_grades)?,
        };

        let (approval_status, changed) = match step {
            Step::Unchanged(status) => (status, false),
            Step::Apply { from, to } => {
                let updated = sqlx::query(
                    "UPDATE grade SET approval_status = $3, updated_at = now()
                     WHERE program_course_id = $1 AND class_assignment_id = $2 AND approval_status = $4",
                )
                .bind(program_course_id)
                .bind(class_assignment_id)
                .bind(to.as_str())
                .bind(from.as_str())
                .execute(&mut *tx)
                .await?;
                if updated.rows_affected() == 0 {
                    return Err(WorkflowError::conflict(CONCURRENT_UPDATE));
                }
                tx.commit().await?;
                (to, true)
            }
        };

        Ok(ClassGradeSummary {
            program_course_id,
            class_assignment_id,
            total_grades,
            approval_status,
            changed,
        })
    }

    /// Classes waiting on the caller's approval stage
    pub async fn approval_queue(&self, principal: &Principal) -> Result<Vec<ApprovalQueueEntry>, WorkflowError> {
        principal.require(Capability::ApproveGrades)?;
        let stage = stage_for(principal.role)?;
        self.queues
            .get_or_try_insert_with(principal.role, move || self.load_queue(stage.expects))
            .await
    }

    async fn load_queue(&self, expects: GradeStatus) -> Result<Vec<ApprovalQueueEntry>, WorkflowError> {
        let entries = sqlx::query_as::<_, ApprovalQueueEntry>(
            "SELECT g.program_course_id, g.class_assignment_id, ca.section,
                    c.code AS course_code, c.name AS course_name, pc.semester,
                    COUNT(g.final_grade) AS total_grades
             FROM grade g
             JOIN class_assignment ca ON ca.id = g.class_assignment_id
             JOIN program_course pc ON pc.id = g.program_course_id
             JOIN course c ON c.id = pc.course_id
             GROUP BY g.program_course_id, g.class_assignment_id, ca.section, c.code, c.name, pc.semester
             HAVING COUNT(g.final_grade) > 0 AND bool_and(g.approval_status = $1)
             ORDER BY c.code, ca.section",
        )
        .bind(expects.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Registrar-ratified grades of a student, with pass/fail remarks
    pub async fn final_grades(&self, principal: &Principal, student_id: i64) -> Result<Vec<FinalGrade>, WorkflowError> {
        principal.require_record_access(student_id)?;
        let mut grades = sqlx::query_as::<_, FinalGrade>(
            "SELECT g.program_course_id, c.code AS course_code, c.name AS course_name, c.units,
                    g.semester, g.final_grade
             FROM grade g
             JOIN program_course pc ON pc.id = g.program_course_id
             JOIN course c ON c.id = pc.course_id
             WHERE g.student_id = $1 AND g.approval_status = $2 AND g.final_grade IS NOT NULL
             ORDER BY g.semester, c.code",
        )
        .bind(student_id)
        .bind(GradeStatus::Final.as_str())
        .fetch_all(&self.pool)
        .await?;

        for grade in &mut grades {
            grade.remark = Some(Remark::for_grade(grade.final_grade));
        }
        Ok(grades)
    }

    async fn invalidate_queues(&self) {
        for role in APPROVER_ROLES {
            self.queues.invalidate(&role).await;
        }
    }
}

const CONCURRENT_UPDATE: &str = "Grades were changed by another request; reload and retry";

/// Number of entered grades and the derived status of one class
async fn class_state(
    conn: &mut PgConnection,
    program_course_id: i64,
    class_assignment_id: i64,
) -> Result<(i64, GradeStatus), WorkflowError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT approval_status, COUNT(final_grade)
         FROM grade
         WHERE program_course_id = $1 AND class_assignment_id = $2
         GROUP BY approval_status",
    )
    .bind(program_course_id)
    .bind(class_assignment_id)
    .fetch_all(conn)
    .await?;

    let mut statuses = Vec::with_capacity(rows.len());
    let mut total = 0;
    for (status, graded) in rows {
        statuses.push(status.parse::<GradeStatus>().map_err(corrupt_status)?);
        total += graded;
    }
    Ok((total, class_status(&statuses)))
}
