//! Grade approval chain for one class: instructor entry, program head,
//! dean, then registrar ratification.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Step, WorkflowError};
use crate::types::Role;

status_enum! {
    /// Approval status shared by every grade row of a class
    GradeStatus, "grade status" {
        NotGraded => "Not Graded",
        Graded => "Graded",
        ProgramHeadApproved => "Program Head Approved",
        DeanApproved => "Dean Approved",
        Final => "Final",
    }
}

impl GradeStatus {
    fn rank(&self) -> u8 {
        match self {
            GradeStatus::NotGraded => 0,
            GradeStatus::Graded => 1,
            GradeStatus::ProgramHeadApproved => 2,
            GradeStatus::DeanApproved => 3,
            GradeStatus::Final => 4,
        }
    }

    /// Instructors may (re)enter grades until the program head signs off
    pub fn accepts_grade_entry(&self) -> bool {
        matches!(self, GradeStatus::NotGraded | GradeStatus::Graded)
    }
}

/// A class is only as far along as its least-approved grade row
pub fn class_status(statuses: &[GradeStatus]) -> GradeStatus {
    statuses
        .iter()
        .copied()
        .min_by_key(GradeStatus::rank)
        .unwrap_or(GradeStatus::NotGraded)
}

/// The stage a role signs off: the status it acts on and the one it produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalStage {
    pub expects: GradeStatus,
    pub produces: GradeStatus,
}

/// Which approval stage a role owns. Approvals are strictly ordered.
pub fn stage_for(role: Role) -> Result<ApprovalStage, WorkflowError> {
    match role {
        Role::ProgramHead => Ok(ApprovalStage {
            expects: GradeStatus::Graded,
            produces: GradeStatus::ProgramHeadApproved,
        }),
        Role::Dean => Ok(ApprovalStage {
            expects: GradeStatus::ProgramHeadApproved,
            produces: GradeStatus::DeanApproved,
        }),
        Role::Registrar => Ok(ApprovalStage {
            expects: GradeStatus::DeanApproved,
            produces: GradeStatus::Final,
        }),
        Role::Student | Role::Instructor | Role::Accounting | Role::Admin => Err(WorkflowError::forbidden(
            format!("Role '{}' does not approve grades", role),
        )),
    }
}

/// Plan an approval by `role` for a class currently at `current` holding
/// `total_grades` entered grades. Approving a class that already passed the
/// role's stage is a no-op.
pub fn plan_approval(current: GradeStatus, role: Role, total_grades: i64) -> Result<Step<GradeStatus>, WorkflowError> {
    let stage = stage_for(role)?;
    if total_grades <= 0 {
        return Err(WorkflowError::conflict("Class has no grades to approve"));
    }
    if current == stage.expects {
        return Ok(Step::Apply {
            from: current,
            to: stage.produces,
        });
    }
    if current.rank() >= stage.produces.rank() {
        return Ok(Step::Unchanged(current));
    }
    Err(WorkflowError::invalid_transition("grades", current, stage.produces))
}

/// Plan a rejection by `role`. Rejecting returns the whole class to
/// `Not Graded` regardless of the stage it was rejected at.
pub fn plan_reject(current: GradeStatus, role: Role, total_grades: i64) -> Result<Step<GradeStatus>, WorkflowError> {
    let stage = stage_for(role)?;
    if current == GradeStatus::NotGraded {
        return Ok(Step::Unchanged(current));
    }
    if total_grades <= 0 {
        return Err(WorkflowError::conflict("Class has no grades to reject"));
    }
    if current == GradeStatus::Final {
        return Err(WorkflowError::conflict("Final grades cannot be rejected"));
    }
    if current == stage.expects {
        return Ok(Step::Apply {
            from: current,
            to: GradeStatus::NotGraded,
        });
    }
    Err(WorkflowError::invalid_transition("grades", current, GradeStatus::NotGraded))
}

/// Outcome label for a numeric grade (1.00 best, 5.00 failing)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Remark {
    Passed,
    Failed,
}

impl Remark {
    pub fn for_grade(grade: Decimal) -> Self {
        if grade >= Decimal::ONE && grade <= Decimal::new(300, 2) {
            Remark::Passed
        } else {
            Remark::Failed
        }
    }
}

/// One student's grade as entered by the instructor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub student_id: i64,
    pub final_grade: Decimal,
}

/// Check a batch of grade entries before it reaches the store
pub fn validate_entries(entries: &[GradeEntry]) -> Result<(), WorkflowError> {
    if entries.is_empty() {
        return Err(WorkflowError::validation("grades", "At least one grade is required"));
    }
    let min = Decimal::ONE;
    let max = Decimal::new(5, 0);
    let mut seen = std::collections::HashSet::new();
    for (index, entry) in entries.iter().enumerate() {
        let field = format!("grades[{}].finalGrade", index);
        if entry.final_grade < min || entry.final_grade > max {
            return Err(WorkflowError::validation(field, "Final grade must be between 1.00 and 5.00"));
        }
        if entry.final_grade.round_dp(2) != entry.final_grade {
            return Err(WorkflowError::validation(field, "Final grade allows at most two decimal places"));
        }
        if !seen.insert(entry.student_id) {
            return Err(WorkflowError::validation(
                format!("grades[{}].studentId", index),
                format!("Student {} appears more than once", entry.student_id),
            ));
        }
    }
    Ok(())
}
