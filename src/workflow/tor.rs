//! Transcript-of-records credit evaluation for transferees.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::enrollment::is_academic_year;
use super::{Step, WorkflowError};

status_enum! {
    /// Status of a transferee's credit evaluation request
    TorStatus, "TOR request status" {
        Pending => "pending",
        PhReviewed => "ph_reviewed",
        RegistrarApproved => "registrar_approved",
        Rejected => "rejected",
    }
}

/// Registrar verdict on a reviewed evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorDecision {
    Approve,
    Reject,
}

impl TorStatus {
    /// Program head submitting equivalencies: moves `pending` to
    /// `ph_reviewed`; further submissions while reviewed only add rows.
    pub fn on_equivalency_submission(self) -> Result<Step<Self>, WorkflowError> {
        match self {
            TorStatus::Pending => Ok(Step::Apply {
                from: self,
                to: TorStatus::PhReviewed,
            }),
            TorStatus::PhReviewed => Ok(Step::Unchanged(self)),
            TorStatus::RegistrarApproved | TorStatus::Rejected => Err(WorkflowError::conflict(format!(
                "TOR request is already {} and no longer accepts equivalencies",
                self
            ))),
        }
    }

    /// Program head may still shape the evaluation until the registrar decides
    pub fn is_open(&self) -> bool {
        matches!(self, TorStatus::Pending | TorStatus::PhReviewed)
    }

    pub fn on_decision(self, decision: TorDecision) -> Result<Step<Self>, WorkflowError> {
        let to = match decision {
            TorDecision::Approve => TorStatus::RegistrarApproved,
            TorDecision::Reject => TorStatus::Rejected,
        };
        match self {
            TorStatus::PhReviewed => Ok(Step::Apply { from: self, to }),
            current if current == to => Ok(Step::Unchanged(current)),
            TorStatus::Pending => Err(WorkflowError::conflict(
                "TOR request has not been reviewed by the program head",
            )),
            current => Err(WorkflowError::invalid_transition("TOR request", current, to)),
        }
    }
}

/// Expand a multi-year span into its single-year spans:
/// `"2023-2025"` becomes `["2023-2024", "2024-2025"]`.
pub fn expand_academic_year_range(range: &str) -> Result<Vec<String>, WorkflowError> {
    let invalid = || {
        WorkflowError::validation(
            "previousAcademicYear",
            format!("'{}' is not a valid academic year range", range),
        )
    };
    if !is_academic_year(range) {
        return Err(invalid());
    }
    let (start, end) = range.split_once('-').ok_or_else(invalid)?;
    let start: i32 = start.parse().map_err(|_| invalid())?;
    let end: i32 = end.parse().map_err(|_| invalid())?;
    if end <= start {
        return Err(invalid());
    }
    Ok((start..end).map(|year| format!("{}-{}", year, year + 1)).collect())
}

/// Exclusive upper bound of external units (`NUMERIC(4,1)`)
const MAX_EXTERNAL_UNITS: i64 = 1000;

/// One external course mapped onto a local course, as posted by the program head
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EquivalencyInput {
    pub external_course_code: String,
    pub external_course_name: String,
    pub external_grade: String,
    pub external_units: Decimal,
    pub equivalent_course_id: i64,
    pub source_school: String,
    pub source_academic_year: String,
}

impl EquivalencyInput {
    /// Trimmed copy with the course code upper-cased, the form stored and
    /// compared for duplicates
    pub fn normalized(&self) -> Self {
        Self {
            external_course_code: self.external_course_code.trim().to_uppercase(),
            external_course_name: self.external_course_name.trim().to_string(),
            external_grade: self.external_grade.trim().to_string(),
            external_units: self.external_units,
            equivalent_course_id: self.equivalent_course_id,
            source_school: self.source_school.trim().to_string(),
            source_academic_year: self.source_academic_year.trim().to_string(),
        }
    }
}

/// Field checks plus the source-year window taken from the enrollment's
/// previous academic year. Returns the normalized batch with in-batch
/// duplicates of (external code, local course) dropped.
pub fn prepare_equivalencies(
    inputs: &[EquivalencyInput],
    previous_academic_year: &str,
) -> Result<Vec<EquivalencyInput>, WorkflowError> {
    let allowed = expand_academic_year_range(previous_academic_year)?;
    let mut seen = HashSet::new();
    let mut prepared = Vec::with_capacity(inputs.len());

    for (index, raw) in inputs.iter().enumerate() {
        let input = raw.normalized();
        let field = |name: &str| format!("equivalencies[{}].{}", index, name);

        if input.external_course_code.is_empty() {
            return Err(WorkflowError::validation(field("external_course_code"), "External course code is required"));
        }
        if input.external_course_name.is_empty() {
            return Err(WorkflowError::validation(field("external_course_name"), "External course name is required"));
        }
        if input.external_grade.is_empty() {
            return Err(WorkflowError::validation(field("external_grade"), "External grade is required"));
        }
        if input.external_units <= Decimal::ZERO {
            return Err(WorkflowError::validation(field("external_units"), "External units must be positive"));
        }
        if input.external_units >= Decimal::from(MAX_EXTERNAL_UNITS) {
            return Err(WorkflowError::validation(
                field("external_units"),
                format!("External units must be less than {}", MAX_EXTERNAL_UNITS),
            ));
        }
        if input.external_units.round_dp(1) != input.external_units {
            return Err(WorkflowError::validation(
                field("external_units"),
                "External units allow at most one decimal place",
            ));
        }
        if input.equivalent_course_id <= 0 {
            return Err(WorkflowError::validation(field("equivalent_course_id"), "Equivalent course is required"));
        }
        if input.source_school.is_empty() {
            return Err(WorkflowError::validation(field("source_school"), "Source school is required"));
        }
        if !allowed.contains(&input.source_academic_year) {
            return Err(WorkflowError::validation(
                field("source_academic_year"),
                format!(
                    "Source academic year '{}' is outside the previous academic years {}",
                    input.source_academic_year, previous_academic_year
                ),
            ));
        }

        if seen.insert((input.external_course_code.clone(), input.equivalent_course_id)) {
            prepared.push(input);
        }
    }
    Ok(prepared)
}

/// A curriculum slot with its course details
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct CurriculumCourse {
    pub program_course_id: i64,
    pub course_id: i64,
    pub course_code: String,
    pub course_name: String,
    pub units: Decimal,
    pub semester: String,
    pub major: Option<String>,
}

/// Curriculum slots of the target term still to be taken: neither credited by
/// an equivalency nor already assigned to the student.
pub fn remaining_courses(
    curriculum: &[CurriculumCourse],
    credited_course_ids: &HashSet<i64>,
    assigned_program_course_ids: &HashSet<i64>,
) -> Vec<CurriculumCourse> {
    curriculum
        .iter()
        .filter(|slot| !credited_course_ids.contains(&slot.course_id))
        .filter(|slot| !assigned_program_course_ids.contains(&slot.program_course_id))
        .cloned()
        .collect()
}
