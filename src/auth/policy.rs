// Role -> capability table. Each role lists what it may do with an
// exhaustive match, so adding a role fails to compile until it is placed here.

use crate::types::{Principal, Role};
use crate::workflow::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    SubmitEnrollment,
    ReviewEnrollment,
    CollectPayment,
    EnterGrades,
    ApproveGrades,
    EvaluateTranscript,
    DecideTranscript,
    ViewTranscript,
    RequestDocuments,
    ProcessDocuments,
    ViewStudentRecords,
}

pub fn allows(role: Role, capability: Capability) -> bool {
    use Capability::*;

    match role {
        Role::Student => matches!(capability, SubmitEnrollment | RequestDocuments),
        Role::Instructor => matches!(capability, EnterGrades),
        Role::ProgramHead => matches!(
            capability,
            ApproveGrades | EvaluateTranscript | ViewTranscript | ViewStudentRecords
        ),
        Role::Dean => matches!(capability, ApproveGrades | ViewStudentRecords),
        Role::Registrar => matches!(
            capability,
            ReviewEnrollment
                | ApproveGrades
                | DecideTranscript
                | ViewTranscript
                | ProcessDocuments
                | ViewStudentRecords
        ),
        Role::Accounting => matches!(capability, CollectPayment | ViewStudentRecords),
        Role::Admin => matches!(capability, ViewStudentRecords),
    }
}

impl Principal {
    pub fn require(&self, capability: Capability) -> Result<(), WorkflowError> {
        if allows(self.role, capability) {
            Ok(())
        } else {
            tracing::warn!("{} {} denied {:?}", self.role, self.id, capability);
            Err(WorkflowError::forbidden(format!(
                "Role '{}' is not allowed to perform this action",
                self.role
            )))
        }
    }

    /// Students may read their own records; staff with record access may read any
    pub fn require_record_access(&self, student_id: i64) -> Result<(), WorkflowError> {
        match self.role {
            Role::Student if self.id == student_id => Ok(()),
            Role::Student => Err(WorkflowError::forbidden("Students may only access their own records")),
            Role::Instructor
            | Role::ProgramHead
            | Role::Dean
            | Role::Registrar
            | Role::Accounting
            | Role::Admin => self.require(Capability::ViewStudentRecords),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_students_submit_enrollments() {
        assert!(allows(Role::Student, Capability::SubmitEnrollment));
        assert!(!allows(Role::Registrar, Capability::SubmitEnrollment));
    }

    #[test]
    fn transcript_evaluation_is_split_between_program_head_and_registrar() {
        assert!(allows(Role::ProgramHead, Capability::EvaluateTranscript));
        assert!(!allows(Role::ProgramHead, Capability::DecideTranscript));
        assert!(allows(Role::Registrar, Capability::DecideTranscript));
        assert!(!allows(Role::Registrar, Capability::EvaluateTranscript));
    }

    #[test]
    fn record_access() {
        let student = Principal::new(5, Role::Student, "S");
        assert!(student.require_record_access(5).is_ok());
        assert!(student.require_record_access(6).is_err());

        let instructor = Principal::new(9, Role::Instructor, "I");
        assert!(instructor.require_record_access(5).is_err());
        let registrar = Principal::new(1, Role::Registrar, "R");
        assert!(registrar.require_record_access(5).is_ok());
    }
}
