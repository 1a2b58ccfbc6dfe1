pub mod document_service;
pub mod enrollment_service;
pub mod grade_service;
pub mod tor_service;

pub use document_service::DocumentRequestService;
pub use enrollment_service::EnrollmentService;
pub use grade_service::GradeService;
pub use tor_service::TorService;

use crate::database::DatabaseError;
use crate::workflow::WorkflowError;

/// Map a failed insert to a conflict when a unique index rejected it
pub(crate) fn conflict_on_duplicate(message: &'static str) -> impl FnOnce(sqlx::Error) -> WorkflowError {
    move |err| {
        let err = DatabaseError::from(err);
        if err.is_unique_violation() {
            WorkflowError::conflict(message)
        } else {
            WorkflowError::Database(err)
        }
    }
}

/// Status text read back from the store that no longer parses
pub(crate) fn corrupt_status(err: crate::workflow::StatusParseError) -> WorkflowError {
    WorkflowError::Database(DatabaseError::QueryError(err.to_string()))
}
