pub mod document_request;
pub mod enrollment;
pub mod grade;
pub mod tor;

pub use document_request::DocumentRequest;
pub use enrollment::{Enrollment, Payment};
pub use grade::{ApprovalQueueEntry, ClassGradeSummary, FinalGrade};
pub use tor::{CourseEquivalency, TorRequest};
