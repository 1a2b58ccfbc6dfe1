//! Enrollment lifecycle: submission checks and the registrar/accounting
//! transition table.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::tor::TorStatus;
use super::{Step, WorkflowError};

static ACADEMIC_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{4}$").expect("valid regex"));

status_enum! {
    /// Enrollment record status
    EnrollmentStatus, "enrollment status" {
        Pending => "Pending",
        PendingTor => "Pending TOR",
        Verified => "Verified",
        ForPayment => "For Payment",
        OfficiallyEnrolled => "Officially Enrolled",
        Rejected => "Rejected",
    }
}

status_enum! {
    StudentType, "student type" {
        New => "new",
        Transferee => "transferee",
    }
}

/// Registrar and accounting actions on an enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentAction {
    /// Registrar confirms documents (and, for transferees, the approved TOR)
    Verify,
    /// Registrar assesses fees; the enrollment waits for payment
    AssessFees,
    /// Accounting confirms payment
    Clear,
    Reject,
}

/// Facts outside the enrollment row that a transition depends on
#[derive(Debug, Clone, Copy)]
pub struct TransitionGate {
    pub student_type: StudentType,
    pub tor_status: Option<TorStatus>,
}

impl EnrollmentStatus {
    /// Status a freshly submitted enrollment starts in
    pub fn initial(student_type: StudentType) -> Self {
        match student_type {
            StudentType::New => EnrollmentStatus::Pending,
            StudentType::Transferee => EnrollmentStatus::PendingTor,
        }
    }

    /// Enrollments a document request may be billed against
    pub fn accepts_document_requests(&self) -> bool {
        matches!(
            self,
            EnrollmentStatus::Verified | EnrollmentStatus::ForPayment | EnrollmentStatus::OfficiallyEnrolled
        )
    }

    pub fn target_of(action: EnrollmentAction) -> Self {
        match action {
            EnrollmentAction::Verify => EnrollmentStatus::Verified,
            EnrollmentAction::AssessFees => EnrollmentStatus::ForPayment,
            EnrollmentAction::Clear => EnrollmentStatus::OfficiallyEnrolled,
            EnrollmentAction::Reject => EnrollmentStatus::Rejected,
        }
    }

    /// Transition table. A transferee cannot be verified until the registrar
    /// has approved its transcript evaluation.
    pub fn next(self, action: EnrollmentAction, gate: TransitionGate) -> Result<Step<Self>, WorkflowError> {
        use EnrollmentStatus::*;

        let to = Self::target_of(action);
        if self == to {
            return Ok(Step::Unchanged(self));
        }

        let allowed = match (self, action) {
            (Pending, EnrollmentAction::Verify) | (PendingTor, EnrollmentAction::Verify) => {
                if gate.student_type == StudentType::Transferee
                    && gate.tor_status != Some(TorStatus::RegistrarApproved)
                {
                    return Err(WorkflowError::conflict(
                        "Transferee enrollment cannot be verified until the TOR evaluation is approved by the registrar",
                    ));
                }
                true
            }
            (Verified, EnrollmentAction::AssessFees) => true,
            (ForPayment, EnrollmentAction::Clear) => true,
            (Pending | PendingTor | Verified | ForPayment, EnrollmentAction::Reject) => true,
            _ => false,
        };

        if allowed {
            Ok(Step::Apply { from: self, to })
        } else {
            Err(WorkflowError::invalid_transition("enrollment", self, to))
        }
    }
}

/// Kinds of documents attached to an enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    IdPicture,
    BirthCertificate,
    Form137,
    TransferCertificate,
    Tor,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::IdPicture => "id_picture",
            DocumentKind::BirthCertificate => "birth_certificate",
            DocumentKind::Form137 => "form_137",
            DocumentKind::TransferCertificate => "transfer_certificate",
            DocumentKind::Tor => "tor",
        }
    }

    /// Submission field the upload path came from
    pub fn field(&self) -> &'static str {
        match self {
            DocumentKind::IdPicture => "idPictureDoc",
            DocumentKind::BirthCertificate => "birthCertificateDoc",
            DocumentKind::Form137 => "form137Doc",
            DocumentKind::TransferCertificate => "transferCertificateDoc",
            DocumentKind::Tor => "torDoc",
        }
    }
}

/// Enrollment form as posted by a student. Document fields are temporary
/// upload paths.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentSubmission {
    pub program_id: Option<i64>,
    pub year_level: Option<i16>,
    pub semester: Option<String>,
    pub academic_year: Option<String>,
    pub student_type: Option<String>,
    pub id_picture_doc: Option<String>,
    pub birth_certificate_doc: Option<String>,
    pub form137_doc: Option<String>,
    pub transfer_certificate_doc: Option<String>,
    pub tor_doc: Option<String>,
    pub previous_school: Option<String>,
    pub previous_program: Option<String>,
    pub previous_academic_year: Option<String>,
}

/// Transferee background copied onto the enrollment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousSchool {
    pub school: String,
    pub program: String,
    pub academic_year: String,
}

/// Submission that passed every check
#[derive(Debug, Clone)]
pub struct ValidatedEnrollment {
    pub program_id: i64,
    pub year_level: i16,
    pub semester: String,
    pub academic_year: String,
    pub student_type: StudentType,
    pub documents: Vec<(DocumentKind, String)>,
    pub previous: Option<PreviousSchool>,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(value: &Option<String>, field: &str, message: &str) -> Result<String, WorkflowError> {
    present(value).ok_or_else(|| WorkflowError::validation(field, message))
}

pub fn is_academic_year(value: &str) -> bool {
    ACADEMIC_YEAR.is_match(value)
}

/// Exclusive upper bound of fees, payments and balances (`NUMERIC(12,2)`)
pub const MAX_AMOUNT: i64 = 10_000_000_000;

/// Check an assessed fee or payment fits the balance columns
pub fn validate_amount(amount: Decimal) -> Result<(), WorkflowError> {
    if amount >= Decimal::from(MAX_AMOUNT) {
        return Err(WorkflowError::validation("amount", "Amount must be less than 10,000,000,000.00"));
    }
    if amount.round_dp(2) != amount {
        return Err(WorkflowError::validation("amount", "Amount allows at most two decimal places"));
    }
    Ok(())
}

impl EnrollmentSubmission {
    /// Check required fields and documents for the declared student type.
    /// The first failing check is reported.
    pub fn validate(&self) -> Result<ValidatedEnrollment, WorkflowError> {
        let program_id = self
            .program_id
            .filter(|id| *id > 0)
            .ok_or_else(|| WorkflowError::validation("programId", "Program is required"))?;
        let year_level = self
            .year_level
            .filter(|level| (1..=10).contains(level))
            .ok_or_else(|| WorkflowError::validation("yearLevel", "Year level must be between 1 and 10"))?;
        let semester = required(&self.semester, "semester", "Semester is required")?;
        let academic_year = required(&self.academic_year, "academicYear", "Academic year is required")?;
        if !is_academic_year(&academic_year) {
            return Err(WorkflowError::validation(
                "academicYear",
                "Academic year must be in YYYY-YYYY format",
            ));
        }

        let student_type = match present(&self.student_type).as_deref() {
            Some("new") => StudentType::New,
            Some("transferee") => StudentType::Transferee,
            Some(_) => {
                return Err(WorkflowError::validation(
                    "studentType",
                    "Student type must be 'new' or 'transferee'",
                ))
            }
            None => return Err(WorkflowError::validation("studentType", "Student type is required")),
        };

        let mut documents = vec![
            (
                DocumentKind::IdPicture,
                required(&self.id_picture_doc, "idPictureDoc", "ID picture is required")?,
            ),
            (
                DocumentKind::BirthCertificate,
                required(&self.birth_certificate_doc, "birthCertificateDoc", "Birth certificate is required")?,
            ),
        ];

        let previous = match student_type {
            StudentType::New => {
                documents.push((
                    DocumentKind::Form137,
                    required(&self.form137_doc, "form137Doc", "Form 137 is required for new students")?,
                ));
                None
            }
            StudentType::Transferee => {
                documents.push((
                    DocumentKind::TransferCertificate,
                    required(
                        &self.transfer_certificate_doc,
                        "transferCertificateDoc",
                        "Transfer certificate is required for transferees",
                    )?,
                ));
                documents.push((
                    DocumentKind::Tor,
                    required(&self.tor_doc, "torDoc", "Transcript of records is required for transferees")?,
                ));
                let school = required(
                    &self.previous_school,
                    "previousSchool",
                    "Previous school is required for transferees",
                )?;
                let program = required(
                    &self.previous_program,
                    "previousProgram",
                    "Previous program is required for transferees",
                )?;
                let previous_year = required(
                    &self.previous_academic_year,
                    "previousAcademicYear",
                    "Previous academic year is required for transferees",
                )?;
                if !is_academic_year(&previous_year) {
                    return Err(WorkflowError::validation(
                        "previousAcademicYear",
                        "Previous academic year must be in YYYY-YYYY format",
                    ));
                }
                super::tor::expand_academic_year_range(&previous_year)
                    .map_err(|_| WorkflowError::validation("previousAcademicYear", "Previous academic year range is invalid"))?;
                Some(PreviousSchool {
                    school,
                    program,
                    academic_year: previous_year,
                })
            }
        };

        Ok(ValidatedEnrollment {
            program_id,
            year_level,
            semester,
            academic_year,
            student_type,
            documents,
            previous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_student() -> EnrollmentSubmission {
        EnrollmentSubmission {
            program_id: Some(3),
            year_level: Some(1),
            semester: Some("1st Semester".into()),
            academic_year: Some("2025-2026".into()),
            student_type: Some("new".into()),
            id_picture_doc: Some("u1/id.png".into()),
            birth_certificate_doc: Some("u1/psa.pdf".into()),
            form137_doc: Some("u1/f137.pdf".into()),
            ..Default::default()
        }
    }

    fn transferee() -> EnrollmentSubmission {
        EnrollmentSubmission {
            student_type: Some("transferee".into()),
            form137_doc: None,
            transfer_certificate_doc: Some("u1/transfer.pdf".into()),
            tor_doc: Some("u1/tor.pdf".into()),
            previous_school: Some("Riverside College".into()),
            previous_program: Some("BSIT".into()),
            previous_academic_year: Some("2023-2025".into()),
            ..new_student()
        }
    }

    fn message(err: WorkflowError) -> String {
        match err {
            WorkflowError::Validation { message, .. } => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn new_student_requires_form_137() {
        let mut submission = new_student();
        submission.form137_doc = None;
        assert_eq!(message(submission.validate().unwrap_err()), "Form 137 is required for new students");

        submission.form137_doc = Some("   ".into());
        assert_eq!(message(submission.validate().unwrap_err()), "Form 137 is required for new students");
    }

    #[test]
    fn id_and_birth_certificate_are_always_required() {
        let mut submission = transferee();
        submission.id_picture_doc = None;
        assert_eq!(message(submission.validate().unwrap_err()), "ID picture is required");

        let mut submission = new_student();
        submission.birth_certificate_doc = None;
        assert_eq!(message(submission.validate().unwrap_err()), "Birth certificate is required");
    }

    #[test]
    fn transferee_needs_transfer_documents_and_history() {
        let mut submission = transferee();
        submission.tor_doc = None;
        assert_eq!(
            message(submission.validate().unwrap_err()),
            "Transcript of records is required for transferees"
        );

        let mut submission = transferee();
        submission.previous_program = None;
        assert_eq!(
            message(submission.validate().unwrap_err()),
            "Previous program is required for transferees"
        );
    }

    #[test]
    fn transferee_previous_year_must_be_a_range() {
        let mut submission = transferee();
        submission.previous_academic_year = Some("2023".into());
        match submission.validate().unwrap_err() {
            WorkflowError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("previousAcademicYear")),
            other => panic!("unexpected {other:?}"),
        }

        submission.previous_academic_year = Some("2025-2023".into());
        assert!(submission.validate().is_err());
    }

    #[test]
    fn valid_submissions_list_their_documents() {
        let validated = new_student().validate().unwrap();
        assert_eq!(validated.student_type, StudentType::New);
        let kinds: Vec<_> = validated.documents.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![DocumentKind::IdPicture, DocumentKind::BirthCertificate, DocumentKind::Form137]
        );
        assert!(validated.previous.is_none());

        let validated = transferee().validate().unwrap();
        assert_eq!(validated.documents.len(), 4);
        assert_eq!(validated.previous.unwrap().academic_year, "2023-2025");
    }

    #[test]
    fn transferee_starts_pending_tor() {
        assert_eq!(EnrollmentStatus::initial(StudentType::New), EnrollmentStatus::Pending);
        assert_eq!(EnrollmentStatus::initial(StudentType::Transferee), EnrollmentStatus::PendingTor);
    }

    #[test]
    fn transferee_verification_waits_for_registrar_approved_tor() {
        for tor_status in [None, Some(TorStatus::Pending), Some(TorStatus::PhReviewed), Some(TorStatus::Rejected)] {
            let gate = TransitionGate {
                student_type: StudentType::Transferee,
                tor_status,
            };
            let err = EnrollmentStatus::PendingTor.next(EnrollmentAction::Verify, gate).unwrap_err();
            assert!(matches!(err, WorkflowError::Conflict(_)), "{tor_status:?}");
        }

        let gate = TransitionGate {
            student_type: StudentType::Transferee,
            tor_status: Some(TorStatus::RegistrarApproved),
        };
        assert_eq!(
            EnrollmentStatus::PendingTor.next(EnrollmentAction::Verify, gate).unwrap(),
            Step::Apply {
                from: EnrollmentStatus::PendingTor,
                to: EnrollmentStatus::Verified
            }
        );
    }

    #[test]
    fn happy_path_for_new_students() {
        let gate = TransitionGate {
            student_type: StudentType::New,
            tor_status: None,
        };
        let verified = EnrollmentStatus::Pending.next(EnrollmentAction::Verify, gate).unwrap().status();
        let for_payment = verified.next(EnrollmentAction::AssessFees, gate).unwrap().status();
        let enrolled = for_payment.next(EnrollmentAction::Clear, gate).unwrap().status();
        assert_eq!(enrolled, EnrollmentStatus::OfficiallyEnrolled);
    }

    #[test]
    fn out_of_order_actions_are_rejected() {
        let gate = TransitionGate {
            student_type: StudentType::New,
            tor_status: None,
        };
        assert!(matches!(
            EnrollmentStatus::Pending.next(EnrollmentAction::Clear, gate),
            Err(WorkflowError::InvalidTransition { .. })
        ));
        assert!(matches!(
            EnrollmentStatus::OfficiallyEnrolled.next(EnrollmentAction::Reject, gate),
            Err(WorkflowError::InvalidTransition { .. })
        ));
        assert!(matches!(
            EnrollmentStatus::Rejected.next(EnrollmentAction::Verify, gate),
            Err(WorkflowError::InvalidTransition { .. })
        ));
        assert_eq!(
            EnrollmentStatus::Verified.next(EnrollmentAction::Verify, gate).unwrap(),
            Step::Unchanged(EnrollmentStatus::Verified)
        );
    }

    #[test]
    fn only_cleared_enrollments_take_document_requests() {
        let accepting: Vec<_> = EnrollmentStatus::ALL
            .iter()
            .filter(|s| s.accepts_document_requests())
            .collect();
        assert_eq!(
            accepting,
            vec![
                &EnrollmentStatus::Verified,
                &EnrollmentStatus::ForPayment,
                &EnrollmentStatus::OfficiallyEnrolled
            ]
        );
    }

    #[test]
    fn amounts_must_fit_the_balance_columns() {
        assert!(validate_amount(Decimal::new(1_250_050, 2)).is_ok());
        assert!(validate_amount(Decimal::new(9_999_999_999_99, 2)).is_ok());
        assert_eq!(
            message(validate_amount(Decimal::from(MAX_AMOUNT)).unwrap_err()),
            "Amount must be less than 10,000,000,000.00"
        );
        assert_eq!(
            message(validate_amount(Decimal::new(1, 3)).unwrap_err()),
            "Amount allows at most two decimal places"
        );
        assert!(validate_amount(Decimal::new(1000, 3)).is_ok());
    }
}
