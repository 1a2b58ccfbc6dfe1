mod common;

use rust_decimal::Decimal;
use serde_json::json;

use common::TestDb;
use registrar_api::services::enrollment_service::PaymentInput;
use registrar_api::types::{Principal, Role};
use registrar_api::workflow::enrollment::{EnrollmentStatus, EnrollmentSubmission};
use registrar_api::workflow::tor::{EquivalencyInput, TorDecision, TorStatus};
use registrar_api::workflow::WorkflowError;

async fn new_student_submission(db: &TestDb, program_id: i64) -> EnrollmentSubmission {
    EnrollmentSubmission {
        program_id: Some(program_id),
        year_level: Some(1),
        semester: Some("1st Semester".into()),
        academic_year: Some("2026-2027".into()),
        student_type: Some("new".into()),
        id_picture_doc: Some(db.upload("id.png").await),
        birth_certificate_doc: Some(db.upload("psa.pdf").await),
        form137_doc: Some(db.upload("form137.pdf").await),
        ..Default::default()
    }
}

async fn enrollment_count(db: &TestDb, student_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM enrollment WHERE student_id = $1")
        .bind(student_id)
        .fetch_one(db.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn one_active_enrollment_per_term() {
    let Some(db) = common::test_db().await else { return };
    let student = db.student().await;
    let program_id = db.program().await;
    let service = db.state.enrollments();

    let first = service
        .submit(&student, &new_student_submission(&db, program_id).await)
        .await
        .unwrap();
    assert_eq!(first.status, EnrollmentStatus::Pending);

    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollment_document WHERE enrollment_id = $1")
        .bind(first.id)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(documents, 3);

    let duplicate = service
        .submit(&student, &new_student_submission(&db, program_id).await)
        .await;
    assert!(matches!(duplicate, Err(WorkflowError::Conflict(_))), "{duplicate:?}");

    // a rejected enrollment frees the term
    let registrar = Principal::new(1, Role::Registrar, "Registrar");
    service.reject(&registrar, first.id, "Blurred birth certificate").await.unwrap();
    let again = service
        .submit(&student, &new_student_submission(&db, program_id).await)
        .await
        .unwrap();
    assert_eq!(again.status, EnrollmentStatus::Pending);
    assert_eq!(enrollment_count(&db, student.id).await, 2);
}

#[tokio::test]
async fn missing_upload_leaves_no_rows() {
    let Some(db) = common::test_db().await else { return };
    let student = db.student().await;
    let program_id = db.program().await;

    let mut submission = new_student_submission(&db, program_id).await;
    submission.form137_doc = Some("never-uploaded.pdf".into());

    let result = db.state.enrollments().submit(&student, &submission).await;
    match result {
        Err(WorkflowError::Validation { field, .. }) => assert_eq!(field.as_deref(), Some("form137Doc")),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(enrollment_count(&db, student.id).await, 0);
}

#[tokio::test]
async fn uploads_are_removed_after_commit() {
    let Some(db) = common::test_db().await else { return };
    let student = db.student().await;
    let program_id = db.program().await;
    let submission = new_student_submission(&db, program_id).await;
    let id_picture = submission.id_picture_doc.clone().unwrap();

    db.state.enrollments().submit(&student, &submission).await.unwrap();
    assert!(!db.uploads.path().join(id_picture).exists());
}

#[tokio::test]
async fn transferee_is_verified_only_after_tor_approval() {
    let Some(db) = common::test_db().await else { return };
    let student = db.student().await;
    let program_id = db.program().await;
    let year_id = db.program_year(program_id, 2).await;
    let course_a = db.course(3).await;
    let course_b = db.course(3).await;
    db.curriculum_slot(program_id, year_id, "1st Semester", course_a).await;
    let slot_b = db.curriculum_slot(program_id, year_id, "1st Semester", course_b).await;

    let submission = EnrollmentSubmission {
        program_id: Some(program_id),
        year_level: Some(2),
        semester: Some("1st Semester".into()),
        academic_year: Some("2026-2027".into()),
        student_type: Some("transferee".into()),
        id_picture_doc: Some(db.upload("id.png").await),
        birth_certificate_doc: Some(db.upload("psa.pdf").await),
        transfer_certificate_doc: Some(db.upload("honorable-dismissal.pdf").await),
        tor_doc: Some(db.upload("tor.pdf").await),
        previous_school: Some("Northern State College".into()),
        previous_program: Some("BS Computer Science".into()),
        previous_academic_year: Some("2024-2026".into()),
        ..Default::default()
    };
    let enrollments = db.state.enrollments();
    let enrollment = enrollments.submit(&student, &submission).await.unwrap();
    assert_eq!(enrollment.status, EnrollmentStatus::PendingTor);

    let tor_request_id: i64 = sqlx::query_scalar("SELECT id FROM tor_request WHERE enrollment_id = $1")
        .bind(enrollment.id)
        .fetch_one(db.pool())
        .await
        .unwrap();

    let registrar = Principal::new(1, Role::Registrar, "Registrar");
    let early = enrollments.verify(&registrar, enrollment.id).await;
    assert!(matches!(early, Err(WorkflowError::Conflict(_))), "{early:?}");

    let program_head = Principal::new(2, Role::ProgramHead, "Program Head");
    let batch = vec![EquivalencyInput {
        external_course_code: "cs 101".into(),
        external_course_name: "Introduction to Computing".into(),
        external_grade: "1.75".into(),
        external_units: Decimal::from(3),
        equivalent_course_id: course_a,
        source_school: "Northern State College".into(),
        source_academic_year: "2024-2025".into(),
    }];
    let transcripts = db.state.transcripts();
    let first = transcripts
        .submit_equivalencies(&program_head, tor_request_id, &batch)
        .await
        .unwrap();
    assert_eq!(first.inserted, 1);
    assert_eq!(first.status, TorStatus::PhReviewed);

    let repeat = transcripts
        .submit_equivalencies(&program_head, tor_request_id, &batch)
        .await
        .unwrap();
    assert_eq!(repeat.inserted, 0);
    assert_eq!(repeat.skipped, 1);

    let evaluation = transcripts.evaluation(&program_head, tor_request_id).await.unwrap();
    let remaining: Vec<i64> = evaluation.remaining_courses.iter().map(|c| c.program_course_id).collect();
    assert_eq!(remaining, vec![slot_b]);

    let assigned = transcripts
        .assign_required_course(&program_head, tor_request_id, slot_b)
        .await
        .unwrap();
    assert!(assigned.remaining_courses.is_empty());
    assert_eq!(assigned.required_courses.len(), 1);

    let decided = transcripts
        .decide(&registrar, tor_request_id, TorDecision::Approve, Some("Credited 3 units"))
        .await
        .unwrap();
    assert_eq!(decided.status, TorStatus::RegistrarApproved);

    let verified = enrollments.verify(&registrar, enrollment.id).await.unwrap();
    assert_eq!(verified.status, EnrollmentStatus::Verified);

    let assessed = enrollments
        .assess_fees(&registrar, enrollment.id, Decimal::new(1_500_000, 2))
        .await
        .unwrap();
    assert_eq!(assessed.status, EnrollmentStatus::ForPayment);
    assert_eq!(assessed.remaining_balance, Decimal::new(1_500_000, 2));

    let accounting = Principal::new(3, Role::Accounting, "Accounting");
    let payment: PaymentInput = serde_json::from_value(json!({ "amount": "5000.00", "reference": "OR-1182" })).unwrap();
    let (recorded, enrolled) = enrollments
        .record_payment(&accounting, enrollment.id, &payment)
        .await
        .unwrap();
    assert_eq!(recorded.amount, Decimal::new(500_000, 2));
    assert_eq!(enrolled.status, EnrollmentStatus::OfficiallyEnrolled);
    assert_eq!(enrolled.remaining_balance, Decimal::new(1_000_000, 2));
}

#[tokio::test]
async fn source_year_outside_previous_years_is_rejected() {
    let Some(db) = common::test_db().await else { return };
    let student = db.student().await;
    let program_id = db.program().await;
    let course = db.course(3).await;

    let submission = EnrollmentSubmission {
        program_id: Some(program_id),
        year_level: Some(2),
        semester: Some("2nd Semester".into()),
        academic_year: Some("2026-2027".into()),
        student_type: Some("transferee".into()),
        id_picture_doc: Some(db.upload("id.png").await),
        birth_certificate_doc: Some(db.upload("psa.pdf").await),
        transfer_certificate_doc: Some(db.upload("transfer.pdf").await),
        tor_doc: Some(db.upload("tor.pdf").await),
        previous_school: Some("Southern College".into()),
        previous_program: Some("BS Information Systems".into()),
        previous_academic_year: Some("2025-2026".into()),
        ..Default::default()
    };
    let enrollment = db.state.enrollments().submit(&student, &submission).await.unwrap();
    let tor_request_id: i64 = sqlx::query_scalar("SELECT id FROM tor_request WHERE enrollment_id = $1")
        .bind(enrollment.id)
        .fetch_one(db.pool())
        .await
        .unwrap();

    let program_head = Principal::new(2, Role::ProgramHead, "Program Head");
    let batch = vec![EquivalencyInput {
        external_course_code: "IS 110".into(),
        external_course_name: "Fundamentals of IS".into(),
        external_grade: "2.00".into(),
        external_units: Decimal::from(3),
        equivalent_course_id: course,
        source_school: "Southern College".into(),
        source_academic_year: "2019-2020".into(),
    }];
    let result = db
        .state
        .transcripts()
        .submit_equivalencies(&program_head, tor_request_id, &batch)
        .await;
    assert!(matches!(result, Err(WorkflowError::Validation { .. })), "{result:?}");

    let status: String = sqlx::query_scalar("SELECT status FROM tor_request WHERE id = $1")
        .bind(tor_request_id)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(status, "pending");
}

#[tokio::test]
async fn duplicate_equivalencies_in_one_batch_store_one_row() {
    let Some(db) = common::test_db().await else { return };
    let student = db.student().await;
    let program_id = db.program().await;
    let course = db.course(3).await;

    let submission = EnrollmentSubmission {
        program_id: Some(program_id),
        year_level: Some(3),
        semester: Some("1st Semester".into()),
        academic_year: Some("2026-2027".into()),
        student_type: Some("transferee".into()),
        id_picture_doc: Some(db.upload("id.png").await),
        birth_certificate_doc: Some(db.upload("psa.pdf").await),
        transfer_certificate_doc: Some(db.upload("transfer.pdf").await),
        tor_doc: Some(db.upload("tor.pdf").await),
        previous_school: Some("Eastern Polytechnic".into()),
        previous_program: Some("BS Computer Engineering".into()),
        previous_academic_year: Some("2024-2026".into()),
        ..Default::default()
    };
    let enrollment = db.state.enrollments().submit(&student, &submission).await.unwrap();
    let tor_request_id: i64 = sqlx::query_scalar("SELECT id FROM tor_request WHERE enrollment_id = $1")
        .bind(enrollment.id)
        .fetch_one(db.pool())
        .await
        .unwrap();

    let equivalency = EquivalencyInput {
        external_course_code: "MATH 11".into(),
        external_course_name: "College Algebra".into(),
        external_grade: "2.25".into(),
        external_units: Decimal::from(3),
        equivalent_course_id: course,
        source_school: "Eastern Polytechnic".into(),
        source_academic_year: "2025-2026".into(),
    };
    let batch = vec![equivalency.clone(), equivalency];
    let program_head = Principal::new(2, Role::ProgramHead, "Program Head");
    let submitted = db
        .state
        .transcripts()
        .submit_equivalencies(&program_head, tor_request_id, &batch)
        .await
        .unwrap();
    assert_eq!(submitted.inserted, 1);
    assert_eq!(submitted.skipped, 1);

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM course_equivalency WHERE tor_request_id = $1")
        .bind(tor_request_id)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn instructors_cannot_read_enrollment_records() {
    let Some(db) = common::test_db().await else { return };
    let student = db.student().await;
    let program_id = db.program().await;
    let submission = new_student_submission(&db, program_id).await;
    let enrollments = db.state.enrollments();
    let enrollment = enrollments.submit(&student, &submission).await.unwrap();

    let instructor = Principal::new(40, Role::Instructor, "Instructor");
    let denied = enrollments.get(&instructor, enrollment.id).await;
    assert!(matches!(denied, Err(WorkflowError::Forbidden(_))), "{denied:?}");

    let dean = Principal::new(3, Role::Dean, "Dean");
    assert_eq!(enrollments.get(&dean, enrollment.id).await.unwrap().id, enrollment.id);
    assert_eq!(enrollments.get(&student, enrollment.id).await.unwrap().id, enrollment.id);
}
