mod common;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;

use common::TestDb;
use registrar_api::types::{Principal, Role};
use registrar_api::workflow::document_request::{DocumentRequestInput, DocumentRequestStatus};
use registrar_api::workflow::enrollment::{EnrollmentStatus, EnrollmentSubmission};
use registrar_api::workflow::WorkflowError;

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn diploma_request() -> DocumentRequestInput {
    DocumentRequestInput {
        description: Some("Needed for employment abroad".into()),
        date: Some(today().format("%Y-%m-%d").to_string()),
        year_graduated: Some(json!(2021)),
        grade_strand_course: Some("BS Information Technology".into()),
        level_attended: vec!["COLLEGE".into()],
        academic_credentials: vec!["DIPLOMA".into()],
        certification: vec![],
    }
}

async fn verified_enrollment(db: &TestDb, student: &Principal) -> i64 {
    let submission = EnrollmentSubmission {
        program_id: Some(db.program().await),
        year_level: Some(4),
        semester: Some("2nd Semester".into()),
        academic_year: Some("2026-2027".into()),
        student_type: Some("new".into()),
        id_picture_doc: Some(db.upload("id.png").await),
        birth_certificate_doc: Some(db.upload("psa.pdf").await),
        form137_doc: Some(db.upload("form137.pdf").await),
        ..Default::default()
    };
    let enrollment = db.state.enrollments().submit(student, &submission).await.unwrap();
    let registrar = Principal::new(1, Role::Registrar, "Registrar");
    let verified = db.state.enrollments().verify(&registrar, enrollment.id).await.unwrap();
    assert_eq!(verified.status, EnrollmentStatus::Verified);
    verified.id
}

#[tokio::test]
async fn requests_need_an_active_enrollment() {
    let Some(db) = common::test_db().await else { return };
    let student = db.student().await;

    let result = db.state.document_requests().create(&student, &diploma_request(), today()).await;
    match result {
        Err(WorkflowError::NotFound(message)) => assert_eq!(message, "No active enrollment found for this student"),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test]
async fn price_is_billed_and_reversed_on_rejection() {
    let Some(db) = common::test_db().await else { return };
    let student = db.student().await;
    let enrollment_id = verified_enrollment(&db, &student).await;
    let service = db.state.document_requests();

    let receipt = service.create(&student, &diploma_request(), today()).await.unwrap();
    assert_eq!(receipt.request.enrollment_id, enrollment_id);
    assert_eq!(receipt.request.document_price, Decimal::new(50_000, 2));
    assert_eq!(receipt.balance_before, Decimal::ZERO);
    assert_eq!(receipt.balance_after, Decimal::new(50_000, 2));

    let listed = service.list_for_student(&student, student.id).await.unwrap();
    assert_eq!(listed.len(), 1);

    let registrar = Principal::new(1, Role::Registrar, "Registrar");
    let rejected = service
        .update_status(&registrar, receipt.request.id, DocumentRequestStatus::Rejected)
        .await
        .unwrap();
    assert_eq!(rejected.status, DocumentRequestStatus::Rejected);

    let balance: Decimal = sqlx::query_scalar("SELECT remaining_balance FROM enrollment WHERE id = $1")
        .bind(enrollment_id)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(balance, Decimal::ZERO);
}

#[tokio::test]
async fn status_moves_forward_only() {
    let Some(db) = common::test_db().await else { return };
    let student = db.student().await;
    verified_enrollment(&db, &student).await;
    let service = db.state.document_requests();
    let registrar = Principal::new(1, Role::Registrar, "Registrar");

    let receipt = service.create(&student, &diploma_request(), today()).await.unwrap();
    let id = receipt.request.id;

    let skipped = service.update_status(&registrar, id, DocumentRequestStatus::ReadyForPickup).await;
    assert!(matches!(skipped, Err(WorkflowError::InvalidTransition { .. })), "{skipped:?}");

    service.update_status(&registrar, id, DocumentRequestStatus::Processing).await.unwrap();
    let ready = service
        .update_status(&registrar, id, DocumentRequestStatus::ReadyForPickup)
        .await
        .unwrap();
    assert_eq!(ready.status, DocumentRequestStatus::ReadyForPickup);

    let student_attempt = service.update_status(&student, id, DocumentRequestStatus::Rejected).await;
    assert!(matches!(student_attempt, Err(WorkflowError::Forbidden(_))));
}
