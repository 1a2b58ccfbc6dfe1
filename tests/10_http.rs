mod common;

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use common::{bearer, body_json, json_request, offline_state};
use registrar_api::app;
use registrar_api::types::Role;

#[tokio::test]
async fn root_is_public() {
    let uploads = tempfile::tempdir().unwrap();
    let response = app(offline_state(&uploads))
        .oneshot(json_request("GET", "/", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn health_reports_an_unreachable_database() {
    let uploads = tempfile::tempdir().unwrap();
    let response = app(offline_state(&uploads))
        .oneshot(json_request("GET", "/health", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["success"], false);
}

#[tokio::test]
async fn api_requires_a_bearer_token() {
    let uploads = tempfile::tempdir().unwrap();
    let router = app(offline_state(&uploads));

    let missing = router
        .clone()
        .oneshot(json_request("GET", "/api/approvals", None, None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(missing).await["code"], "UNAUTHORIZED");

    let forged = router
        .oneshot(json_request("GET", "/api/approvals", Some("Bearer not-a-jwt"), None))
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_role_is_forbidden() {
    let uploads = tempfile::tempdir().unwrap();
    let router = app(offline_state(&uploads));
    let student = bearer(7, Role::Student);

    let queue = router
        .clone()
        .oneshot(json_request("GET", "/api/approvals", Some(&student), None))
        .await
        .unwrap();
    assert_eq!(queue.status(), StatusCode::FORBIDDEN);

    let verify = router
        .clone()
        .oneshot(json_request("POST", "/api/enrollments/1/verify", Some(&student), None))
        .await
        .unwrap();
    assert_eq!(verify.status(), StatusCode::FORBIDDEN);

    let registrar = bearer(1, Role::Registrar);
    let enroll = router
        .oneshot(json_request("POST", "/api/enrollments", Some(&registrar), Some(json!({}))))
        .await
        .unwrap();
    assert_eq!(enroll.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn enrollment_validation_names_the_first_missing_field() {
    let uploads = tempfile::tempdir().unwrap();
    let student = bearer(7, Role::Student);
    let submission = json!({
        "programId": 3,
        "yearLevel": 1,
        "semester": "1st Semester",
        "academicYear": "2026-2027",
        "studentType": "new",
        "idPictureDoc": "id.png",
        "birthCertificateDoc": "psa.pdf"
    });

    let response = app(offline_state(&uploads))
        .oneshot(json_request("POST", "/api/enrollments", Some(&student), Some(submission)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["field"], "form137Doc");
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let uploads = tempfile::tempdir().unwrap();
    let instructor = bearer(40, Role::Instructor);
    let request = axum::http::Request::builder()
        .method("PUT")
        .uri("/api/classes/1/2/grades")
        .header("authorization", instructor)
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{\"grades\": [}"))
        .unwrap();

    let response = app(offline_state(&uploads)).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "INVALID_JSON");
}

#[tokio::test]
async fn out_of_range_grades_are_rejected_before_the_store() {
    let uploads = tempfile::tempdir().unwrap();
    let instructor = bearer(40, Role::Instructor);
    let body = json!({ "grades": [{ "studentId": 7, "finalGrade": "5.50" }] });

    let response = app(offline_state(&uploads))
        .oneshot(json_request("PUT", "/api/classes/1/2/grades", Some(&instructor), Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["field"], "grades[0].finalGrade");
}

#[tokio::test]
async fn payments_finer_than_centavos_are_rejected_before_the_store() {
    let uploads = tempfile::tempdir().unwrap();
    let accounting = bearer(60, Role::Accounting);

    for (amount, error) in [
        ("0.001", "Amount allows at most two decimal places"),
        ("10000000000", "Amount must be less than 10,000,000,000.00"),
    ] {
        let body = json!({ "amount": amount, "reference": "OR-1001" });
        let response = app(offline_state(&uploads))
            .oneshot(json_request("POST", "/api/enrollments/5/payments", Some(&accounting), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["field"], "amount");
        assert_eq!(body["error"], error);
    }
}

#[tokio::test]
async fn quote_prices_without_touching_the_store() {
    let uploads = tempfile::tempdir().unwrap();
    let student = bearer(7, Role::Student);
    let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
    let request = json!({
        "description": "Needed for a scholarship application",
        "date": today,
        "yearGraduated": 2020,
        "gradeStrandCourse": "BS Information Technology",
        "levelAttended": ["COLLEGE"],
        "academicCredentials": ["DIPLOMA", "TRANSCRIPT OF RECORDS"],
        "certification": ["GOOD MORAL CHARACTER"]
    });

    let response = app(offline_state(&uploads))
        .oneshot(json_request("POST", "/api/document-requests/quote", Some(&student), Some(request)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["doc_type"], "Academic Credentials, Certification");
    assert_eq!(body["data"]["document_price"], "900.00");
}
