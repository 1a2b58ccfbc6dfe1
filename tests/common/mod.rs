#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, Request};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tempfile::TempDir;

use registrar_api::auth::{generate_jwt, Claims};
use registrar_api::config::AppConfig;
use registrar_api::database::DatabaseManager;
use registrar_api::storage::LocalDocumentStorage;
use registrar_api::types::{Principal, Role};
use registrar_api::AppState;

pub const JWT_SECRET: &str = "integration-test-secret";

pub fn test_config(upload_dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::development();
    config.security.jwt_secret = JWT_SECRET.to_string();
    config.workflow.upload_dir = upload_dir.to_path_buf();
    config
}

pub fn bearer(sub: i64, role: Role) -> String {
    let claims = Claims::new(sub, role, format!("{} {}", role, sub), 1);
    format!("Bearer {}", generate_jwt(&claims, JWT_SECRET).expect("token"))
}

/// State over a pool that never connects; for requests rejected before the store
pub fn offline_state(uploads: &TempDir) -> AppState {
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(250))
        .connect_lazy("postgres://registrar@127.0.0.1:1/registrar")
        .expect("lazy pool");
    let storage = Arc::new(LocalDocumentStorage::new(uploads.path()));
    AppState::new(pool, test_config(uploads.path()), storage)
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Store-backed test environment; `None` when DATABASE_URL is not set
pub struct TestDb {
    pub state: AppState,
    pub uploads: TempDir,
}

pub async fn test_db() -> Option<TestDb> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to DATABASE_URL");
    DatabaseManager::migrate(&pool).await.expect("migrations");

    let uploads = tempfile::tempdir().expect("upload dir");
    let storage = Arc::new(LocalDocumentStorage::new(uploads.path()));
    let state = AppState::new(pool, test_config(uploads.path()), storage);
    Some(TestDb { state, uploads })
}

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Name unique across test processes sharing one database
pub fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}-{}-{}-{}", prefix, std::process::id(), nanos, COUNTER.fetch_add(1, Ordering::Relaxed))
}

impl TestDb {
    pub fn pool(&self) -> &PgPool {
        &self.state.pool
    }

    pub async fn student(&self) -> Principal {
        let id: i64 = sqlx::query_scalar("INSERT INTO student (full_name) VALUES ($1) RETURNING id")
            .bind(unique("student"))
            .fetch_one(self.pool())
            .await
            .expect("student");
        Principal::new(id, Role::Student, "Student")
    }

    pub async fn program(&self) -> i64 {
        sqlx::query_scalar("INSERT INTO program (code, name) VALUES ($1, 'BS Information Technology') RETURNING id")
            .bind(unique("BSIT"))
            .fetch_one(self.pool())
            .await
            .expect("program")
    }

    pub async fn course(&self, units: i64) -> i64 {
        sqlx::query_scalar("INSERT INTO course (code, name, units) VALUES ($1, 'Course', $2) RETURNING id")
            .bind(unique("IT"))
            .bind(Decimal::from(units))
            .fetch_one(self.pool())
            .await
            .expect("course")
    }

    pub async fn program_year(&self, program_id: i64, year_level: i16) -> i64 {
        sqlx::query(
            "INSERT INTO program_year (program_id, year_level) VALUES ($1, $2)
             ON CONFLICT (program_id, year_level) DO NOTHING",
        )
        .bind(program_id)
        .bind(year_level)
        .execute(self.pool())
        .await
        .expect("program year");
        sqlx::query_scalar("SELECT id FROM program_year WHERE program_id = $1 AND year_level = $2")
            .bind(program_id)
            .bind(year_level)
            .fetch_one(self.pool())
            .await
            .expect("program year id")
    }

    pub async fn curriculum_slot(&self, program_id: i64, year_id: i64, semester: &str, course_id: i64) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO program_course (program_id, year_id, semester, course_id) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(program_id)
        .bind(year_id)
        .bind(semester)
        .bind(course_id)
        .fetch_one(self.pool())
        .await
        .expect("curriculum slot")
    }

    pub async fn class(&self, program_course_id: i64, instructor_id: i64) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO class_assignment (program_course_id, instructor_id, section) VALUES ($1, $2, 'A') RETURNING id",
        )
        .bind(program_course_id)
        .bind(instructor_id)
        .fetch_one(self.pool())
        .await
        .expect("class")
    }

    /// Drop a file into the temporary upload area; returns its relative path
    pub async fn upload(&self, name: &str) -> String {
        let relative = format!("{}-{}", unique("upload"), name);
        tokio::fs::write(self.uploads.path().join(&relative), format!("contents of {}", name))
            .await
            .expect("upload");
        relative
    }
}
