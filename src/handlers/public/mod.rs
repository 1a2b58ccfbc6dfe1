// handlers/public/mod.rs - endpoints that need no authentication
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::DatabaseManager;
use crate::state::AppState;

/// GET / - service banner and endpoint index
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Registrar API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "enrollments": "/api/enrollments[/:id[/verify|assess|reject|clear|payments]]",
                "grades": "/api/classes/:program_course/:class/{grades,approve,reject}",
                "approvals": "/api/approvals",
                "final_grades": "/api/students/:id/grades/final",
                "tor": "/api/tor/:id[/evaluation|equivalencies|required-courses|decision]",
                "documents": "/api/document-requests[/quote|/:id/status]"
            }
        }
    }))
}

/// GET /health - database connectivity probe
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}
