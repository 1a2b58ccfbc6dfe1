use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::SecurityConfig;
use crate::handlers::{protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::state::AppState;

/// Full application router: public endpoints plus the JWT-protected `/api` tree
pub fn app(state: AppState) -> Router {
    let max_body = state.config.api.max_request_size_bytes;
    let cors = cors_layer(&state.config.security);

    Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .merge(api_routes(state.clone()))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes(state: AppState) -> Router<AppState> {
    use protected::{documents, enrollments, grades, tor};

    Router::new()
        // Enrollment lifecycle
        .route("/api/enrollments", post(enrollments::submit))
        .route("/api/enrollments/:id", get(enrollments::show))
        .route("/api/enrollments/:id/verify", post(enrollments::verify))
        .route("/api/enrollments/:id/assess", post(enrollments::assess))
        .route("/api/enrollments/:id/reject", post(enrollments::reject))
        .route("/api/enrollments/:id/clear", post(enrollments::clear))
        .route(
            "/api/enrollments/:id/payments",
            get(enrollments::list_payments).post(enrollments::record_payment),
        )
        // Grade approval chain
        .route("/api/classes/:program_course_id/:class_assignment_id/grades", put(grades::submit))
        .route("/api/classes/:program_course_id/:class_assignment_id/approve", post(grades::approve))
        .route("/api/classes/:program_course_id/:class_assignment_id/reject", post(grades::reject))
        .route("/api/approvals", get(grades::queue))
        .route("/api/students/:id/grades/final", get(grades::final_grades))
        // Transferee credit evaluation
        .route("/api/tor/:id", get(tor::show))
        .route("/api/tor/:id/evaluation", get(tor::evaluation))
        .route("/api/tor/:id/equivalencies", post(tor::submit_equivalencies))
        .route("/api/tor/:id/required-courses", post(tor::assign_required_course))
        .route("/api/tor/:id/decision", post(tor::decide))
        // Document requests
        .route("/api/document-requests", get(documents::list).post(documents::create))
        .route("/api/document-requests/quote", post(documents::quote))
        .route("/api/document-requests/:id/status", post(documents::update_status))
        .route_layer(middleware::from_fn_with_state(state, jwt_auth_middleware))
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if !security.enable_cors {
        return CorsLayer::new();
    }
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}
