// handlers/protected/mod.rs - /api/* endpoints behind jwt_auth_middleware.
// Every handler receives the caller as `Extension<Principal>`; role checks
// happen in the services.
pub mod documents;
pub mod enrollments;
pub mod grades;
pub mod tor;
