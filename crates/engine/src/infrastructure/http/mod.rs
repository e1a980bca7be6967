//! HTTP API surface (JSON, bearer-token scoped).

pub mod admin_routes;
pub mod job_routes;
pub mod project_routes;
pub mod schedule_routes;

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::infrastructure::error::FactoryError;
use crate::infrastructure::state::AppState;
use storyforge_domain::UserId;

/// Failure envelope: `{ok: false, error, message}` with a stable code.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: &'static str,
    pub message: String,
}

/// API-facing error wrapper around the engine taxonomy.
pub struct ApiError(pub FactoryError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            ok: false,
            error: self.0.code(),
            message: self.0.to_string(),
        };
        (self.0.status(), Json(body)).into_response()
    }
}

impl From<FactoryError> for ApiError {
    fn from(err: FactoryError) -> Self {
        Self(err)
    }
}

impl From<crate::infrastructure::ports::RepoError> for ApiError {
    fn from(err: crate::infrastructure::ports::RepoError) -> Self {
        Self(err.into())
    }
}

/// Resolve the bearer token to the owning user. The token is the opaque
/// user id issued by the auth frontend (out of scope here).
pub fn authenticate(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError(FactoryError::AuthRequired))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(ApiError(FactoryError::AuthRequired))?;
    token
        .trim()
        .parse::<UserId>()
        .map_err(|_| ApiError(FactoryError::AuthRequired))
}

pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Projects
        .route("/projects", post(project_routes::create_project))
        .route("/projects", put(project_routes::update_project))
        .route("/projects", get(project_routes::list_projects))
        .route(
            "/projects/{id}/status",
            patch(project_routes::set_project_status),
        )
        .route("/projects/{id}/jobs", get(job_routes::list_project_jobs))
        // Jobs
        .route("/jobs", post(job_routes::start_job))
        .route("/jobs/{id}", get(job_routes::get_job))
        .route("/jobs/{id}/stop", post(job_routes::stop_job))
        // Schedules
        .route("/schedules", post(schedule_routes::create_schedule))
        .route("/schedules/{id}", patch(schedule_routes::update_schedule))
        .route("/schedules/{id}", delete(schedule_routes::delete_schedule))
        // Chapters
        .route("/chapters/{id}", delete(project_routes::delete_chapter))
        // Admin operations
        .route("/admin/scheduler-tick", post(admin_routes::scheduler_tick))
        .route("/admin/rag-reindex", post(admin_routes::rag_reindex))
}

/// Shorthand for handlers returning `{ok: true, ...payload}`.
pub fn ok_json<T: Serialize>(payload: T) -> (StatusCode, Json<serde_json::Value>) {
    let mut value = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
    if let serde_json::Value::Object(map) = &mut value {
        map.insert("ok".to_string(), serde_json::Value::Bool(true));
    }
    (StatusCode::OK, Json(value))
}
