//! Job API routes: start, poll, stop.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::project_routes::{owned_project, parse_project_id};
use super::{authenticate, ok_json, ApiError};
use crate::infrastructure::error::FactoryError;
use crate::infrastructure::state::AppState;
use storyforge_domain::{Job, JobId};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartJobDto {
    pub project_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDto {
    pub id: String,
    pub project_id: String,
    pub chapter_number: u32,
    pub status: String,
    pub progress: u8,
    pub step: String,
    pub error: Option<String>,
    pub result_chapter_id: Option<String>,
}

impl From<Job> for JobDto {
    fn from(job: Job) -> Self {
        Self {
            id: job.id.to_string(),
            project_id: job.project_id.to_string(),
            chapter_number: job.chapter_number,
            status: job.status.as_str().to_string(),
            progress: job.progress,
            step: job.step,
            error: job.error,
            result_chapter_id: job.result_chapter_id.map(|id| id.to_string()),
        }
    }
}

/// Start a background chapter job; poll `/jobs/{id}` for status.
pub async fn start_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<StartJobDto>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let owner = authenticate(&headers)?;
    let project_id = parse_project_id(&req.project_id)?;
    owned_project(&state, project_id, owner).await?;

    let job_id = state.runner.start_chapter_job(project_id);
    Ok(ok_json(serde_json::json!({"jobId": job_id.to_string()})))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<JobDto>, ApiError> {
    let owner = authenticate(&headers)?;
    let job_id = parse_job_id(&id)?;
    let job = state
        .jobs
        .get(job_id)
        .await?
        .ok_or_else(|| ApiError(FactoryError::not_found("Job", job_id)))?;
    owned_project(&state, job.project_id, owner).await?;
    Ok(Json(JobDto::from(job)))
}

pub async fn stop_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let owner = authenticate(&headers)?;
    let job_id = parse_job_id(&id)?;
    let job = state
        .jobs
        .get(job_id)
        .await?
        .ok_or_else(|| ApiError(FactoryError::not_found("Job", job_id)))?;
    owned_project(&state, job.project_id, owner).await?;

    state.runner.stop_job(job_id).await?;
    Ok(ok_json(serde_json::json!({"stopping": true})))
}

pub async fn list_project_jobs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<JobDto>>, ApiError> {
    let owner = authenticate(&headers)?;
    let project_id = parse_project_id(&id)?;
    owned_project(&state, project_id, owner).await?;

    let jobs = state.jobs.recent_for_project(project_id, 20).await?;
    Ok(Json(jobs.into_iter().map(JobDto::from).collect()))
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse::<JobId>()
        .map_err(|_| ApiError(FactoryError::ValidationFailed("invalid job id".to_string())))
}
