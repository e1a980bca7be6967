//! Schedule API routes.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::project_routes::{owned_project, parse_project_id};
use super::{authenticate, ApiError};
use crate::infrastructure::error::FactoryError;
use crate::infrastructure::state::AppState;
use storyforge_domain::{Schedule, ScheduleId, ScheduleStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleDto {
    pub project_id: String,
    /// "HH:MM", UTC.
    pub time_of_day: String,
    pub chapters_per_run: u32,
    #[serde(default)]
    pub start_now: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleDto {
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDto {
    pub id: String,
    pub project_id: String,
    pub time_of_day: String,
    pub chapters_per_run: u32,
    pub status: String,
    pub next_run_at: String,
}

impl From<Schedule> for ScheduleDto {
    fn from(s: Schedule) -> Self {
        Self {
            id: s.id.to_string(),
            project_id: s.project_id.to_string(),
            time_of_day: s.time_of_day,
            chapters_per_run: s.chapters_per_run,
            status: s.status.as_str().to_string(),
            next_run_at: s.next_run_at.to_rfc3339(),
        }
    }
}

pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateScheduleDto>,
) -> Result<(StatusCode, Json<ScheduleDto>), ApiError> {
    let owner = authenticate(&headers)?;
    let project_id = parse_project_id(&req.project_id)?;
    owned_project(&state, project_id, owner).await?;

    let mut schedule = Schedule::new(
        project_id,
        req.time_of_day,
        req.chapters_per_run,
        Utc::now(),
    )
    .map_err(FactoryError::from)?;
    if req.start_now {
        schedule.next_run_at = Utc::now();
    }
    state.schedules.insert(&schedule).await?;
    Ok((StatusCode::CREATED, Json(ScheduleDto::from(schedule))))
}

pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateScheduleDto>,
) -> Result<Json<ScheduleDto>, ApiError> {
    let owner = authenticate(&headers)?;
    let schedule_id = parse_schedule_id(&id)?;
    let mut schedule = state
        .schedules
        .get(schedule_id)
        .await?
        .ok_or_else(|| ApiError(FactoryError::not_found("Schedule", schedule_id)))?;
    owned_project(&state, schedule.project_id, owner).await?;

    schedule.status = match req.status.as_str() {
        "active" => ScheduleStatus::Active,
        "paused" => ScheduleStatus::Paused,
        other => {
            return Err(ApiError(FactoryError::ValidationFailed(format!(
                "unknown schedule status '{other}'"
            ))))
        }
    };
    state.schedules.update(&schedule).await?;
    Ok(Json(ScheduleDto::from(schedule)))
}

pub async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let owner = authenticate(&headers)?;
    let schedule_id = parse_schedule_id(&id)?;
    let schedule = state
        .schedules
        .get(schedule_id)
        .await?
        .ok_or_else(|| ApiError(FactoryError::not_found("Schedule", schedule_id)))?;
    owned_project(&state, schedule.project_id, owner).await?;

    state.schedules.delete(schedule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_schedule_id(raw: &str) -> Result<ScheduleId, ApiError> {
    raw.parse::<ScheduleId>()
        .map_err(|_| ApiError(FactoryError::ValidationFailed("invalid schedule id".to_string())))
}
