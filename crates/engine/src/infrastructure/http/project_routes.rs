//! Project and chapter API routes.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use super::{authenticate, ok_json, ApiError};
use crate::application::services::runner::ProjectSetup;
use crate::infrastructure::error::FactoryError;
use crate::infrastructure::state::AppState;
use storyforge_domain::{
    ChapterId, GenreType, Project, ProjectId, ProjectStatus, WorldBible,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectDto {
    pub title: String,
    pub genre: String,
    pub target_chapters: u32,
    #[serde(default = "default_chapter_words")]
    pub target_chapter_words: u32,
    #[serde(default)]
    pub chapters_per_arc: Option<u32>,
    pub protagonist_name: String,
    #[serde(default)]
    pub world_bible: Option<WorldBible>,
}

fn default_chapter_words() -> u32 {
    2500
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectDto {
    pub project_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub target_chapters: Option<u32>,
    #[serde(default)]
    pub target_chapter_words: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub writing_style: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusDto {
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDto {
    pub id: String,
    pub title: String,
    pub genre: String,
    pub target_chapters: u32,
    pub current_chapter: u32,
    pub status: String,
    pub target_chapter_words: u32,
    pub writing_style: String,
}

impl From<Project> for ProjectDto {
    fn from(p: Project) -> Self {
        Self {
            id: p.id.to_string(),
            title: p.title,
            genre: p.genre.as_str().to_string(),
            target_chapters: p.target_chapters,
            current_chapter: p.current_chapter,
            status: p.status.as_str().to_string(),
            target_chapter_words: p.target_chapter_words,
            writing_style: p.writing_style,
        }
    }
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateProjectDto>,
) -> Result<(StatusCode, Json<ProjectDto>), ApiError> {
    let owner = authenticate(&headers)?;
    let genre = GenreType::from_str(&req.genre)
        .map_err(|e| ApiError(FactoryError::ValidationFailed(e.to_string())))?;

    let project = state
        .runner
        .create_project(
            owner,
            ProjectSetup {
                title: req.title,
                genre,
                target_chapters: req.target_chapters,
                target_chapter_words: req.target_chapter_words,
                chapters_per_arc: req.chapters_per_arc,
                protagonist_name: req.protagonist_name,
                world_bible: req.world_bible,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ProjectDto::from(project))))
}

pub async fn update_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<UpdateProjectDto>,
) -> Result<Json<ProjectDto>, ApiError> {
    let owner = authenticate(&headers)?;
    let project_id = parse_project_id(&req.project_id)?;
    let mut project = owned_project(&state, project_id, owner).await?;

    if let Some(title) = req.title {
        project.title = title;
    }
    if let Some(target) = req.target_chapters {
        project.target_chapters = target;
    }
    if let Some(words) = req.target_chapter_words {
        project.target_chapter_words = words;
    }
    if let Some(temperature) = req.temperature {
        project = project.with_temperature(temperature).map_err(FactoryError::from)?;
    }
    if let Some(model_id) = req.model_id {
        project.model_id = model_id;
    }
    if let Some(style) = req.writing_style {
        project.writing_style = style;
    }

    state.projects.update(&project).await?;
    Ok(Json(ProjectDto::from(project)))
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProjectDto>>, ApiError> {
    let owner = authenticate(&headers)?;
    let projects = state.projects.list_for_owner(owner).await?;
    Ok(Json(projects.into_iter().map(ProjectDto::from).collect()))
}

pub async fn set_project_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<SetStatusDto>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let owner = authenticate(&headers)?;
    let project_id = parse_project_id(&id)?;
    owned_project(&state, project_id, owner).await?;

    let status = match req.status.as_str() {
        "active" => ProjectStatus::Idle,
        "paused" => ProjectStatus::Paused,
        "completed" => ProjectStatus::Completed,
        other => {
            return Err(ApiError(FactoryError::ValidationFailed(format!(
                "unknown status '{other}'"
            ))))
        }
    };
    state.projects.set_status(project_id, status).await?;
    Ok(ok_json(serde_json::json!({"status": status.as_str()})))
}

pub async fn delete_chapter(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let owner = authenticate(&headers)?;
    let chapter_id = id
        .parse::<ChapterId>()
        .map_err(|_| ApiError(FactoryError::ValidationFailed("invalid chapter id".to_string())))?;
    state.runner.delete_chapter(owner, chapter_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) fn parse_project_id(raw: &str) -> Result<ProjectId, ApiError> {
    raw.parse::<ProjectId>()
        .map_err(|_| ApiError(FactoryError::ValidationFailed("invalid project id".to_string())))
}

/// Load a project and verify ownership.
pub(super) async fn owned_project(
    state: &AppState,
    project_id: ProjectId,
    owner: storyforge_domain::UserId,
) -> Result<Project, ApiError> {
    let project = state
        .projects
        .get(project_id)
        .await?
        .ok_or_else(|| ApiError(FactoryError::not_found("Project", project_id)))?;
    if project.owner_id != owner {
        return Err(ApiError(FactoryError::PermissionDenied));
    }
    Ok(project)
}
