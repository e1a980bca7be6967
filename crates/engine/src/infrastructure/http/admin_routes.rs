//! Operational admin routes: scheduler tick and RAG reindex.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::project_routes::{owned_project, parse_project_id};
use super::{authenticate, ok_json, ApiError};
use crate::infrastructure::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexDto {
    pub project_id: String,
}

/// Process due schedules once. Returns `{processed, chaptersCreated}`.
pub async fn scheduler_tick(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    authenticate(&headers)?;
    let result = state.scheduler.tick().await?;
    Ok(ok_json(result))
}

/// Rebuild the retrieval index for a project from its stored chapters.
pub async fn rag_reindex(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ReindexDto>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let owner = authenticate(&headers)?;
    let project_id = parse_project_id(&req.project_id)?;
    let project = owned_project(&state, project_id, owner).await?;

    let mut chapters = Vec::new();
    for number in 1..=project.current_chapter {
        if let Some(chapter) = state.chapters.get_by_number(project_id, number).await? {
            chapters.push((number, chapter.content));
        }
    }
    let chunks = state
        .runner
        .rag
        .reindex(project_id, &chapters)
        .await
        .map_err(crate::infrastructure::error::FactoryError::from)?;

    Ok(ok_json(serde_json::json!({
        "chapters": chapters.len(),
        "chunks": chunks,
    })))
}
