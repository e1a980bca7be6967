//! Character-scoped tracker storage: consistency state, depth profiles,
//! romance progressions and power progression.
//!
//! These tables store one JSON document per character (or pair), upserted
//! on `(project_id, character_name)`.

use sqlx::{Row, SqlitePool};

use crate::infrastructure::ports::RepoError;
use storyforge_domain::{
    CharacterDepthProfile, CharacterState, PowerState, ProgressionEvent, ProjectId,
    RomanceProgression,
};

#[derive(Clone)]
pub struct CharacterRepo {
    pool: SqlitePool,
}

impl CharacterRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // -------------------------------------------------------------------------
    // Consistency state (character_tracker)
    // -------------------------------------------------------------------------

    pub async fn upsert_state(&self, state: &CharacterState) -> Result<(), RepoError> {
        let data = serde_json::to_string(state).map_err(RepoError::serialization)?;
        sqlx::query(
            r#"
            INSERT INTO character_tracker (project_id, character_name, data)
            VALUES (?, ?, ?)
            ON CONFLICT (project_id, character_name) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(state.project_id.to_string())
        .bind(&state.name)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_state(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<CharacterState>, RepoError> {
        let row = sqlx::query(
            "SELECT data FROM character_tracker WHERE project_id = ? AND character_name = ?",
        )
        .bind(project.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| decode_json(&r)).transpose()
    }

    pub async fn list_states(&self, project: ProjectId) -> Result<Vec<CharacterState>, RepoError> {
        let rows = sqlx::query("SELECT data FROM character_tracker WHERE project_id = ?")
            .bind(project.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_json).collect()
    }

    // -------------------------------------------------------------------------
    // Depth profiles
    // -------------------------------------------------------------------------

    pub async fn upsert_profile(&self, profile: &CharacterDepthProfile) -> Result<(), RepoError> {
        let data = serde_json::to_string(profile).map_err(RepoError::serialization)?;
        sqlx::query(
            r#"
            INSERT INTO character_depth_profiles (project_id, character_name, data)
            VALUES (?, ?, ?)
            ON CONFLICT (project_id, character_name) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(profile.project_id.to_string())
        .bind(&profile.name)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_profile(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<CharacterDepthProfile>, RepoError> {
        let row = sqlx::query(
            "SELECT data FROM character_depth_profiles WHERE project_id = ? AND character_name = ?",
        )
        .bind(project.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| decode_json(&r)).transpose()
    }

    pub async fn list_profiles(
        &self,
        project: ProjectId,
    ) -> Result<Vec<CharacterDepthProfile>, RepoError> {
        let rows = sqlx::query("SELECT data FROM character_depth_profiles WHERE project_id = ?")
            .bind(project.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_json).collect()
    }

    // -------------------------------------------------------------------------
    // Romance progressions
    // -------------------------------------------------------------------------

    pub async fn upsert_romance(&self, romance: &RomanceProgression) -> Result<(), RepoError> {
        let (a, b) = romance.pair_key();
        let data = serde_json::to_string(romance).map_err(RepoError::serialization)?;
        sqlx::query(
            r#"
            INSERT INTO romance_progressions (project_id, character_a, character_b, data)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (project_id, character_a, character_b) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(romance.project_id.to_string())
        .bind(a)
        .bind(b)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_romance(
        &self,
        project: ProjectId,
        character_a: &str,
        character_b: &str,
    ) -> Result<Option<RomanceProgression>, RepoError> {
        let (a, b) = if character_a <= character_b {
            (character_a, character_b)
        } else {
            (character_b, character_a)
        };
        let row = sqlx::query(
            "SELECT data FROM romance_progressions WHERE project_id = ? AND character_a = ? AND character_b = ?",
        )
        .bind(project.to_string())
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| decode_json(&r)).transpose()
    }

    pub async fn list_romances(
        &self,
        project: ProjectId,
    ) -> Result<Vec<RomanceProgression>, RepoError> {
        let rows = sqlx::query("SELECT data FROM romance_progressions WHERE project_id = ?")
            .bind(project.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_json).collect()
    }

    // -------------------------------------------------------------------------
    // Power progression
    // -------------------------------------------------------------------------

    pub async fn upsert_power(
        &self,
        state: &PowerState,
        events: &[ProgressionEvent],
    ) -> Result<(), RepoError> {
        let state_json = serde_json::to_string(state).map_err(RepoError::serialization)?;
        let events_json = serde_json::to_string(events).map_err(RepoError::serialization)?;
        sqlx::query(
            r#"
            INSERT INTO power_progression (project_id, character_name, state, events)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (project_id, character_name)
            DO UPDATE SET state = excluded.state, events = excluded.events
            "#,
        )
        .bind(state.project_id.to_string())
        .bind(&state.character_name)
        .bind(state_json)
        .bind(events_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_power(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<(PowerState, Vec<ProgressionEvent>)>, RepoError> {
        let row = sqlx::query(
            "SELECT state, events FROM power_progression WHERE project_id = ? AND character_name = ?",
        )
        .bind(project.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| {
            let state: String = r.try_get("state")?;
            let events: String = r.try_get("events")?;
            let state = serde_json::from_str(&state)
                .map_err(|e| RepoError::serialization(e.to_string()))?;
            let events = serde_json::from_str(&events)
                .map_err(|e| RepoError::serialization(e.to_string()))?;
            Ok::<_, RepoError>((state, events))
        })
        .transpose()
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<T, RepoError> {
    let data: String = row.try_get("data")?;
    serde_json::from_str(&data).map_err(|e| RepoError::serialization(e.to_string()))
}
