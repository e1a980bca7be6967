//! World bible, plot arcs and summary storage.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::infrastructure::ports::RepoError;
use storyforge_domain::{ArcStatus, ArcTheme, ProjectId, StoryArc, WorldBible};

#[derive(Clone)]
pub struct WorldRepo {
    pool: SqlitePool,
}

impl WorldRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // -------------------------------------------------------------------------
    // World bible (one JSON document per project)
    // -------------------------------------------------------------------------

    pub async fn upsert_world_bible(&self, bible: &WorldBible) -> Result<(), RepoError> {
        let data = serde_json::to_string(bible).map_err(RepoError::serialization)?;
        sqlx::query(
            r#"
            INSERT INTO world_state (project_id, data, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (project_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(bible.project_id.to_string())
        .bind(data)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_world_bible(&self, project: ProjectId) -> Result<Option<WorldBible>, RepoError> {
        let row = sqlx::query("SELECT data FROM world_state WHERE project_id = ?")
            .bind(project.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let data: String = r.try_get("data")?;
            serde_json::from_str(&data).map_err(|e| RepoError::serialization(e.to_string()))
        })
        .transpose()
    }

    // -------------------------------------------------------------------------
    // Plot arcs
    // -------------------------------------------------------------------------

    pub async fn insert_arc(&self, arc: &StoryArc) -> Result<(), RepoError> {
        let curve = serde_json::to_string(&arc.tension_curve).map_err(RepoError::serialization)?;
        sqlx::query(
            r#"
            INSERT INTO plot_arcs
                (id, project_id, number, title, theme, start_chapter, end_chapter,
                 climax_chapter, tension_curve, status, summary)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(arc.id.to_string())
        .bind(arc.project_id.to_string())
        .bind(arc.number)
        .bind(&arc.title)
        .bind(arc.theme.as_str())
        .bind(arc.start_chapter)
        .bind(arc.end_chapter)
        .bind(arc.climax_chapter)
        .bind(curve)
        .bind(arc.status.as_str())
        .bind(&arc.summary)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_arcs(&self, project: ProjectId) -> Result<Vec<StoryArc>, RepoError> {
        let rows = sqlx::query("SELECT * FROM plot_arcs WHERE project_id = ? ORDER BY number")
            .bind(project.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_arc).collect()
    }

    /// The arc containing the given chapter, if planned.
    pub async fn arc_for_chapter(
        &self,
        project: ProjectId,
        chapter: u32,
    ) -> Result<Option<StoryArc>, RepoError> {
        let row = sqlx::query(
            "SELECT * FROM plot_arcs WHERE project_id = ? AND start_chapter <= ? AND end_chapter >= ?",
        )
        .bind(project.to_string())
        .bind(chapter)
        .bind(chapter)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_arc).transpose()
    }

    pub async fn update_arc_status(
        &self,
        project: ProjectId,
        number: u32,
        status: ArcStatus,
        summary: Option<&str>,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE plot_arcs SET status = ?, summary = COALESCE(?, summary) WHERE project_id = ? AND number = ?",
        )
        .bind(status.as_str())
        .bind(summary)
        .bind(project.to_string())
        .bind(number)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Chapter summaries (rolling memory)
    // -------------------------------------------------------------------------

    pub async fn upsert_chapter_summary(
        &self,
        project: ProjectId,
        chapter: u32,
        summary: &str,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO chapter_summaries (project_id, chapter_number, summary)
            VALUES (?, ?, ?)
            ON CONFLICT (project_id, chapter_number) DO UPDATE SET summary = excluded.summary
            "#,
        )
        .bind(project.to_string())
        .bind(chapter)
        .bind(summary)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recent `count` chapter summaries at or before `chapter`,
    /// oldest first.
    pub async fn recent_summaries(
        &self,
        project: ProjectId,
        chapter: u32,
        count: u32,
    ) -> Result<Vec<(u32, String)>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT chapter_number, summary FROM chapter_summaries
            WHERE project_id = ? AND chapter_number <= ?
            ORDER BY chapter_number DESC LIMIT ?
            "#,
        )
        .bind(project.to_string())
        .bind(chapter)
        .bind(count)
        .fetch_all(&self.pool)
        .await?;
        let mut summaries: Vec<(u32, String)> = rows
            .into_iter()
            .map(|r| {
                Ok::<_, RepoError>((r.try_get::<u32, _>("chapter_number")?, r.try_get("summary")?))
            })
            .collect::<Result<_, _>>()?;
        summaries.reverse();
        Ok(summaries)
    }

    pub async fn delete_chapter_summary(
        &self,
        project: ProjectId,
        chapter: u32,
    ) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM chapter_summaries WHERE project_id = ? AND chapter_number = ?")
            .bind(project.to_string())
            .bind(chapter)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_arc(row: sqlx::sqlite::SqliteRow) -> Result<StoryArc, RepoError> {
    let id: String = row.try_get("id")?;
    let project: String = row.try_get("project_id")?;
    let theme: String = row.try_get("theme")?;
    let status: String = row.try_get("status")?;
    let curve: String = row.try_get("tension_curve")?;

    Ok(StoryArc {
        id: id
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad arc id '{id}'")))?,
        project_id: project
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad project id '{project}'")))?,
        number: row.try_get("number")?,
        title: row.try_get("title")?,
        theme: theme
            .parse::<ArcTheme>()
            .map_err(|e| RepoError::serialization(e.to_string()))?,
        start_chapter: row.try_get("start_chapter")?,
        end_chapter: row.try_get("end_chapter")?,
        climax_chapter: row.try_get("climax_chapter")?,
        tension_curve: serde_json::from_str(&curve)
            .map_err(|e| RepoError::serialization(e.to_string()))?,
        status: status
            .parse::<ArcStatus>()
            .map_err(|e| RepoError::serialization(e.to_string()))?,
        summary: row.try_get("summary")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::connection::Database;

    async fn repo() -> WorldRepo {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        WorldRepo::new(db.pool().clone())
    }

    #[tokio::test]
    async fn arc_lookup_by_chapter() {
        let repo = repo().await;
        let project = ProjectId::new();
        let arc = StoryArc::new(project, 1, "Khởi Đầu", ArcTheme::Foundation, 1, 20).expect("arc");
        repo.insert_arc(&arc).await.expect("insert");

        let found = repo.arc_for_chapter(project, 7).await.expect("query");
        assert_eq!(found.map(|a| a.number), Some(1));
        let missing = repo.arc_for_chapter(project, 21).await.expect("query");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn recent_summaries_are_oldest_first_and_bounded() {
        let repo = repo().await;
        let project = ProjectId::new();
        for ch in 1..=5u32 {
            repo.upsert_chapter_summary(project, ch, &format!("tóm tắt {ch}"))
                .await
                .expect("upsert");
        }

        let recent = repo.recent_summaries(project, 5, 3).await.expect("query");
        assert_eq!(
            recent.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            vec![3, 4, 5]
        );
    }

    #[tokio::test]
    async fn summary_upsert_overwrites() {
        let repo = repo().await;
        let project = ProjectId::new();
        repo.upsert_chapter_summary(project, 1, "cũ").await.expect("first");
        repo.upsert_chapter_summary(project, 1, "mới").await.expect("second");

        let recent = repo.recent_summaries(project, 1, 10).await.expect("query");
        assert_eq!(recent, vec![(1, "mới".to_string())]);
    }
}
