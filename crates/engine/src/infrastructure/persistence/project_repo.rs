//! Project repository.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::infrastructure::ports::RepoError;
use storyforge_domain::{GenreType, Project, ProjectId, ProjectStatus, UserId};

#[derive(Clone)]
pub struct ProjectRepo {
    pool: SqlitePool,
}

impl ProjectRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, project: &Project) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO projects
                (id, owner_id, title, genre, target_chapters, chapters_per_arc,
                 current_chapter, status, model_id, temperature,
                 target_chapter_words, writing_style, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(project.id.to_string())
        .bind(project.owner_id.to_string())
        .bind(&project.title)
        .bind(project.genre.as_str())
        .bind(project.target_chapters)
        .bind(project.chapters_per_arc)
        .bind(project.current_chapter)
        .bind(project.status.as_str())
        .bind(&project.model_id)
        .bind(project.temperature)
        .bind(project.target_chapter_words)
        .bind(&project.writing_style)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: ProjectId) -> Result<Option<Project>, RepoError> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_project).transpose()
    }

    pub async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Project>, RepoError> {
        let rows = sqlx::query("SELECT * FROM projects WHERE owner_id = ? ORDER BY created_at")
            .bind(owner.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_project).collect()
    }

    pub async fn update(&self, project: &Project) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE projects
            SET title = ?, genre = ?, target_chapters = ?, chapters_per_arc = ?,
                current_chapter = ?, status = ?, model_id = ?, temperature = ?,
                target_chapter_words = ?, writing_style = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&project.title)
        .bind(project.genre.as_str())
        .bind(project.target_chapters)
        .bind(project.chapters_per_arc)
        .bind(project.current_chapter)
        .bind(project.status.as_str())
        .bind(&project.model_id)
        .bind(project.temperature)
        .bind(project.target_chapter_words)
        .bind(&project.writing_style)
        .bind(Utc::now())
        .bind(project.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Project", project.id));
        }
        Ok(())
    }

    pub async fn set_status(&self, id: ProjectId, status: ProjectStatus) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE projects SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Project", id));
        }
        Ok(())
    }

    /// Advance `current_chapter`, never moving it backwards.
    pub async fn advance_chapter(&self, id: ProjectId, chapter: u32) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE projects SET current_chapter = MAX(current_chapter, ?), updated_at = ? WHERE id = ?",
        )
        .bind(chapter)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_project(row: sqlx::sqlite::SqliteRow) -> Result<Project, RepoError> {
    let id: String = row.try_get("id")?;
    let owner: String = row.try_get("owner_id")?;
    let genre: String = row.try_get("genre")?;
    let status: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Project {
        id: id
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad project id '{id}'")))?,
        owner_id: owner
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad owner id '{owner}'")))?,
        title: row.try_get("title")?,
        genre: genre
            .parse::<GenreType>()
            .map_err(|e| RepoError::serialization(e.to_string()))?,
        target_chapters: row.try_get("target_chapters")?,
        chapters_per_arc: row.try_get("chapters_per_arc")?,
        current_chapter: row.try_get("current_chapter")?,
        status: status
            .parse::<ProjectStatus>()
            .map_err(|e| RepoError::serialization(e.to_string()))?,
        model_id: row.try_get("model_id")?,
        temperature: row.try_get("temperature")?,
        target_chapter_words: row.try_get("target_chapter_words")?,
        writing_style: row.try_get("writing_style")?,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::connection::Database;

    async fn repo() -> ProjectRepo {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        ProjectRepo::new(db.pool().clone())
    }

    fn project() -> Project {
        Project::new(
            UserId::new(),
            "Kiếm Đạo Độc Tôn",
            GenreType::TienHiep,
            100,
            2500,
            Utc::now(),
        )
        .expect("valid project")
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let repo = repo().await;
        let p = project();
        repo.insert(&p).await.expect("insert");

        let loaded = repo.get(p.id).await.expect("get").expect("found");
        assert_eq!(loaded.title, p.title);
        assert_eq!(loaded.genre, p.genre);
        assert_eq!(loaded.status, ProjectStatus::Idle);
    }

    #[tokio::test]
    async fn list_scopes_by_owner() {
        let repo = repo().await;
        let mine = project();
        let theirs = project();
        repo.insert(&mine).await.expect("insert");
        repo.insert(&theirs).await.expect("insert");

        let listed = repo.list_for_owner(mine.owner_id).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine.id);
    }

    #[tokio::test]
    async fn advance_chapter_is_monotonic() {
        let repo = repo().await;
        let p = project();
        repo.insert(&p).await.expect("insert");

        repo.advance_chapter(p.id, 5).await.expect("advance");
        repo.advance_chapter(p.id, 3).await.expect("advance");

        let loaded = repo.get(p.id).await.expect("get").expect("found");
        assert_eq!(loaded.current_chapter, 5);
    }

    #[tokio::test]
    async fn update_missing_project_errors() {
        let repo = repo().await;
        let p = project();
        assert!(repo.update(&p).await.is_err());
    }
}
