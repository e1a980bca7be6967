//! Chapter repository.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::infrastructure::ports::RepoError;
use storyforge_domain::{Chapter, ChapterId, ChapterStatus, ProjectId};

#[derive(Clone)]
pub struct ChapterRepo {
    pool: SqlitePool,
}

impl ChapterRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, chapter: &Chapter) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO chapters
                (id, project_id, number, title, content, word_count,
                 quality_score, dopamine_points, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chapter.id.to_string())
        .bind(chapter.project_id.to_string())
        .bind(chapter.number)
        .bind(&chapter.title)
        .bind(&chapter.content)
        .bind(chapter.word_count)
        .bind(chapter.quality_score)
        .bind(chapter.dopamine_points)
        .bind(chapter.status.as_str())
        .bind(chapter.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: ChapterId) -> Result<Option<Chapter>, RepoError> {
        let row = sqlx::query("SELECT * FROM chapters WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_chapter).transpose()
    }

    pub async fn get_by_number(
        &self,
        project: ProjectId,
        number: u32,
    ) -> Result<Option<Chapter>, RepoError> {
        let row = sqlx::query("SELECT * FROM chapters WHERE project_id = ? AND number = ?")
            .bind(project.to_string())
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_chapter).transpose()
    }

    /// Titles of all chapters of a project, for diversity scoring.
    pub async fn list_titles(&self, project: ProjectId) -> Result<Vec<String>, RepoError> {
        let rows = sqlx::query("SELECT title FROM chapters WHERE project_id = ? ORDER BY number")
            .bind(project.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| r.try_get("title").map_err(RepoError::from))
            .collect()
    }

    pub async fn set_status(&self, id: ChapterId, status: ChapterStatus) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE chapters SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Chapter", id));
        }
        Ok(())
    }

    /// Delete a chapter row. Tracker rollbacks are the service's concern.
    pub async fn delete(&self, id: ChapterId) -> Result<Option<Chapter>, RepoError> {
        let chapter = self.get(id).await?;
        if chapter.is_some() {
            sqlx::query("DELETE FROM chapters WHERE id = ?")
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        }
        Ok(chapter)
    }
}

fn row_to_chapter(row: sqlx::sqlite::SqliteRow) -> Result<Chapter, RepoError> {
    let id: String = row.try_get("id")?;
    let project: String = row.try_get("project_id")?;
    let status: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Chapter {
        id: id
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad chapter id '{id}'")))?,
        project_id: project
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad project id '{project}'")))?,
        number: row.try_get("number")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        word_count: row.try_get("word_count")?,
        quality_score: row.try_get("quality_score")?,
        dopamine_points: row.try_get("dopamine_points")?,
        status: status
            .parse::<ChapterStatus>()
            .map_err(|e| RepoError::serialization(e.to_string()))?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::connection::Database;

    async fn repo() -> ChapterRepo {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        ChapterRepo::new(db.pool().clone())
    }

    fn chapter(project: ProjectId, number: u32) -> Chapter {
        Chapter::new(
            project,
            number,
            format!("Chương {number}"),
            "Hàn Phong vung kiếm, khí tức trầm ổn.",
            Utc::now(),
        )
        .expect("chapter")
    }

    #[tokio::test]
    async fn insert_get_delete_round_trip() {
        let repo = repo().await;
        let project = ProjectId::new();
        let ch = chapter(project, 1);
        repo.insert(&ch).await.expect("insert");

        let loaded = repo
            .get_by_number(project, 1)
            .await
            .expect("get")
            .expect("found");
        assert_eq!(loaded.title, ch.title);

        let deleted = repo.delete(ch.id).await.expect("delete").expect("was there");
        assert_eq!(deleted.id, ch.id);
        assert!(repo.get(ch.id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn duplicate_chapter_number_rejected() {
        let repo = repo().await;
        let project = ProjectId::new();
        repo.insert(&chapter(project, 3)).await.expect("first");
        assert!(repo.insert(&chapter(project, 3)).await.is_err());
    }

    #[tokio::test]
    async fn titles_listed_in_order() {
        let repo = repo().await;
        let project = ProjectId::new();
        for n in [2u32, 1, 3] {
            repo.insert(&chapter(project, n)).await.expect("insert");
        }
        let titles = repo.list_titles(project).await.expect("titles");
        assert_eq!(titles, vec!["Chương 1", "Chương 2", "Chương 3"]);
    }
}
