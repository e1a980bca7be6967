//! Persistent embedding cache and RAG chunk storage.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::infrastructure::ports::RepoError;
use storyforge_domain::ProjectId;

/// Days a persistent embedding cache entry lives.
pub const EMBEDDING_TTL_DAYS: i64 = 7;

/// One stored prose chunk with its vector.
#[derive(Debug, Clone)]
pub struct RagChunk {
    pub id: Uuid,
    pub project_id: ProjectId,
    pub chapter_number: u32,
    pub chunk_index: u32,
    pub content: String,
    pub vector: Vec<f32>,
}

#[derive(Clone)]
pub struct EmbeddingRepo {
    pool: SqlitePool,
}

impl EmbeddingRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // -------------------------------------------------------------------------
    // Persistent embedding cache, keyed (project_id, text_hash)
    // -------------------------------------------------------------------------

    pub async fn get_cached(
        &self,
        project: ProjectId,
        text_hash: &str,
    ) -> Result<Option<Vec<f32>>, RepoError> {
        let row = sqlx::query(
            "SELECT vector, expires_at FROM embedding_cache WHERE project_id = ? AND text_hash = ?",
        )
        .bind(project.to_string())
        .bind(text_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
        if expires_at <= Utc::now() {
            return Ok(None);
        }

        sqlx::query(
            "UPDATE embedding_cache SET hit_count = hit_count + 1 WHERE project_id = ? AND text_hash = ?",
        )
        .bind(project.to_string())
        .bind(text_hash)
        .execute(&self.pool)
        .await?;

        let vector: String = row.try_get("vector")?;
        let vector =
            serde_json::from_str(&vector).map_err(|e| RepoError::serialization(e.to_string()))?;
        Ok(Some(vector))
    }

    pub async fn put_cached(
        &self,
        project: ProjectId,
        text_hash: &str,
        model_id: &str,
        vector: &[f32],
    ) -> Result<(), RepoError> {
        let now = Utc::now();
        let vector_json = serde_json::to_string(vector).map_err(RepoError::serialization)?;
        sqlx::query(
            r#"
            INSERT INTO embedding_cache
                (project_id, text_hash, model_id, vector, hit_count, created_at, expires_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT (project_id, text_hash)
            DO UPDATE SET vector = excluded.vector, model_id = excluded.model_id,
                          expires_at = excluded.expires_at
            "#,
        )
        .bind(project.to_string())
        .bind(text_hash)
        .bind(model_id)
        .bind(vector_json)
        .bind(now)
        .bind(now + Duration::days(EMBEDDING_TTL_DAYS))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn cleanup_expired(&self) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM embedding_cache WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // -------------------------------------------------------------------------
    // RAG chunks
    // -------------------------------------------------------------------------

    pub async fn insert_chunk(&self, chunk: &RagChunk) -> Result<(), RepoError> {
        let vector = serde_json::to_string(&chunk.vector).map_err(RepoError::serialization)?;
        sqlx::query(
            r#"
            INSERT INTO rag_chunks (id, project_id, chapter_number, chunk_index, content, vector)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chunk.id.to_string())
        .bind(chunk.project_id.to_string())
        .bind(chunk.chapter_number)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(vector)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_chunks(&self, project: ProjectId) -> Result<Vec<RagChunk>, RepoError> {
        let rows = sqlx::query(
            "SELECT * FROM rag_chunks WHERE project_id = ? ORDER BY chapter_number, chunk_index",
        )
        .bind(project.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_chunk).collect()
    }

    pub async fn delete_chunks_for_chapter(
        &self,
        project: ProjectId,
        chapter: u32,
    ) -> Result<u64, RepoError> {
        let result =
            sqlx::query("DELETE FROM rag_chunks WHERE project_id = ? AND chapter_number = ?")
                .bind(project.to_string())
                .bind(chapter)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Drop every chunk of a project (rag-reindex rebuilds them).
    pub async fn delete_all_chunks(&self, project: ProjectId) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM rag_chunks WHERE project_id = ?")
            .bind(project.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_chunk(row: sqlx::sqlite::SqliteRow) -> Result<RagChunk, RepoError> {
    let id: String = row.try_get("id")?;
    let project: String = row.try_get("project_id")?;
    let vector: String = row.try_get("vector")?;

    Ok(RagChunk {
        id: Uuid::parse_str(&id)
            .map_err(|_| RepoError::serialization(format!("bad chunk id '{id}'")))?,
        project_id: project
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad project id '{project}'")))?,
        chapter_number: row.try_get("chapter_number")?,
        chunk_index: row.try_get("chunk_index")?,
        content: row.try_get("content")?,
        vector: serde_json::from_str(&vector)
            .map_err(|e| RepoError::serialization(e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::connection::Database;

    async fn repo() -> EmbeddingRepo {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        EmbeddingRepo::new(db.pool().clone())
    }

    #[tokio::test]
    async fn cache_round_trip_counts_hits() {
        let repo = repo().await;
        let project = ProjectId::new();
        repo.put_cached(project, "hash1", "embed-model", &[0.1, 0.2])
            .await
            .expect("put");

        let v = repo
            .get_cached(project, "hash1")
            .await
            .expect("get")
            .expect("cached");
        assert_eq!(v, vec![0.1, 0.2]);
        assert!(repo.get_cached(project, "hash2").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn identical_text_returns_identical_vector() {
        let repo = repo().await;
        let project = ProjectId::new();
        let vector = vec![0.25f32, -0.5, 0.125];
        repo.put_cached(project, "same", "m", &vector).await.expect("put");

        let first = repo.get_cached(project, "same").await.expect("get").expect("hit");
        let second = repo.get_cached(project, "same").await.expect("get").expect("hit");
        assert_eq!(first, second);
        assert_eq!(first, vector);
    }

    #[tokio::test]
    async fn chunks_round_trip_and_reindex_clears() {
        let repo = repo().await;
        let project = ProjectId::new();
        for i in 0..3u32 {
            repo.insert_chunk(&RagChunk {
                id: Uuid::new_v4(),
                project_id: project,
                chapter_number: 1,
                chunk_index: i,
                content: format!("đoạn {i}"),
                vector: vec![i as f32],
            })
            .await
            .expect("insert");
        }

        assert_eq!(repo.list_chunks(project).await.expect("list").len(), 3);
        assert_eq!(repo.delete_all_chunks(project).await.expect("clear"), 3);
        assert!(repo.list_chunks(project).await.expect("list").is_empty());
    }
}
