//! Tracked item repository.

use sqlx::{Row, SqlitePool};

use crate::infrastructure::ports::RepoError;
use storyforge_domain::{ProjectId, TrackedItem, TrackedItemId};

#[derive(Clone)]
pub struct ItemRepo {
    pool: SqlitePool,
}

impl ItemRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, item: &TrackedItem) -> Result<(), RepoError> {
        let data = serde_json::to_string(item).map_err(RepoError::serialization)?;
        sqlx::query(
            r#"
            INSERT INTO tracked_items (id, project_id, name, data)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (project_id, name) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.project_id.to_string())
        .bind(&item.name)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_name(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<TrackedItem>, RepoError> {
        let row = sqlx::query("SELECT data FROM tracked_items WHERE project_id = ? AND name = ?")
            .bind(project.to_string())
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(&r)).transpose()
    }

    pub async fn list(&self, project: ProjectId) -> Result<Vec<TrackedItem>, RepoError> {
        let rows = sqlx::query("SELECT data FROM tracked_items WHERE project_id = ?")
            .bind(project.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode).collect()
    }

    pub async fn delete(&self, id: TrackedItemId) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM tracked_items WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop items first mentioned in the given chapter (rollback).
    pub async fn delete_introduced_in(
        &self,
        project: ProjectId,
        chapter: u32,
    ) -> Result<u64, RepoError> {
        let items = self.list(project).await?;
        let mut removed = 0;
        for item in items {
            if item.first_mention_chapter == chapter {
                self.delete(item.id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<TrackedItem, RepoError> {
    let data: String = row.try_get("data")?;
    serde_json::from_str(&data).map_err(|e| RepoError::serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::connection::Database;
    use storyforge_domain::ItemGrade;

    async fn repo() -> ItemRepo {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        ItemRepo::new(db.pool().clone())
    }

    #[tokio::test]
    async fn upsert_and_lookup_by_name() {
        let repo = repo().await;
        let project = ProjectId::new();
        let mut item = TrackedItem::new(
            project,
            "Huyết Ma Kiếm",
            "vũ khí",
            ItemGrade::Huyen,
            "Hàn Phong",
            10,
        );
        repo.upsert(&item).await.expect("insert");

        item.record_mention(15);
        repo.upsert(&item).await.expect("update");

        let loaded = repo
            .get_by_name(project, "Huyết Ma Kiếm")
            .await
            .expect("get")
            .expect("found");
        assert_eq!(loaded.last_mention_chapter, 15);
        assert_eq!(repo.list(project).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn rollback_removes_debut_items_only() {
        let repo = repo().await;
        let project = ProjectId::new();
        let early = TrackedItem::new(project, "Tụ Linh Đan", "đan dược", ItemGrade::Pham, "x", 4);
        let debut = TrackedItem::new(project, "Phá Thiên Thương", "vũ khí", ItemGrade::Hoang, "x", 9);
        repo.upsert(&early).await.expect("insert");
        repo.upsert(&debut).await.expect("insert");

        assert_eq!(repo.delete_introduced_in(project, 9).await.expect("del"), 1);
        let names: Vec<String> = repo
            .list(project)
            .await
            .expect("list")
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Tụ Linh Đan"]);
    }
}
