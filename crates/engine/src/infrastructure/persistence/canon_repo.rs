//! Canon fact repository.

use sqlx::{Row, SqlitePool};

use crate::infrastructure::ports::RepoError;
use storyforge_domain::{CanonCategory, CanonFact, CanonLevel, FactId, ProjectId};

#[derive(Clone)]
pub struct CanonRepo {
    pool: SqlitePool,
}

impl CanonRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, fact: &CanonFact) -> Result<(), RepoError> {
        let entities = serde_json::to_string(&fact.entities).map_err(RepoError::serialization)?;
        sqlx::query(
            r#"
            INSERT INTO canon_facts
                (id, project_id, chapter_introduced, level, category, entities,
                 statement, confidence, last_reinforced_chapter)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(fact.id.to_string())
        .bind(fact.project_id.to_string())
        .bind(fact.chapter_introduced)
        .bind(fact.level.as_str())
        .bind(fact.category.as_str())
        .bind(entities)
        .bind(&fact.statement)
        .bind(fact.confidence)
        .bind(fact.last_reinforced_chapter)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(&self, project: ProjectId) -> Result<Vec<CanonFact>, RepoError> {
        let rows = sqlx::query(
            "SELECT * FROM canon_facts WHERE project_id = ? ORDER BY chapter_introduced",
        )
        .bind(project.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_fact).collect()
    }

    pub async fn reinforce(&self, id: FactId, chapter: u32) -> Result<(), RepoError> {
        sqlx::query("UPDATE canon_facts SET last_reinforced_chapter = MAX(last_reinforced_chapter, ?) WHERE id = ?")
            .bind(chapter)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_level(&self, id: FactId, level: CanonLevel) -> Result<(), RepoError> {
        sqlx::query("UPDATE canon_facts SET level = ? WHERE id = ?")
            .bind(level.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: FactId) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM canon_facts WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop facts introduced by the given chapter (rollback on chapter
    /// deletion).
    pub async fn delete_for_chapter(
        &self,
        project: ProjectId,
        chapter: u32,
    ) -> Result<u64, RepoError> {
        let result =
            sqlx::query("DELETE FROM canon_facts WHERE project_id = ? AND chapter_introduced = ?")
                .bind(project.to_string())
                .bind(chapter)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_fact(row: sqlx::sqlite::SqliteRow) -> Result<CanonFact, RepoError> {
    let id: String = row.try_get("id")?;
    let project: String = row.try_get("project_id")?;
    let level: String = row.try_get("level")?;
    let category: String = row.try_get("category")?;
    let entities: String = row.try_get("entities")?;

    Ok(CanonFact {
        id: id
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad fact id '{id}'")))?,
        project_id: project
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad project id '{project}'")))?,
        chapter_introduced: row.try_get("chapter_introduced")?,
        level: level
            .parse::<CanonLevel>()
            .map_err(|e| RepoError::serialization(e.to_string()))?,
        category: category
            .parse::<CanonCategory>()
            .map_err(|e| RepoError::serialization(e.to_string()))?,
        entities: serde_json::from_str(&entities)
            .map_err(|e| RepoError::serialization(e.to_string()))?,
        statement: row.try_get("statement")?,
        confidence: row.try_get("confidence")?,
        last_reinforced_chapter: row.try_get("last_reinforced_chapter")?,
    })
}
