//! Consistency issue repository.

use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::infrastructure::ports::RepoError;
use storyforge_domain::{ConsistencyIssue, IssueKind, IssueSeverity, ProjectId};

#[derive(Clone)]
pub struct IssueRepo {
    pool: SqlitePool,
}

impl IssueRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, issue: &ConsistencyIssue) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO consistency_issues
                (id, project_id, chapter_number, kind, severity, description, fragment, suggested_fix)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(issue.id.to_string())
        .bind(issue.project_id.to_string())
        .bind(issue.chapter_number)
        .bind(issue.kind.as_str())
        .bind(issue.severity.as_str())
        .bind(&issue.description)
        .bind(&issue.fragment)
        .bind(&issue.suggested_fix)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_chapter(
        &self,
        project: ProjectId,
        chapter: u32,
    ) -> Result<Vec<ConsistencyIssue>, RepoError> {
        let rows = sqlx::query(
            "SELECT * FROM consistency_issues WHERE project_id = ? AND chapter_number = ?",
        )
        .bind(project.to_string())
        .bind(chapter)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_issue).collect()
    }

    pub async fn delete_for_chapter(
        &self,
        project: ProjectId,
        chapter: u32,
    ) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "DELETE FROM consistency_issues WHERE project_id = ? AND chapter_number = ?",
        )
        .bind(project.to_string())
        .bind(chapter)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_issue(row: sqlx::sqlite::SqliteRow) -> Result<ConsistencyIssue, RepoError> {
    let id: String = row.try_get("id")?;
    let project: String = row.try_get("project_id")?;
    let kind: String = row.try_get("kind")?;
    let severity: String = row.try_get("severity")?;

    let kind = match kind.as_str() {
        "dead_character_appearance" => IssueKind::DeadCharacterAppearance,
        "power_level_jump" => IssueKind::PowerLevelJump,
        "relationship_violation" => IssueKind::RelationshipViolation,
        "trait_contradiction" => IssueKind::TraitContradiction,
        "canon_conflict" => IssueKind::CanonConflict,
        other => {
            return Err(RepoError::serialization(format!(
                "unknown issue kind '{other}'"
            )))
        }
    };

    Ok(ConsistencyIssue {
        id: id
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad issue id '{id}'")))?,
        project_id: project
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad project id '{project}'")))?,
        chapter_number: row.try_get("chapter_number")?,
        kind,
        severity: IssueSeverity::from_str(&severity)
            .map_err(|e| RepoError::serialization(e.to_string()))?,
        description: row.try_get("description")?,
        fragment: row.try_get("fragment")?,
        suggested_fix: row.try_get("suggested_fix")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::connection::Database;

    #[tokio::test]
    async fn round_trip_and_rollback() {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        let repo = IssueRepo::new(db.pool().clone());
        let project = ProjectId::new();

        let issue = ConsistencyIssue::new(
            project,
            10,
            IssueKind::DeadCharacterAppearance,
            IssueSeverity::Critical,
            "Vương Hổ xuất hiện sau khi chết",
        )
        .with_fragment("Vương Hổ cười lạnh");
        repo.insert(&issue).await.expect("insert");

        let listed = repo.list_for_chapter(project, 10).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].severity, IssueSeverity::Critical);
        assert_eq!(listed[0].fragment.as_deref(), Some("Vương Hổ cười lạnh"));

        assert_eq!(repo.delete_for_chapter(project, 10).await.expect("del"), 1);
        assert!(repo.list_for_chapter(project, 10).await.expect("list").is_empty());
    }
}
