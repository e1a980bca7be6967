//! Beat usage repository. Arc budgets are derived from usage counts.

use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::infrastructure::ports::RepoError;
use storyforge_domain::{ArcBeatBudget, BeatEntry, BeatType, ProjectId};

#[derive(Clone)]
pub struct BeatRepo {
    pool: SqlitePool,
}

impl BeatRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &BeatEntry) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO beat_usage
                (id, project_id, chapter_number, arc_number, beat_type, intensity, cooldown_until)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.project_id.to_string())
        .bind(entry.chapter_number)
        .bind(entry.arc_number)
        .bind(entry.beat_type.as_str())
        .bind(entry.intensity)
        .bind(entry.cooldown_until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(&self, project: ProjectId) -> Result<Vec<BeatEntry>, RepoError> {
        let rows = sqlx::query(
            "SELECT * FROM beat_usage WHERE project_id = ? ORDER BY chapter_number",
        )
        .bind(project.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_entry).collect()
    }

    /// The latest entry per beat type whose cooldown still covers `chapter`.
    pub async fn cooling_down(
        &self,
        project: ProjectId,
        chapter: u32,
    ) -> Result<Vec<BeatEntry>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM beat_usage
            WHERE project_id = ? AND chapter_number < ? AND cooldown_until > ?
            ORDER BY chapter_number
            "#,
        )
        .bind(project.to_string())
        .bind(chapter)
        .bind(chapter)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_entry).collect()
    }

    /// Remaining budget per beat type for one arc, computed from usage.
    pub async fn arc_budgets(
        &self,
        project: ProjectId,
        arc_number: u32,
    ) -> Result<Vec<ArcBeatBudget>, RepoError> {
        let rows = sqlx::query(
            "SELECT beat_type, COUNT(*) as used FROM beat_usage WHERE project_id = ? AND arc_number = ? GROUP BY beat_type",
        )
        .bind(project.to_string())
        .bind(arc_number)
        .fetch_all(&self.pool)
        .await?;

        let mut budgets: Vec<ArcBeatBudget> = BeatType::ALL
            .iter()
            .map(|b| ArcBeatBudget::new(arc_number, *b))
            .collect();
        for row in rows {
            let type_str: String = row.try_get("beat_type")?;
            let used: u32 = row.try_get("used")?;
            let beat = BeatType::from_str(&type_str)
                .map_err(|e| RepoError::serialization(e.to_string()))?;
            if let Some(budget) = budgets.iter_mut().find(|b| b.beat_type == beat) {
                budget.used = used;
            }
        }
        Ok(budgets)
    }

    /// Drop entries recorded by the given chapter (rollback).
    pub async fn delete_for_chapter(
        &self,
        project: ProjectId,
        chapter: u32,
    ) -> Result<u64, RepoError> {
        let result =
            sqlx::query("DELETE FROM beat_usage WHERE project_id = ? AND chapter_number = ?")
                .bind(project.to_string())
                .bind(chapter)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_entry(row: sqlx::sqlite::SqliteRow) -> Result<BeatEntry, RepoError> {
    let id: String = row.try_get("id")?;
    let project: String = row.try_get("project_id")?;
    let beat: String = row.try_get("beat_type")?;

    Ok(BeatEntry {
        id: id
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad beat id '{id}'")))?,
        project_id: project
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad project id '{project}'")))?,
        chapter_number: row.try_get("chapter_number")?,
        arc_number: row.try_get("arc_number")?,
        beat_type: BeatType::from_str(&beat)
            .map_err(|e| RepoError::serialization(e.to_string()))?,
        intensity: row.try_get("intensity")?,
        cooldown_until: row.try_get("cooldown_until")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::connection::Database;
    use storyforge_domain::PlotBeat;

    async fn repo() -> BeatRepo {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        BeatRepo::new(db.pool().clone())
    }

    #[tokio::test]
    async fn cooldown_query_matches_window() {
        let repo = repo().await;
        let project = ProjectId::new();
        let tournament = BeatType::Plot(PlotBeat::Tournament);
        repo.insert(&BeatEntry::new(project, 5, 1, tournament, 8))
            .await
            .expect("insert");

        // Chapter 12 is inside the 30-chapter cooldown.
        let blocked = repo.cooling_down(project, 12).await.expect("query");
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].beat_type, tournament);

        // Chapter 35 is past the cooldown.
        assert!(repo.cooling_down(project, 35).await.expect("query").is_empty());
    }

    #[tokio::test]
    async fn budgets_count_usage_per_arc() {
        let repo = repo().await;
        let project = ProjectId::new();
        let auction = BeatType::Plot(PlotBeat::Auction);
        repo.insert(&BeatEntry::new(project, 3, 1, auction, 5))
            .await
            .expect("insert");
        repo.insert(&BeatEntry::new(project, 9, 1, auction, 5))
            .await
            .expect("insert");

        let budgets = repo.arc_budgets(project, 1).await.expect("budgets");
        let auction_budget = budgets
            .iter()
            .find(|b| b.beat_type == auction)
            .expect("present");
        assert_eq!(auction_budget.used, 2);
        assert!(auction_budget.exhausted());

        // Other arcs are untouched.
        let arc2 = repo.arc_budgets(project, 2).await.expect("budgets");
        assert!(arc2.iter().all(|b| b.used == 0));
    }

    #[tokio::test]
    async fn rollback_removes_chapter_beats() {
        let repo = repo().await;
        let project = ProjectId::new();
        repo.insert(&BeatEntry::new(project, 5, 1, BeatType::Plot(PlotBeat::Auction), 5))
            .await
            .expect("insert");
        assert_eq!(repo.delete_for_chapter(project, 5).await.expect("del"), 1);
        assert!(repo.list(project).await.expect("list").is_empty());
    }
}
