//! Schedule repository.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::infrastructure::ports::RepoError;
use storyforge_domain::{ProjectId, Schedule, ScheduleId, ScheduleStatus};

#[derive(Clone)]
pub struct ScheduleRepo {
    pool: SqlitePool,
}

impl ScheduleRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, schedule: &Schedule) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO schedules
                (id, project_id, time_of_day, chapters_per_run, status, next_run_at, last_run_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(schedule.id.to_string())
        .bind(schedule.project_id.to_string())
        .bind(&schedule.time_of_day)
        .bind(schedule.chapters_per_run)
        .bind(schedule.status.as_str())
        .bind(schedule.next_run_at)
        .bind(schedule.last_run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update(&self, schedule: &Schedule) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE schedules
            SET time_of_day = ?, chapters_per_run = ?, status = ?, next_run_at = ?, last_run_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&schedule.time_of_day)
        .bind(schedule.chapters_per_run)
        .bind(schedule.status.as_str())
        .bind(schedule.next_run_at)
        .bind(schedule.last_run_at)
        .bind(schedule.id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Schedule", schedule.id));
        }
        Ok(())
    }

    pub async fn get(&self, id: ScheduleId) -> Result<Option<Schedule>, RepoError> {
        let row = sqlx::query("SELECT * FROM schedules WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_schedule).transpose()
    }

    pub async fn delete(&self, id: ScheduleId) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Schedule", id));
        }
        Ok(())
    }

    /// Active schedules due at or before `now`, capped for one tick.
    pub async fn due(&self, now: DateTime<Utc>, cap: usize) -> Result<Vec<Schedule>, RepoError> {
        let rows = sqlx::query(
            "SELECT * FROM schedules WHERE status = 'active' AND next_run_at <= ? ORDER BY next_run_at LIMIT ?",
        )
        .bind(now)
        .bind(cap as u32)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_schedule).collect()
    }
}

fn row_to_schedule(row: sqlx::sqlite::SqliteRow) -> Result<Schedule, RepoError> {
    let id: String = row.try_get("id")?;
    let project: String = row.try_get("project_id")?;
    let status: String = row.try_get("status")?;
    let next_run_at: DateTime<Utc> = row.try_get("next_run_at")?;
    let last_run_at: Option<DateTime<Utc>> = row.try_get("last_run_at")?;

    Ok(Schedule {
        id: id
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad schedule id '{id}'")))?,
        project_id: project
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad project id '{project}'")))?,
        time_of_day: row.try_get("time_of_day")?,
        chapters_per_run: row.try_get("chapters_per_run")?,
        status: status
            .parse::<ScheduleStatus>()
            .map_err(|e| RepoError::serialization(e.to_string()))?,
        next_run_at,
        last_run_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::connection::Database;

    async fn repo() -> ScheduleRepo {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        ScheduleRepo::new(db.pool().clone())
    }

    #[tokio::test]
    async fn due_respects_status_and_time() {
        let repo = repo().await;
        let now = Utc::now();

        let mut due_schedule =
            Schedule::new(ProjectId::new(), "06:00", 2, now).expect("schedule");
        due_schedule.next_run_at = now - chrono::Duration::minutes(5);
        repo.insert(&due_schedule).await.expect("insert");

        let mut paused = Schedule::new(ProjectId::new(), "06:00", 1, now).expect("schedule");
        paused.next_run_at = now - chrono::Duration::minutes(5);
        paused.status = ScheduleStatus::Paused;
        repo.insert(&paused).await.expect("insert");

        let due = repo.due(now, 10).await.expect("due");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, due_schedule.id);
    }

    #[tokio::test]
    async fn delete_missing_errors() {
        let repo = repo().await;
        assert!(repo.delete(ScheduleId::new()).await.is_err());
    }
}
