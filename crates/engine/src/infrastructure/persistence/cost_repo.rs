//! Cost tracking repository. Records are append-only; totals are
//! aggregate reads.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::infrastructure::ports::RepoError;
use storyforge_domain::{CostRecord, ProjectId, TaskKind};

#[derive(Clone)]
pub struct CostRepo {
    pool: SqlitePool,
}

impl CostRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &CostRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO cost_tracking
                (id, project_id, timestamp, model_id, task, input_tokens, output_tokens, cost_usd)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.project_id.to_string())
        .bind(record.timestamp)
        .bind(&record.model_id)
        .bind(record.task.as_str())
        .bind(record.input_tokens)
        .bind(record.output_tokens)
        .bind(record.cost_usd)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Total spend for a project since the given instant.
    pub async fn total_since(
        &self,
        project: ProjectId,
        since: DateTime<Utc>,
    ) -> Result<f64, RepoError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(cost_usd), 0.0) AS total FROM cost_tracking WHERE project_id = ? AND timestamp >= ?",
        )
        .bind(project.to_string())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("total")?)
    }

    /// Spend in the current UTC day.
    pub async fn total_today(&self, project: ProjectId) -> Result<f64, RepoError> {
        let start_of_day = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or_else(Utc::now);
        self.total_since(project, start_of_day).await
    }

    /// Spend in the rolling last hour (session budget window).
    pub async fn total_last_hour(&self, project: ProjectId) -> Result<f64, RepoError> {
        self.total_since(project, Utc::now() - Duration::hours(1)).await
    }

    pub async fn list(&self, project: ProjectId) -> Result<Vec<CostRecord>, RepoError> {
        let rows = sqlx::query(
            "SELECT * FROM cost_tracking WHERE project_id = ? ORDER BY timestamp",
        )
        .bind(project.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<CostRecord, RepoError> {
    let id: String = row.try_get("id")?;
    let project: String = row.try_get("project_id")?;
    let task: String = row.try_get("task")?;
    let timestamp: DateTime<Utc> = row.try_get("timestamp")?;

    Ok(CostRecord {
        id: id
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad record id '{id}'")))?,
        project_id: project
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad project id '{project}'")))?,
        timestamp,
        model_id: row.try_get("model_id")?,
        task: TaskKind::from_str(&task).map_err(|e| RepoError::serialization(e.to_string()))?,
        input_tokens: row.try_get("input_tokens")?,
        output_tokens: row.try_get("output_tokens")?,
        cost_usd: row.try_get("cost_usd")?,
    })
}
