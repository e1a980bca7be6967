//! Job repository: lifecycle rows plus crash recovery and retention cleanup.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

use crate::infrastructure::ports::RepoError;
use storyforge_domain::{Job, JobId, JobStatus, ProjectId};

#[derive(Clone)]
pub struct JobRepo {
    pool: SqlitePool,
}

impl JobRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, job: &Job) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO jobs
                (id, project_id, chapter_number, status, progress, step, error,
                 result_chapter_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.project_id.to_string())
        .bind(job.chapter_number)
        .bind(job.status.as_str())
        .bind(job.progress)
        .bind(&job.step)
        .bind(&job.error)
        .bind(job.result_chapter_id.map(|id| id.to_string()))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update(&self, job: &Job) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, progress = ?, step = ?, error = ?,
                result_chapter_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.progress)
        .bind(&job.step)
        .bind(&job.error)
        .bind(job.result_chapter_id.map(|id| id.to_string()))
        .bind(Utc::now())
        .bind(job.id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Job", job.id));
        }
        Ok(())
    }

    pub async fn get(&self, id: JobId) -> Result<Option<Job>, RepoError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_job).transpose()
    }

    pub async fn recent_for_project(
        &self,
        project: ProjectId,
        limit: u32,
    ) -> Result<Vec<Job>, RepoError> {
        let rows = sqlx::query(
            "SELECT * FROM jobs WHERE project_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(project.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_job).collect()
    }

    /// Move any job left `running` by a dead process to `failed`.
    /// Called once on startup; the project's `current_chapter` remains
    /// authoritative and the user may restart.
    pub async fn fail_orphaned_running(&self) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'failed', error = 'processCrash', updated_at = ? WHERE status = 'running'",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Remove terminal jobs older than the retention window.
    pub async fn cleanup(&self, retention_hours: u64) -> Result<u64, RepoError> {
        let cutoff = Utc::now() - Duration::hours(retention_hours as i64);
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status IN ('completed', 'failed', 'stopped') AND updated_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<Job, RepoError> {
    let id: String = row.try_get("id")?;
    let project: String = row.try_get("project_id")?;
    let status: String = row.try_get("status")?;
    let result_chapter: Option<String> = row.try_get("result_chapter_id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Job {
        id: id
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad job id '{id}'")))?,
        project_id: project
            .parse()
            .map_err(|_| RepoError::serialization(format!("bad project id '{project}'")))?,
        chapter_number: row.try_get("chapter_number")?,
        status: status
            .parse::<JobStatus>()
            .map_err(|e| RepoError::serialization(e.to_string()))?,
        progress: row.try_get("progress")?,
        step: row.try_get("step")?,
        error: row.try_get("error")?,
        result_chapter_id: result_chapter
            .map(|s| {
                s.parse()
                    .map_err(|_| RepoError::serialization(format!("bad chapter id '{s}'")))
            })
            .transpose()?,
        created_at,
        updated_at,
    })
}
