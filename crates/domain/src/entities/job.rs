//! Chapter job entity - one background generation run, observable by polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{ChapterId, JobId, ProjectId};

/// Job lifecycle states. Terminal states are `Completed`, `Failed`, `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "stopped" => Ok(Self::Stopped),
            other => Err(DomainError::parse(format!("Unknown job status: '{other}'"))),
        }
    }
}

/// A background chapter-generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub project_id: ProjectId,
    pub chapter_number: u32,
    pub status: JobStatus,
    /// Progress in percent, reported after each agent step.
    pub progress: u8,
    /// Human-readable step message ("architect", "writer", ...).
    pub step: String,
    pub error: Option<String>,
    /// Chapter produced on success.
    pub result_chapter_id: Option<ChapterId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(project_id: ProjectId, chapter_number: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            project_id,
            chapter_number,
            status: JobStatus::Pending,
            progress: 0,
            step: "queued".to_string(),
            error: None,
            result_chapter_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validated state transition. Only the transitions of the job state
    /// machine (`pending → running → {completed, failed, stopped}`, plus
    /// `pending → stopped` for jobs cancelled before they start) are
    /// allowed.
    pub fn transition(&mut self, next: JobStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        let allowed = matches!(
            (self.status, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Stopped)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Stopped)
        );
        if !allowed {
            return Err(DomainError::invalid_state_transition(format!(
                "job {} -> {}",
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn report_progress(&mut self, percent: u8, step: impl Into<String>, now: DateTime<Utc>) {
        self.progress = percent.min(100);
        self.step = step.into();
        self.updated_at = now;
    }
}
