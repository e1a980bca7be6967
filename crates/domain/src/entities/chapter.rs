//! Chapter entity - one produced chapter of plain-text prose.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{ChapterId, ProjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Draft,
    Approved,
    Rejected,
    Published,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Published => "published",
        }
    }
}

impl std::str::FromStr for ChapterStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "published" => Ok(Self::Published),
            other => Err(DomainError::parse(format!(
                "Unknown chapter status: '{other}'"
            ))),
        }
    }
}

/// One chapter of the serial. Content is plain text with no markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: ChapterId,
    pub project_id: ProjectId,
    /// Unique within the project.
    pub number: u32,
    pub title: String,
    pub content: String,
    pub word_count: u32,
    /// Critic quality score 0-10.
    pub quality_score: f32,
    /// Dopamine points actually delivered.
    pub dopamine_points: u32,
    pub status: ChapterStatus,
    pub created_at: DateTime<Utc>,
}

impl Chapter {
    pub fn new(
        project_id: ProjectId,
        number: u32,
        title: impl Into<String>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if number == 0 {
            return Err(DomainError::validation("Chapter numbers start at 1"));
        }
        let content = content.into();
        let word_count = crate::common::word_count(&content) as u32;
        Ok(Self {
            id: ChapterId::new(),
            project_id,
            number,
            title: title.into(),
            content,
            word_count,
            quality_score: 0.0,
            dopamine_points: 0,
            status: ChapterStatus::Draft,
            created_at: now,
        })
    }

    pub fn with_quality(mut self, score: f32, dopamine_points: u32) -> Self {
        self.quality_score = score.clamp(0.0, 10.0);
        self.dopamine_points = dopamine_points;
        self
    }

    pub fn approve(&mut self) {
        self.status = ChapterStatus::Approved;
    }

    pub fn reject(&mut self) {
        self.status = ChapterStatus::Rejected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_words_on_creation() {
        let ch = Chapter::new(
            ProjectId::new(),
            1,
            "Khởi Đầu",
            "Hàn Phong mở mắt, trần nhà lạ lẫm.",
            Utc::now(),
        )
        .expect("chapter");
        assert_eq!(ch.word_count, 8);
        assert_eq!(ch.status, ChapterStatus::Draft);
    }

    #[test]
    fn rejects_chapter_zero() {
        assert!(Chapter::new(ProjectId::new(), 0, "t", "c", Utc::now()).is_err());
    }

    #[test]
    fn quality_clamped() {
        let ch = Chapter::new(ProjectId::new(), 1, "t", "c", Utc::now())
            .expect("chapter")
            .with_quality(14.0, 2);
        assert_eq!(ch.quality_score, 10.0);
    }
}
