//! Project entity - the root of everything the factory produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{ProjectId, UserId};
use crate::value_objects::GenreType;

/// Minimum planned chapters for a project.
pub const MIN_TARGET_CHAPTERS: u32 = 10;
/// Maximum planned chapters for a project.
pub const MAX_TARGET_CHAPTERS: u32 = 2000;
/// Minimum per-chapter word target.
pub const MIN_CHAPTER_WORDS: u32 = 1000;
/// Maximum per-chapter word target.
pub const MAX_CHAPTER_WORDS: u32 = 5000;

/// Where a project is in its production lifecycle.
///
/// Projects are never physically deleted; they are soft-ended by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Idle,
    Writing,
    Paused,
    Completed,
    Error,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Writing => "writing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "writing" => Ok(Self::Writing),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(DomainError::parse(format!(
                "Unknown project status: '{other}'"
            ))),
        }
    }
}

/// A serial-fiction project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub owner_id: UserId,
    pub title: String,
    pub genre: GenreType,
    pub target_chapters: u32,
    pub chapters_per_arc: u32,
    /// Highest chapter number written and committed so far.
    pub current_chapter: u32,
    pub status: ProjectStatus,
    /// Model id used for the large-tier writing calls.
    pub model_id: String,
    pub temperature: f32,
    /// Target words per chapter.
    pub target_chapter_words: u32,
    /// Key into the style template registry, or "custom".
    pub writing_style: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(
        owner_id: UserId,
        title: impl Into<String>,
        genre: GenreType,
        target_chapters: u32,
        target_chapter_words: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(DomainError::validation("Project title cannot be empty"));
        }
        if !(MIN_TARGET_CHAPTERS..=MAX_TARGET_CHAPTERS).contains(&target_chapters) {
            return Err(DomainError::validation(format!(
                "Target chapters must be in [{MIN_TARGET_CHAPTERS}, {MAX_TARGET_CHAPTERS}], got {target_chapters}"
            )));
        }
        if !(MIN_CHAPTER_WORDS..=MAX_CHAPTER_WORDS).contains(&target_chapter_words) {
            return Err(DomainError::validation(format!(
                "Target chapter length must be in [{MIN_CHAPTER_WORDS}, {MAX_CHAPTER_WORDS}] words, got {target_chapter_words}"
            )));
        }

        Ok(Self {
            id: ProjectId::new(),
            owner_id,
            title,
            genre,
            target_chapters,
            chapters_per_arc: 20,
            current_chapter: 0,
            status: ProjectStatus::Idle,
            model_id: String::new(),
            temperature: 0.8,
            target_chapter_words,
            writing_style: genre.as_str().to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_id(mut self, id: ProjectId) -> Self {
        self.id = id;
        self
    }

    pub fn with_chapters_per_arc(mut self, n: u32) -> Result<Self, DomainError> {
        if n == 0 {
            return Err(DomainError::validation("Chapters per arc must be positive"));
        }
        self.chapters_per_arc = n;
        Ok(self)
    }

    pub fn with_temperature(mut self, t: f32) -> Result<Self, DomainError> {
        if !(0.0..=1.0).contains(&t) {
            return Err(DomainError::validation(format!(
                "Temperature must be in [0, 1], got {t}"
            )));
        }
        self.temperature = t;
        Ok(self)
    }

    /// Whether the planned story is fully written.
    pub fn is_complete(&self) -> bool {
        self.current_chapter >= self.target_chapters
    }

    /// The next chapter number the runner should produce.
    pub fn next_chapter(&self) -> u32 {
        self.current_chapter + 1
    }
}
