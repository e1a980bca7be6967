//! Consistency-check types: per-character state and detected issues.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{IssueId, ProjectId};

/// Liveness of a character as established by the story so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterStatus {
    Alive,
    Dead,
    Missing,
    Unknown,
}

impl CharacterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Dead => "dead",
            Self::Missing => "missing",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for CharacterStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alive" => Ok(Self::Alive),
            "dead" => Ok(Self::Dead),
            "missing" => Ok(Self::Missing),
            "unknown" => Ok(Self::Unknown),
            other => Err(DomainError::parse(format!(
                "Unknown character status: '{other}'"
            ))),
        }
    }
}

/// One trait with the chapter that established it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstablishedTrait {
    pub description: String,
    pub established_chapter: u32,
}

/// Tracked state of a character used by the consistency checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterState {
    pub project_id: ProjectId,
    pub name: String,
    pub traits: Vec<EstablishedTrait>,
    pub cultivation_level: Option<String>,
    pub location: Option<String>,
    pub status: CharacterStatus,
    /// Chapter where the current status was established.
    pub status_chapter: u32,
}

impl CharacterState {
    pub fn new(project_id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            project_id,
            name: name.into(),
            traits: vec![],
            cultivation_level: None,
            location: None,
            status: CharacterStatus::Alive,
            status_chapter: 0,
        }
    }

    pub fn mark_dead(&mut self, chapter: u32) {
        self.status = CharacterStatus::Dead;
        self.status_chapter = chapter;
    }
}

/// Issue severity. `Critical` forces a rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Minor,
    Moderate,
    Major,
    Critical,
}

impl IssueSeverity {
    /// Deduction from the 100-point consistency score.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Minor => 5,
            Self::Moderate => 10,
            Self::Major => 20,
            Self::Critical => 40,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }
}

impl std::str::FromStr for IssueSeverity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minor" => Ok(Self::Minor),
            "moderate" => Ok(Self::Moderate),
            "major" => Ok(Self::Major),
            "critical" => Ok(Self::Critical),
            other => Err(DomainError::parse(format!(
                "Unknown issue severity: '{other}'"
            ))),
        }
    }
}

/// Kind of consistency violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    DeadCharacterAppearance,
    PowerLevelJump,
    RelationshipViolation,
    TraitContradiction,
    CanonConflict,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeadCharacterAppearance => "dead_character_appearance",
            Self::PowerLevelJump => "power_level_jump",
            Self::RelationshipViolation => "relationship_violation",
            Self::TraitContradiction => "trait_contradiction",
            Self::CanonConflict => "canon_conflict",
        }
    }
}

/// One detected issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyIssue {
    pub id: IssueId,
    pub project_id: ProjectId,
    pub chapter_number: u32,
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub description: String,
    /// The offending fragment quoted from the draft, when available.
    pub fragment: Option<String>,
    pub suggested_fix: Option<String>,
}

impl ConsistencyIssue {
    pub fn new(
        project_id: ProjectId,
        chapter_number: u32,
        kind: IssueKind,
        severity: IssueSeverity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: IssueId::new(),
            project_id,
            chapter_number,
            kind,
            severity,
            description: description.into(),
            fragment: None,
            suggested_fix: None,
        }
    }

    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }
}

/// Overall score from a set of issues: 100 minus the severity weights,
/// floored at zero.
pub fn consistency_score(issues: &[ConsistencyIssue]) -> u32 {
    let deduction: u32 = issues.iter().map(|i| i.severity.weight()).sum();
    100u32.saturating_sub(deduction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_deducts_severity_weights() {
        let pid = ProjectId::new();
        let issues = vec![
            ConsistencyIssue::new(
                pid,
                10,
                IssueKind::TraitContradiction,
                IssueSeverity::Minor,
                "đổi màu mắt",
            ),
            ConsistencyIssue::new(
                pid,
                10,
                IssueKind::PowerLevelJump,
                IssueSeverity::Major,
                "nhảy hai đại cảnh giới",
            ),
        ];
        assert_eq!(consistency_score(&issues), 100 - 5 - 20);
    }

    #[test]
    fn score_floors_at_zero() {
        let pid = ProjectId::new();
        let issues: Vec<_> = (0..4)
            .map(|_| {
                ConsistencyIssue::new(
                    pid,
                    1,
                    IssueKind::DeadCharacterAppearance,
                    IssueSeverity::Critical,
                    "nhân vật đã chết xuất hiện",
                )
            })
            .collect();
        assert_eq!(consistency_score(&issues), 0);
    }

    #[test]
    fn severity_is_ordered() {
        assert!(IssueSeverity::Critical > IssueSeverity::Major);
        assert!(IssueSeverity::Major > IssueSeverity::Moderate);
    }
}
