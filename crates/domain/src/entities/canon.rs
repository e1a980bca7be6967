//! Canon facts - asserted truths about the story world.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{FactId, ProjectId};

/// How binding a fact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonLevel {
    /// Tentative hints; expire after 20 chapters without reinforcement.
    Retractable,
    /// Minor NPC traits, relationship valence. Overridable by hard facts.
    Soft,
    /// Protagonist core identity, deaths, power-system rules. A conflict
    /// between two hard facts blocks the chapter.
    Hard,
}

impl CanonLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retractable => "retractable",
            Self::Soft => "soft",
            Self::Hard => "hard",
        }
    }
}

impl std::str::FromStr for CanonLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retractable" => Ok(Self::Retractable),
            "soft" => Ok(Self::Soft),
            "hard" => Ok(Self::Hard),
            other => Err(DomainError::parse(format!("Unknown canon level: '{other}'"))),
        }
    }
}

/// What the fact is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonCategory {
    CharacterTrait,
    PowerLevel,
    Location,
    Relationship,
    WorldRule,
    Item,
    Event,
}

impl CanonCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CharacterTrait => "character_trait",
            Self::PowerLevel => "power_level",
            Self::Location => "location",
            Self::Relationship => "relationship",
            Self::WorldRule => "world_rule",
            Self::Item => "item",
            Self::Event => "event",
        }
    }
}

impl std::str::FromStr for CanonCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "character_trait" => Ok(Self::CharacterTrait),
            "power_level" => Ok(Self::PowerLevel),
            "location" => Ok(Self::Location),
            "relationship" => Ok(Self::Relationship),
            "world_rule" => Ok(Self::WorldRule),
            "item" => Ok(Self::Item),
            "event" => Ok(Self::Event),
            other => Err(DomainError::parse(format!(
                "Unknown canon category: '{other}'"
            ))),
        }
    }
}

/// Chapters a retractable fact survives without reinforcement.
pub const RETRACTABLE_TTL_CHAPTERS: u32 = 20;

/// An asserted truth about the story world.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonFact {
    pub id: FactId,
    pub project_id: ProjectId,
    pub chapter_introduced: u32,
    pub level: CanonLevel,
    pub category: CanonCategory,
    /// Names of the entities this fact concerns.
    pub entities: Vec<String>,
    pub statement: String,
    /// Extraction confidence 0-1.
    pub confidence: f32,
    /// Last chapter the fact was restated or relied on.
    pub last_reinforced_chapter: u32,
}

impl CanonFact {
    pub fn new(
        project_id: ProjectId,
        chapter: u32,
        level: CanonLevel,
        category: CanonCategory,
        entities: Vec<String>,
        statement: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            id: FactId::new(),
            project_id,
            chapter_introduced: chapter,
            level,
            category,
            entities,
            statement: statement.into(),
            confidence: confidence.clamp(0.0, 1.0),
            last_reinforced_chapter: chapter,
        }
    }

    /// A retractable fact expires 20 chapters after its last
    /// reinforcement.
    pub fn is_expired(&self, current_chapter: u32) -> bool {
        self.level == CanonLevel::Retractable
            && current_chapter > self.last_reinforced_chapter + RETRACTABLE_TTL_CHAPTERS
    }

    /// Whether the fact mentions any of the given entities.
    pub fn concerns_any(&self, entities: &[String]) -> bool {
        self.entities.iter().any(|e| entities.contains(e))
    }
}
