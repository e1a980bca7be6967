//! Character depth profiles - voice, uniqueness and growth tracking.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{ProfileId, ProjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterRole {
    Protagonist,
    Antagonist,
    Supporting,
    Minor,
}

impl CharacterRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protagonist => "protagonist",
            Self::Antagonist => "antagonist",
            Self::Supporting => "supporting",
            Self::Minor => "minor",
        }
    }
}

impl std::str::FromStr for CharacterRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "protagonist" => Ok(Self::Protagonist),
            "antagonist" => Ok(Self::Antagonist),
            "supporting" => Ok(Self::Supporting),
            "minor" => Ok(Self::Minor),
            other => Err(DomainError::parse(format!(
                "Unknown character role: '{other}'"
            ))),
        }
    }
}

/// Dialogue fingerprint used by the Writer's voice guide.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechPattern {
    /// "trang trọng" ... "suồng sã".
    pub formality: String,
    /// "kiệm lời" ... "dài dòng".
    pub verbosity: String,
    pub quirks: Vec<String>,
}

/// What makes the character recognizable on the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistinctiveFeatures {
    pub appearance: Vec<String>,
    pub mannerisms: Vec<String>,
    pub habits: Vec<String>,
    pub beliefs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    Realization,
    Decision,
    Sacrifice,
    Growth,
    Setback,
    Revelation,
}

impl MilestoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Realization => "realization",
            Self::Decision => "decision",
            Self::Sacrifice => "sacrifice",
            Self::Growth => "growth",
            Self::Setback => "setback",
            Self::Revelation => "revelation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneImpact {
    Minor,
    Moderate,
    Major,
}

impl MilestoneImpact {
    /// Growth-score contribution.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Minor => 4,
            Self::Moderate => 8,
            Self::Major => 15,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Major => "major",
        }
    }
}

/// One completed character-arc milestone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub kind: MilestoneKind,
    pub impact: MilestoneImpact,
    pub description: String,
    pub chapter: u32,
}

/// Start-to-target trajectory with completed milestones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterArc {
    pub starting_state: String,
    pub current_state: String,
    pub target_state: String,
    pub milestones: Vec<Milestone>,
    /// 0-100, accumulated from milestone weights.
    pub growth_score: u32,
}

impl CharacterArc {
    pub fn record_milestone(&mut self, milestone: Milestone) {
        self.growth_score = (self.growth_score + milestone.impact.weight()).min(100);
        self.milestones.push(milestone);
    }

    pub fn last_milestone_chapter(&self) -> Option<u32> {
        self.milestones.iter().map(|m| m.chapter).max()
    }
}

/// Extra fields for antagonists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VillainProfile {
    /// Why the villain believes they are right.
    pub justification: String,
    /// What they would never do.
    pub line_never_crossed: String,
    pub menace_level: u8,
}

/// Chapters without a milestone after which a non-minor character is
/// surfaced as needing development.
pub const STAGNATION_CHAPTERS: u32 = 50;

/// Full depth profile of one character.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterDepthProfile {
    pub id: ProfileId,
    pub project_id: ProjectId,
    pub name: String,
    pub role: CharacterRole,
    pub primary_motivation: String,
    pub secondary_motivations: Vec<String>,
    pub backstory: String,
    pub dark_secret: Option<String>,
    pub flaw: String,
    pub strength: String,
    pub personality_traits: Vec<String>,
    pub speech_pattern: SpeechPattern,
    pub distinctive_features: DistinctiveFeatures,
    pub character_arc: CharacterArc,
    pub villain_profile: Option<VillainProfile>,
    pub chapter_appearances: Vec<u32>,
}

impl CharacterDepthProfile {
    pub fn new(
        project_id: ProjectId,
        name: impl Into<String>,
        role: CharacterRole,
    ) -> Self {
        Self {
            id: ProfileId::new(),
            project_id,
            name: name.into(),
            role,
            primary_motivation: String::new(),
            secondary_motivations: vec![],
            backstory: String::new(),
            dark_secret: None,
            flaw: String::new(),
            strength: String::new(),
            personality_traits: vec![],
            speech_pattern: SpeechPattern::default(),
            distinctive_features: DistinctiveFeatures::default(),
            character_arc: CharacterArc::default(),
            villain_profile: None,
            chapter_appearances: vec![],
        }
    }

    /// Uniqueness against another profile in [0, 100]; lower means more
    /// similar. Shared personality traits weigh 0.6, role match 0.2,
    /// distinctive-feature overlap 0.1.
    pub fn uniqueness_against(&self, other: &CharacterDepthProfile) -> u32 {
        let trait_overlap = overlap_ratio(&self.personality_traits, &other.personality_traits);
        let role_match = if self.role == other.role { 1.0 } else { 0.0 };
        let feature_overlap = {
            let mine = self.all_features();
            let theirs = other.all_features();
            overlap_ratio(&mine, &theirs)
        };
        let similarity = 0.6 * trait_overlap + 0.2 * role_match + 0.1 * feature_overlap;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let score = ((1.0 - similarity) * 100.0).round() as u32;
        score.min(100)
    }

    fn all_features(&self) -> Vec<String> {
        let f = &self.distinctive_features;
        f.appearance
            .iter()
            .chain(f.mannerisms.iter())
            .chain(f.habits.iter())
            .chain(f.beliefs.iter())
            .cloned()
            .collect()
    }

    /// Whether the character has gone stagnant by the given chapter.
    pub fn needs_development(&self, current_chapter: u32) -> bool {
        if self.role == CharacterRole::Minor {
            return false;
        }
        let last = self
            .character_arc
            .last_milestone_chapter()
            .or_else(|| self.chapter_appearances.first().copied())
            .unwrap_or(0);
        current_chapter.saturating_sub(last) > STAGNATION_CHAPTERS
    }

    pub fn record_appearance(&mut self, chapter: u32) {
        if self.chapter_appearances.last() != Some(&chapter) {
            self.chapter_appearances.push(chapter);
        }
    }
}

fn overlap_ratio(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.iter().filter(|x| b.contains(x)).count() as f64;
    shared / a.len().max(b.len()) as f64
}
