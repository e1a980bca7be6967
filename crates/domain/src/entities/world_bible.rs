//! World bible - the per-project canon seed: power system, protagonist,
//! relationships, locations, threads and hard world rules.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::ProjectId;

/// One realm of the power ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerRealm {
    /// Position in the ladder, 0-based.
    pub rank: u32,
    pub name: String,
    /// Levels within the realm (e.g. tầng 1-9).
    pub sub_levels: u32,
    pub abilities: Vec<String>,
    /// Free-text difficulty of breaking through out of this realm.
    pub breakthrough_difficulty: String,
}

/// An ordered ladder of realms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerSystem {
    pub name: String,
    pub realms: Vec<PowerRealm>,
}

impl PowerSystem {
    pub fn realm_index(&self, name: &str) -> Option<usize> {
        self.realms.iter().position(|r| r.name == name)
    }

    pub fn realm_by_rank(&self, rank: u32) -> Option<&PowerRealm> {
        self.realms.iter().find(|r| r.rank == rank)
    }
}

/// Relationship role of an NPC toward the protagonist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpcRole {
    Enemy,
    Ally,
    Mentor,
    LoveInterest,
    Neutral,
}

impl NpcRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enemy => "enemy",
            Self::Ally => "ally",
            Self::Mentor => "mentor",
            Self::LoveInterest => "love_interest",
            Self::Neutral => "neutral",
        }
    }
}

impl std::str::FromStr for NpcRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enemy" => Ok(Self::Enemy),
            "ally" => Ok(Self::Ally),
            "mentor" => Ok(Self::Mentor),
            "love_interest" => Ok(Self::LoveInterest),
            "neutral" => Ok(Self::Neutral),
            other => Err(DomainError::parse(format!("Unknown NPC role: '{other}'"))),
        }
    }
}

/// One NPC relationship edge. Affinity tracks monotonically except on
/// explicit trigger events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcRelationship {
    pub name: String,
    pub role: NpcRole,
    /// -100 (mortal enemy) to 100 (devoted).
    pub affinity: i8,
}

impl NpcRelationship {
    pub fn new(name: impl Into<String>, role: NpcRole, affinity: i8) -> Result<Self, DomainError> {
        if !(-100..=100).contains(&affinity) {
            return Err(DomainError::validation(format!(
                "Affinity must be in [-100, 100], got {affinity}"
            )));
        }
        Ok(Self {
            name: name.into(),
            role,
            affinity,
        })
    }
}

/// The protagonist's sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protagonist {
    pub name: String,
    pub realm: String,
    pub level: u32,
    pub traits: Vec<String>,
    pub abilities: Vec<String>,
    pub inventory: Vec<String>,
    pub goals: Vec<String>,
    pub status: String,
}

/// An open or resolved plot thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotThread {
    pub description: String,
    pub opened_chapter: u32,
    pub resolved_chapter: Option<u32>,
}

/// A foreshadowing slot: planted early, to be paid off later.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeshadowSlot {
    pub hint: String,
    pub planted_chapter: u32,
    pub payoff_by_chapter: Option<u32>,
    pub paid_off: bool,
}

/// Owned 1:1 by a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldBible {
    pub project_id: ProjectId,
    pub story_title: String,
    pub power_system: PowerSystem,
    pub protagonist: Protagonist,
    pub npc_relationships: Vec<NpcRelationship>,
    pub locations: Vec<String>,
    pub plot_threads: Vec<PlotThread>,
    pub foreshadowing: Vec<ForeshadowSlot>,
    /// Free-text invariants the Critic and canon resolver respect.
    pub world_rules: Vec<String>,
}

impl WorldBible {
    /// The protagonist's realm must exist in the power system.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self
            .power_system
            .realm_index(&self.protagonist.realm)
            .is_none()
        {
            return Err(DomainError::constraint(format!(
                "Protagonist realm '{}' is not part of power system '{}'",
                self.protagonist.realm, self.power_system.name
            )));
        }
        for rel in &self.npc_relationships {
            if !(-100..=100).contains(&rel.affinity) {
                return Err(DomainError::validation(format!(
                    "Affinity out of range for NPC '{}'",
                    rel.name
                )));
            }
        }
        Ok(())
    }

    /// Relationship entries for characters appearing in the given list,
    /// used to build the Writer's voice guide.
    pub fn relationships_for(&self, characters: &[String]) -> Vec<&NpcRelationship> {
        self.npc_relationships
            .iter()
            .filter(|rel| characters.iter().any(|c| c == &rel.name))
            .collect()
    }
}
