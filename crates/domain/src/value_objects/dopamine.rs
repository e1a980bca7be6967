//! Reader-satisfaction moments planned into every outline.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A planned reader-payoff moment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DopamineType {
    /// Public humiliation of a scorner reversed on them
    FaceSlap,
    /// Power breakthrough after accumulation
    Breakthrough,
    /// Hidden strength or identity recognized by others
    Recognition,
    /// Treasure or opportunity windfall
    Windfall,
    /// Revenge delivered for an earlier wrong
    Revenge,
    /// Rescue or protection of someone important
    Protection,
    /// Romantic progress with a love interest
    RomanceSpark,
    /// Mystery hook revealed or deepened
    Revelation,
}

impl DopamineType {
    pub const ALL: [DopamineType; 8] = [
        DopamineType::FaceSlap,
        DopamineType::Breakthrough,
        DopamineType::Recognition,
        DopamineType::Windfall,
        DopamineType::Revenge,
        DopamineType::Protection,
        DopamineType::RomanceSpark,
        DopamineType::Revelation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FaceSlap => "face_slap",
            Self::Breakthrough => "breakthrough",
            Self::Recognition => "recognition",
            Self::Windfall => "windfall",
            Self::Revenge => "revenge",
            Self::Protection => "protection",
            Self::RomanceSpark => "romance_spark",
            Self::Revelation => "revelation",
        }
    }
}

impl std::fmt::Display for DopamineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DopamineType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "face_slap" | "faceslap" | "face-slap" => Ok(Self::FaceSlap),
            "breakthrough" => Ok(Self::Breakthrough),
            "recognition" => Ok(Self::Recognition),
            "windfall" => Ok(Self::Windfall),
            "revenge" => Ok(Self::Revenge),
            "protection" => Ok(Self::Protection),
            "romance_spark" | "romance" => Ok(Self::RomanceSpark),
            "revelation" => Ok(Self::Revelation),
            other => Err(DomainError::parse(format!(
                "Unknown dopamine type: '{other}'"
            ))),
        }
    }
}
