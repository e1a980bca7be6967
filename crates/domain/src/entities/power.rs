//! Power progression state - realm/level per character plus the
//! append-only breakthrough event log.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::ProjectId;

/// What justified a breakthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakthroughTrigger {
    /// A cultivation/bottleneck beat in a recent chapter.
    Cultivation,
    /// A bottleneck scene resolved.
    Bottleneck,
    /// Treasure or elixir gain.
    Treasure,
    /// Authorial fiat flagged in the outline ("golden finger").
    GoldenFinger,
}

impl BreakthroughTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cultivation => "cultivation",
            Self::Bottleneck => "bottleneck",
            Self::Treasure => "treasure",
            Self::GoldenFinger => "golden_finger",
        }
    }
}

impl std::str::FromStr for BreakthroughTrigger {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cultivation" => Ok(Self::Cultivation),
            "bottleneck" => Ok(Self::Bottleneck),
            "treasure" => Ok(Self::Treasure),
            "golden_finger" => Ok(Self::GoldenFinger),
            other => Err(DomainError::parse(format!(
                "Unknown breakthrough trigger: '{other}'"
            ))),
        }
    }
}

/// Current cultivation state of one character.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerState {
    pub project_id: ProjectId,
    pub character_name: String,
    pub realm: String,
    /// Index of the realm in the project power system.
    pub realm_index: u32,
    /// Level within the realm.
    pub level: u32,
    pub last_breakthrough_chapter: u32,
}

impl PowerState {
    pub fn new(
        project_id: ProjectId,
        character_name: impl Into<String>,
        realm: impl Into<String>,
        realm_index: u32,
        level: u32,
    ) -> Self {
        Self {
            project_id,
            character_name: character_name.into(),
            realm: realm.into(),
            realm_index,
            level,
            last_breakthrough_chapter: 0,
        }
    }

    pub fn chapters_since_breakthrough(&self, chapter: u32) -> u32 {
        chapter.saturating_sub(self.last_breakthrough_chapter)
    }
}

/// One recorded realm/level advance. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionEvent {
    pub project_id: ProjectId,
    pub character_name: String,
    pub from_realm: String,
    pub from_realm_index: u32,
    pub from_level: u32,
    pub to_realm: String,
    pub to_realm_index: u32,
    pub to_level: u32,
    pub chapter: u32,
    pub trigger: BreakthroughTrigger,
}

impl ProgressionEvent {
    /// Realms skipped by this advance. 0 for in-realm level-ups and
    /// single-realm breakthroughs.
    pub fn realms_skipped(&self) -> u32 {
        self.to_realm_index
            .saturating_sub(self.from_realm_index)
            .saturating_sub(1)
    }

    /// A jump over more than one realm needs an explicit golden-finger
    /// justification flagged in the outline.
    pub fn is_impossible_jump(&self) -> bool {
        self.realms_skipped() > 0 && self.trigger != BreakthroughTrigger::GoldenFinger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(from_idx: u32, to_idx: u32, trigger: BreakthroughTrigger) -> ProgressionEvent {
        ProgressionEvent {
            project_id: ProjectId::new(),
            character_name: "Hàn Phong".to_string(),
            from_realm: "Luyện Khí".to_string(),
            from_realm_index: from_idx,
            from_level: 9,
            to_realm: "Trúc Cơ".to_string(),
            to_realm_index: to_idx,
            to_level: 1,
            chapter: 30,
            trigger,
        }
    }

    #[test]
    fn adjacent_realm_advance_is_fine() {
        let e = event(0, 1, BreakthroughTrigger::Cultivation);
        assert_eq!(e.realms_skipped(), 0);
        assert!(!e.is_impossible_jump());
    }

    #[test]
    fn skipping_realms_requires_golden_finger() {
        assert!(event(0, 2, BreakthroughTrigger::Treasure).is_impossible_jump());
        assert!(!event(0, 2, BreakthroughTrigger::GoldenFinger).is_impossible_jump());
    }

    #[test]
    fn chapters_since_breakthrough_saturates() {
        let state = PowerState::new(ProjectId::new(), "Hàn Phong", "Luyện Khí", 0, 1);
        assert_eq!(state.chapters_since_breakthrough(12), 12);
    }
}
