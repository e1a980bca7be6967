//! Romance progression - staged relationship advancement with pacing
//! minimums per progression speed.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{ProjectId, RomanceId};

/// Relationship stages, ordered by intimacy on the romantic track.
/// The rivalry track (rival/enemy/nemesis) sits outside the romance
/// ordering but uses the same machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RomanceStage {
    Stranger,
    Acquaintance,
    Friend,
    CloseFriend,
    Rival,
    Enemy,
    Nemesis,
    Crush,
    Dating,
    Committed,
    Married,
}

impl RomanceStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stranger => "stranger",
            Self::Acquaintance => "acquaintance",
            Self::Friend => "friend",
            Self::CloseFriend => "close_friend",
            Self::Rival => "rival",
            Self::Enemy => "enemy",
            Self::Nemesis => "nemesis",
            Self::Crush => "crush",
            Self::Dating => "dating",
            Self::Committed => "committed",
            Self::Married => "married",
        }
    }
}

impl std::str::FromStr for RomanceStage {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stranger" => Ok(Self::Stranger),
            "acquaintance" => Ok(Self::Acquaintance),
            "friend" => Ok(Self::Friend),
            "close_friend" => Ok(Self::CloseFriend),
            "rival" => Ok(Self::Rival),
            "enemy" => Ok(Self::Enemy),
            "nemesis" => Ok(Self::Nemesis),
            "crush" => Ok(Self::Crush),
            "dating" => Ok(Self::Dating),
            "committed" => Ok(Self::Committed),
            "married" => Ok(Self::Married),
            other => Err(DomainError::parse(format!(
                "Unknown romance stage: '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionSpeed {
    SlowBurn,
    Medium,
    Fast,
}

impl ProgressionSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlowBurn => "slow_burn",
            Self::Medium => "medium",
            Self::Fast => "fast",
        }
    }

    /// Minimum chapters into the story before a pair may *enter* the
    /// given stage.
    pub fn minimum_chapters_for(&self, stage: RomanceStage) -> u32 {
        let medium = match stage {
            RomanceStage::Stranger | RomanceStage::Acquaintance => 0,
            RomanceStage::Friend => 15,
            RomanceStage::CloseFriend => 25,
            RomanceStage::Rival | RomanceStage::Enemy => 5,
            RomanceStage::Nemesis => 30,
            RomanceStage::Crush => 35,
            RomanceStage::Dating => 50,
            RomanceStage::Committed => 80,
            RomanceStage::Married => 120,
        };
        match self {
            Self::Medium => medium,
            Self::SlowBurn => medium * 2,
            Self::Fast => medium / 2,
        }
    }

    /// Chapters sitting in one stage after which the romance counts as
    /// stalled.
    pub fn stall_threshold(&self) -> u32 {
        match self {
            Self::SlowBurn => 80,
            Self::Medium => 50,
            Self::Fast => 30,
        }
    }
}

impl std::str::FromStr for ProgressionSpeed {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slow_burn" => Ok(Self::SlowBurn),
            "medium" => Ok(Self::Medium),
            "fast" => Ok(Self::Fast),
            other => Err(DomainError::parse(format!(
                "Unknown progression speed: '{other}'"
            ))),
        }
    }
}

/// A stage change in the history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTransition {
    pub stage: RomanceStage,
    pub chapter: u32,
    pub trigger: String,
}

/// Progression state of one character pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RomanceProgression {
    pub id: RomanceId,
    pub project_id: ProjectId,
    pub character_a: String,
    pub character_b: String,
    pub current_stage: RomanceStage,
    pub stage_history: Vec<StageTransition>,
    pub speed: ProgressionSpeed,
    /// Chapter at which the current stage was entered.
    pub stage_entered_chapter: u32,
    pub shared_experiences: Vec<String>,
    pub conflicts: Vec<String>,
    pub romantic_moments: Vec<String>,
    pub active: bool,
}

impl RomanceProgression {
    pub fn new(
        project_id: ProjectId,
        character_a: impl Into<String>,
        character_b: impl Into<String>,
        speed: ProgressionSpeed,
    ) -> Self {
        Self {
            id: RomanceId::new(),
            project_id,
            character_a: character_a.into(),
            character_b: character_b.into(),
            current_stage: RomanceStage::Stranger,
            stage_history: vec![],
            speed,
            stage_entered_chapter: 0,
            shared_experiences: vec![],
            conflicts: vec![],
            romantic_moments: vec![],
            active: true,
        }
    }

    pub fn chapters_in_stage(&self, current_chapter: u32) -> u32 {
        current_chapter.saturating_sub(self.stage_entered_chapter)
    }

    /// Whether entering `stage` at `chapter` violates the pacing
    /// minimum. Violations warn, they do not block.
    pub fn transition_too_early(&self, stage: RomanceStage, chapter: u32) -> bool {
        chapter < self.speed.minimum_chapters_for(stage)
    }

    /// Record a stage change regardless of pacing; callers surface the
    /// warning separately.
    pub fn advance(&mut self, stage: RomanceStage, chapter: u32, trigger: impl Into<String>) {
        self.current_stage = stage;
        self.stage_entered_chapter = chapter;
        self.stage_history.push(StageTransition {
            stage,
            chapter,
            trigger: trigger.into(),
        });
    }

    pub fn is_stalled(&self, current_chapter: u32) -> bool {
        self.active
            && self.current_stage != RomanceStage::Married
            && self.chapters_in_stage(current_chapter) > self.speed.stall_threshold()
    }

    /// Unordered pair key for upserts.
    pub fn pair_key(&self) -> (String, String) {
        if self.character_a <= self.character_b {
            (self.character_a.clone(), self.character_b.clone())
        } else {
            (self.character_b.clone(), self.character_a.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn romance(speed: ProgressionSpeed) -> RomanceProgression {
        RomanceProgression::new(ProjectId::new(), "Hàn Phong", "Lâm Uyển Nhi", speed)
    }

    #[test]
    fn medium_speed_minimums_match_schedule() {
        let speed = ProgressionSpeed::Medium;
        assert_eq!(speed.minimum_chapters_for(RomanceStage::Friend), 15);
        assert_eq!(speed.minimum_chapters_for(RomanceStage::CloseFriend), 25);
        assert_eq!(speed.minimum_chapters_for(RomanceStage::Crush), 35);
        assert_eq!(speed.minimum_chapters_for(RomanceStage::Dating), 50);
    }

    #[test]
    fn slow_burn_doubles_minimums() {
        assert_eq!(
            ProgressionSpeed::SlowBurn.minimum_chapters_for(RomanceStage::Dating),
            100
        );
    }

    #[test]
    fn early_transition_flagged_but_recordable() {
        let mut r = romance(ProgressionSpeed::Medium);
        assert!(r.transition_too_early(RomanceStage::Dating, 12));
        r.advance(RomanceStage::Dating, 12, "cứu mạng dưới mưa");
        assert_eq!(r.current_stage, RomanceStage::Dating);
        assert_eq!(r.stage_history.len(), 1);
    }

    #[test]
    fn stall_detection_uses_speed_threshold() {
        let mut r = romance(ProgressionSpeed::Fast);
        r.advance(RomanceStage::Friend, 10, "đồng hành");
        assert!(!r.is_stalled(40));
        assert!(r.is_stalled(41));
    }

    #[test]
    fn married_pairs_never_stall() {
        let mut r = romance(ProgressionSpeed::Fast);
        r.advance(RomanceStage::Married, 10, "đại hôn");
        assert!(!r.is_stalled(500));
    }

    #[test]
    fn pair_key_is_order_independent() {
        let a = RomanceProgression::new(ProjectId::new(), "B", "A", ProgressionSpeed::Medium);
        let b = RomanceProgression::new(ProjectId::new(), "A", "B", ProgressionSpeed::Medium);
        assert_eq!(a.pair_key(), b.pair_key());
    }
}
