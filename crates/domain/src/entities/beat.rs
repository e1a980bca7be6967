//! Narrative beats - rotation-budgeted content units.
//!
//! Beat types are closed enumerations per category with fixed cooldown
//! tables (chapters until a type may recur) and fixed per-arc budgets.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{BeatEntryId, ProjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeatCategory {
    Plot,
    Emotional,
    Setting,
}

impl BeatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plot => "plot",
            Self::Emotional => "emotional",
            Self::Setting => "setting",
        }
    }
}

/// Plot-level beats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotBeat {
    Tournament,
    SecretRealm,
    Auction,
    Assassination,
    Betrayal,
    TreasureHunt,
    SectWar,
    Bottleneck,
}

/// Emotional beats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalBeat {
    Reunion,
    Loss,
    Confession,
    Humiliation,
    Vindication,
    Farewell,
}

/// Setting beats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingBeat {
    NewCity,
    HiddenRealm,
    AncientRuin,
    Wilderness,
    SectGrounds,
}

/// Any beat type, tagged by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BeatType {
    Plot(PlotBeat),
    Emotional(EmotionalBeat),
    Setting(SettingBeat),
}

impl BeatType {
    pub const ALL: [BeatType; 19] = [
        BeatType::Plot(PlotBeat::Tournament),
        BeatType::Plot(PlotBeat::SecretRealm),
        BeatType::Plot(PlotBeat::Auction),
        BeatType::Plot(PlotBeat::Assassination),
        BeatType::Plot(PlotBeat::Betrayal),
        BeatType::Plot(PlotBeat::TreasureHunt),
        BeatType::Plot(PlotBeat::SectWar),
        BeatType::Plot(PlotBeat::Bottleneck),
        BeatType::Emotional(EmotionalBeat::Reunion),
        BeatType::Emotional(EmotionalBeat::Loss),
        BeatType::Emotional(EmotionalBeat::Confession),
        BeatType::Emotional(EmotionalBeat::Humiliation),
        BeatType::Emotional(EmotionalBeat::Vindication),
        BeatType::Emotional(EmotionalBeat::Farewell),
        BeatType::Setting(SettingBeat::NewCity),
        BeatType::Setting(SettingBeat::HiddenRealm),
        BeatType::Setting(SettingBeat::AncientRuin),
        BeatType::Setting(SettingBeat::Wilderness),
        BeatType::Setting(SettingBeat::SectGrounds),
    ];

    pub fn category(&self) -> BeatCategory {
        match self {
            Self::Plot(_) => BeatCategory::Plot,
            Self::Emotional(_) => BeatCategory::Emotional,
            Self::Setting(_) => BeatCategory::Setting,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plot(PlotBeat::Tournament) => "tournament",
            Self::Plot(PlotBeat::SecretRealm) => "secret_realm",
            Self::Plot(PlotBeat::Auction) => "auction",
            Self::Plot(PlotBeat::Assassination) => "assassination",
            Self::Plot(PlotBeat::Betrayal) => "betrayal",
            Self::Plot(PlotBeat::TreasureHunt) => "treasure_hunt",
            Self::Plot(PlotBeat::SectWar) => "sect_war",
            Self::Plot(PlotBeat::Bottleneck) => "bottleneck",
            Self::Emotional(EmotionalBeat::Reunion) => "reunion",
            Self::Emotional(EmotionalBeat::Loss) => "loss",
            Self::Emotional(EmotionalBeat::Confession) => "confession",
            Self::Emotional(EmotionalBeat::Humiliation) => "humiliation",
            Self::Emotional(EmotionalBeat::Vindication) => "vindication",
            Self::Emotional(EmotionalBeat::Farewell) => "farewell",
            Self::Setting(SettingBeat::NewCity) => "new_city",
            Self::Setting(SettingBeat::HiddenRealm) => "hidden_realm",
            Self::Setting(SettingBeat::AncientRuin) => "ancient_ruin",
            Self::Setting(SettingBeat::Wilderness) => "wilderness",
            Self::Setting(SettingBeat::SectGrounds) => "sect_grounds",
        }
    }

    /// Chapters that must pass before the beat may recur.
    pub fn cooldown(&self) -> u32 {
        match self {
            Self::Plot(PlotBeat::Tournament) => 30,
            Self::Plot(PlotBeat::SecretRealm) => 25,
            Self::Plot(PlotBeat::Auction) => 20,
            Self::Plot(PlotBeat::Assassination) => 15,
            Self::Plot(PlotBeat::Betrayal) => 40,
            Self::Plot(PlotBeat::TreasureHunt) => 15,
            Self::Plot(PlotBeat::SectWar) => 50,
            Self::Plot(PlotBeat::Bottleneck) => 10,
            Self::Emotional(EmotionalBeat::Reunion) => 20,
            Self::Emotional(EmotionalBeat::Loss) => 30,
            Self::Emotional(EmotionalBeat::Confession) => 35,
            Self::Emotional(EmotionalBeat::Humiliation) => 8,
            Self::Emotional(EmotionalBeat::Vindication) => 8,
            Self::Emotional(EmotionalBeat::Farewell) => 25,
            Self::Setting(SettingBeat::NewCity) => 15,
            Self::Setting(SettingBeat::HiddenRealm) => 30,
            Self::Setting(SettingBeat::AncientRuin) => 25,
            Self::Setting(SettingBeat::Wilderness) => 10,
            Self::Setting(SettingBeat::SectGrounds) => 5,
        }
    }

    /// Maximum uses per arc.
    pub fn arc_budget(&self) -> u32 {
        match self {
            Self::Plot(PlotBeat::Tournament) => 1,
            Self::Plot(PlotBeat::SecretRealm) => 1,
            Self::Plot(PlotBeat::Auction) => 2,
            Self::Plot(PlotBeat::Assassination) => 2,
            Self::Plot(PlotBeat::Betrayal) => 1,
            Self::Plot(PlotBeat::TreasureHunt) => 2,
            Self::Plot(PlotBeat::SectWar) => 1,
            Self::Plot(PlotBeat::Bottleneck) => 3,
            Self::Emotional(EmotionalBeat::Reunion) => 2,
            Self::Emotional(EmotionalBeat::Loss) => 1,
            Self::Emotional(EmotionalBeat::Confession) => 1,
            Self::Emotional(EmotionalBeat::Humiliation) => 4,
            Self::Emotional(EmotionalBeat::Vindication) => 4,
            Self::Emotional(EmotionalBeat::Farewell) => 2,
            Self::Setting(SettingBeat::NewCity) => 2,
            Self::Setting(SettingBeat::HiddenRealm) => 1,
            Self::Setting(SettingBeat::AncientRuin) => 2,
            Self::Setting(SettingBeat::Wilderness) => 3,
            Self::Setting(SettingBeat::SectGrounds) => 4,
        }
    }

    /// Detection lexicon: phrases whose presence in chapter prose marks
    /// a delivery of this beat. Matching is case-insensitive.
    pub fn lexicon(&self) -> &'static [&'static str] {
        match self {
            Self::Plot(PlotBeat::Tournament) => &["đại hội", "tỷ võ", "vòng loại", "đài thi đấu"],
            Self::Plot(PlotBeat::SecretRealm) => &["bí cảnh", "cấm địa mở ra"],
            Self::Plot(PlotBeat::Auction) => &["đấu giá", "giá khởi điểm"],
            Self::Plot(PlotBeat::Assassination) => &["ám sát", "thích khách"],
            Self::Plot(PlotBeat::Betrayal) => &["phản bội", "trở mặt"],
            Self::Plot(PlotBeat::TreasureHunt) => &["tầm bảo", "kho báu", "di bảo"],
            Self::Plot(PlotBeat::SectWar) => &["chiến tranh tông môn", "công phá sơn môn"],
            Self::Plot(PlotBeat::Bottleneck) => &["bình cảnh", "nút thắt tu vi"],
            Self::Emotional(EmotionalBeat::Reunion) => &["trùng phùng", "gặp lại cố nhân"],
            Self::Emotional(EmotionalBeat::Loss) => &["tang lễ", "vĩnh biệt", "qua đời"],
            Self::Emotional(EmotionalBeat::Confession) => &["tỏ tình", "thổ lộ tâm ý"],
            Self::Emotional(EmotionalBeat::Humiliation) => &["làm nhục", "chế giễu", "khinh thường"],
            Self::Emotional(EmotionalBeat::Vindication) => &["rửa nhục", "chứng minh bản thân"],
            Self::Emotional(EmotionalBeat::Farewell) => &["từ biệt", "chia tay lên đường"],
            Self::Setting(SettingBeat::NewCity) => &["tiến vào thành", "tòa thành mới"],
            Self::Setting(SettingBeat::HiddenRealm) => &["tiểu thế giới", "không gian riêng"],
            Self::Setting(SettingBeat::AncientRuin) => &["di tích cổ", "phế tích"],
            Self::Setting(SettingBeat::Wilderness) => &["hoang dã", "sơn mạch hoang vu"],
            Self::Setting(SettingBeat::SectGrounds) => &["tông môn", "nội môn"],
        }
    }
}

impl std::fmt::Display for BeatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BeatType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|b| b.as_str() == s)
            .copied()
            .ok_or_else(|| DomainError::parse(format!("Unknown beat type: '{s}'")))
    }
}

/// One recorded beat usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatEntry {
    pub id: BeatEntryId,
    pub project_id: ProjectId,
    pub chapter_number: u32,
    pub arc_number: u32,
    pub beat_type: BeatType,
    /// 1-10.
    pub intensity: u8,
    /// First chapter at which the beat may be reused.
    pub cooldown_until: u32,
}

impl BeatEntry {
    pub fn new(
        project_id: ProjectId,
        chapter_number: u32,
        arc_number: u32,
        beat_type: BeatType,
        intensity: u8,
    ) -> Self {
        Self {
            id: BeatEntryId::new(),
            project_id,
            chapter_number,
            arc_number,
            beat_type,
            intensity: intensity.clamp(1, 10),
            cooldown_until: chapter_number + beat_type.cooldown(),
        }
    }

    /// Whether the beat is still cooling down at the given chapter.
    pub fn blocks(&self, chapter: u32) -> bool {
        chapter > self.chapter_number && chapter < self.cooldown_until
    }
}

/// Per-(arc, beat type) usage budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcBeatBudget {
    pub arc_number: u32,
    pub beat_type: BeatType,
    pub max: u32,
    pub used: u32,
}

impl ArcBeatBudget {
    pub fn new(arc_number: u32, beat_type: BeatType) -> Self {
        Self {
            arc_number,
            beat_type,
            max: beat_type.arc_budget(),
            used: 0,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.used >= self.max
    }

    /// Record one use. `used ≤ max` is the invariant; overruns are
    /// rejected so the caller can surface a warning instead.
    pub fn record_use(&mut self) -> Result<(), DomainError> {
        if self.exhausted() {
            return Err(DomainError::constraint(format!(
                "Beat '{}' budget exhausted for arc {} ({}/{})",
                self.beat_type, self.arc_number, self.used, self.max
            )));
        }
        self.used += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn slugs_round_trip() {
        for beat in BeatType::ALL {
            assert_eq!(BeatType::from_str(beat.as_str()).ok(), Some(beat));
        }
    }

    #[test]
    fn serde_uses_the_same_slugs() {
        for beat in BeatType::ALL {
            let json = serde_json::to_string(&beat).expect("serialize");
            assert_eq!(json, format!("\"{}\"", beat.as_str()));
            let back: BeatType = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, beat);
        }
    }

    #[test]
    fn tournament_cooldown_is_thirty() {
        let beat = BeatType::Plot(PlotBeat::Tournament);
        assert_eq!(beat.cooldown(), 30);
        let entry = BeatEntry::new(ProjectId::new(), 5, 1, beat, 7);
        assert_eq!(entry.cooldown_until, 35);
        assert!(entry.blocks(12), "chapter 12 is inside the cooldown window");
        assert!(!entry.blocks(35), "cooldown expires at chapter 35");
        assert!(!entry.blocks(5), "the recording chapter itself is not blocked");
    }

    #[test]
    fn budget_rejects_overrun() {
        let mut budget = ArcBeatBudget::new(1, BeatType::Plot(PlotBeat::Tournament));
        assert!(budget.record_use().is_ok());
        assert!(budget.exhausted());
        assert!(budget.record_use().is_err());
        assert_eq!(budget.used, 1);
    }

    #[test]
    fn every_beat_has_a_lexicon() {
        for beat in BeatType::ALL {
            assert!(!beat.lexicon().is_empty(), "{beat} has no lexicon");
        }
    }

    #[test]
    fn intensity_clamped_into_band() {
        let entry = BeatEntry::new(ProjectId::new(), 1, 1, BeatType::Plot(PlotBeat::Auction), 0);
        assert_eq!(entry.intensity, 1);
    }
}
