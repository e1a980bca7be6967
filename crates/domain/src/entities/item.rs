//! Tracked items - the story's inventory and economy.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{ProjectId, TrackedItemId};

/// Ordered grade taxonomy, mortal-grade up to immortal-grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemGrade {
    /// phàm phẩm
    Pham,
    /// hoàng phẩm
    Hoang,
    /// huyền phẩm
    Huyen,
    /// địa phẩm
    Dia,
    /// thiên phẩm
    Thien,
    /// thánh khí
    Thanh,
    /// tiên khí
    Tien,
}

impl ItemGrade {
    pub const ALL: [ItemGrade; 7] = [
        ItemGrade::Pham,
        ItemGrade::Hoang,
        ItemGrade::Huyen,
        ItemGrade::Dia,
        ItemGrade::Thien,
        ItemGrade::Thanh,
        ItemGrade::Tien,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pham => "pham",
            Self::Hoang => "hoang",
            Self::Huyen => "huyen",
            Self::Dia => "dia",
            Self::Thien => "thien",
            Self::Thanh => "thanh",
            Self::Tien => "tien",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pham => "phàm phẩm",
            Self::Hoang => "hoàng phẩm",
            Self::Huyen => "huyền phẩm",
            Self::Dia => "địa phẩm",
            Self::Thien => "thiên phẩm",
            Self::Thanh => "thánh khí",
            Self::Tien => "tiên khí",
        }
    }

    /// Highest grade allowed at `chapter` of an `total_chapters`-chapter
    /// project: a linear schedule from phàm phẩm at the start to tiên
    /// khí near the end.
    pub fn max_for_chapter(chapter: u32, total_chapters: u32) -> ItemGrade {
        let total = total_chapters.max(1);
        let fraction = f64::from(chapter.min(total)) / f64::from(total);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = (fraction * (Self::ALL.len() - 1) as f64).floor() as usize;
        Self::ALL[idx.min(Self::ALL.len() - 1)]
    }
}

impl std::str::FromStr for ItemGrade {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|g| g.as_str() == s)
            .copied()
            .ok_or_else(|| DomainError::parse(format!("Unknown item grade: '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Active,
    Consumed,
    Destroyed,
    Lost,
    GivenAway,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Consumed => "consumed",
            Self::Destroyed => "destroyed",
            Self::Lost => "lost",
            Self::GivenAway => "given_away",
        }
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "consumed" => Ok(Self::Consumed),
            "destroyed" => Ok(Self::Destroyed),
            "lost" => Ok(Self::Lost),
            "given_away" => Ok(Self::GivenAway),
            other => Err(DomainError::parse(format!("Unknown item status: '{other}'"))),
        }
    }
}

/// Chapters an active item may go unmentioned before a reminder.
pub const UNUSED_ITEM_THRESHOLD: u32 = 50;

/// One change of hands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipRecord {
    pub owner: String,
    pub chapter: u32,
}

/// A story item under tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedItem {
    pub id: TrackedItemId,
    pub project_id: ProjectId,
    /// Unique within the project, fuzzy-checked on registration.
    pub name: String,
    pub alternate_name: Option<String>,
    pub category: String,
    pub grade: ItemGrade,
    pub effects: Vec<String>,
    pub owner_history: Vec<OwnershipRecord>,
    pub current_owner: String,
    pub status: ItemStatus,
    pub mention_count: u32,
    pub first_mention_chapter: u32,
    pub last_mention_chapter: u32,
    pub estimated_value: Option<String>,
}

impl TrackedItem {
    pub fn new(
        project_id: ProjectId,
        name: impl Into<String>,
        category: impl Into<String>,
        grade: ItemGrade,
        owner: impl Into<String>,
        chapter: u32,
    ) -> Self {
        let owner = owner.into();
        Self {
            id: TrackedItemId::new(),
            project_id,
            name: name.into(),
            alternate_name: None,
            category: category.into(),
            grade,
            effects: vec![],
            owner_history: vec![OwnershipRecord {
                owner: owner.clone(),
                chapter,
            }],
            current_owner: owner,
            status: ItemStatus::Active,
            mention_count: 1,
            first_mention_chapter: chapter,
            last_mention_chapter: chapter,
            estimated_value: None,
        }
    }

    pub fn record_mention(&mut self, chapter: u32) {
        self.mention_count += 1;
        self.last_mention_chapter = self.last_mention_chapter.max(chapter);
    }

    pub fn transfer_to(&mut self, owner: impl Into<String>, chapter: u32) {
        let owner = owner.into();
        self.owner_history.push(OwnershipRecord {
            owner: owner.clone(),
            chapter,
        });
        self.current_owner = owner;
        self.record_mention(chapter);
    }

    /// Active but unmentioned for longer than the threshold.
    pub fn is_forgotten(&self, current_chapter: u32, threshold: u32) -> bool {
        self.status == ItemStatus::Active
            && current_chapter.saturating_sub(self.last_mention_chapter) > threshold
    }

    /// Whether the item's grade exceeds what its debut chapter allows.
    pub fn grade_too_early(&self, total_chapters: u32) -> bool {
        self.grade > ItemGrade::max_for_chapter(self.first_mention_chapter, total_chapters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_schedule_starts_mortal_ends_immortal() {
        assert_eq!(ItemGrade::max_for_chapter(1, 1000), ItemGrade::Pham);
        assert_eq!(ItemGrade::max_for_chapter(1000, 1000), ItemGrade::Tien);
    }

    #[test]
    fn grade_schedule_is_monotonic() {
        let mut last = ItemGrade::Pham;
        for ch in 1..=1000 {
            let g = ItemGrade::max_for_chapter(ch, 1000);
            assert!(g >= last, "schedule regressed at chapter {ch}");
            last = g;
        }
    }

    #[test]
    fn early_immortal_artifact_flagged() {
        let item = TrackedItem::new(
            ProjectId::new(),
            "Hỗn Độn Chung",
            "pháp bảo",
            ItemGrade::Tien,
            "Hàn Phong",
            12,
        );
        assert!(item.grade_too_early(1000));
    }

    #[test]
    fn forgotten_item_detection() {
        let mut item = TrackedItem::new(
            ProjectId::new(),
            "Huyết Ma Kiếm",
            "vũ khí",
            ItemGrade::Huyen,
            "Hàn Phong",
            10,
        );
        item.record_mention(20);
        assert!(!item.is_forgotten(70, UNUSED_ITEM_THRESHOLD));
        assert!(item.is_forgotten(71, UNUSED_ITEM_THRESHOLD));
        item.status = ItemStatus::Consumed;
        assert!(!item.is_forgotten(500, UNUSED_ITEM_THRESHOLD));
    }

    #[test]
    fn transfer_updates_owner_and_history() {
        let mut item = TrackedItem::new(
            ProjectId::new(),
            "Tụ Linh Đan",
            "đan dược",
            ItemGrade::Hoang,
            "Hàn Phong",
            5,
        );
        item.transfer_to("Lâm Uyển Nhi", 8);
        assert_eq!(item.current_owner, "Lâm Uyển Nhi");
        assert_eq!(item.owner_history.len(), 2);
        assert_eq!(item.last_mention_chapter, 8);
        assert_eq!(item.mention_count, 2);
    }
}
