//! Genre taxonomy.
//!
//! The genre selects a style bible, a power system, dopamine patterns
//! and pacing defaults from the static template registry. The slugs are
//! the Vietnamese web-novel categories the factory serves.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Enumerated style family for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenreType {
    /// Immortal cultivation (tu tiên)
    TienHiep,
    /// Eastern fantasy with looser power rules
    HuyenHuyen,
    /// Modern urban with hidden masters
    DoThi,
    /// Martial-arts jianghu
    KiemHiep,
    /// Game-world / system progression
    VongDu,
    /// Court intrigue and transmigration
    CungDau,
}

impl GenreType {
    pub const ALL: [GenreType; 6] = [
        GenreType::TienHiep,
        GenreType::HuyenHuyen,
        GenreType::DoThi,
        GenreType::KiemHiep,
        GenreType::VongDu,
        GenreType::CungDau,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TienHiep => "tien-hiep",
            Self::HuyenHuyen => "huyen-huyen",
            Self::DoThi => "do-thi",
            Self::KiemHiep => "kiem-hiep",
            Self::VongDu => "vong-du",
            Self::CungDau => "cung-dau",
        }
    }

    /// Whether the genre permits an immediate-revenge opening in chapter 1.
    ///
    /// Golden-chapter rules forbid it everywhere else.
    pub fn permits_immediate_revenge(&self) -> bool {
        matches!(self, Self::DoThi | Self::VongDu)
    }
}

impl std::fmt::Display for GenreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GenreType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tien-hiep" | "tienhiep" | "tien_hiep" => Ok(Self::TienHiep),
            "huyen-huyen" | "huyenhuyen" | "huyen_huyen" => Ok(Self::HuyenHuyen),
            "do-thi" | "dothi" | "do_thi" => Ok(Self::DoThi),
            "kiem-hiep" | "kiemhiep" | "kiem_hiep" => Ok(Self::KiemHiep),
            "vong-du" | "vongdu" | "vong_du" => Ok(Self::VongDu),
            "cung-dau" | "cungdau" | "cung_dau" => Ok(Self::CungDau),
            other => Err(DomainError::parse(format!("Unknown genre: '{other}'"))),
        }
    }
}
