//! Story arc entity - a contiguous chapter range with a tension curve.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{ArcId, ProjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcTheme {
    Foundation,
    Conflict,
    Growth,
    Revelation,
    Triumph,
}

impl ArcTheme {
    pub const ALL: [ArcTheme; 5] = [
        ArcTheme::Foundation,
        ArcTheme::Conflict,
        ArcTheme::Growth,
        ArcTheme::Revelation,
        ArcTheme::Triumph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Foundation => "foundation",
            Self::Conflict => "conflict",
            Self::Growth => "growth",
            Self::Revelation => "revelation",
            Self::Triumph => "triumph",
        }
    }
}

impl std::str::FromStr for ArcTheme {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "foundation" => Ok(Self::Foundation),
            "conflict" => Ok(Self::Conflict),
            "growth" => Ok(Self::Growth),
            "revelation" => Ok(Self::Revelation),
            "triumph" => Ok(Self::Triumph),
            other => Err(DomainError::parse(format!("Unknown arc theme: '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcStatus {
    Planned,
    InProgress,
    Completed,
}

impl ArcStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl std::str::FromStr for ArcStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(DomainError::parse(format!("Unknown arc status: '{other}'"))),
        }
    }
}

/// A contiguous range of chapters sharing a theme and a tension curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryArc {
    pub id: ArcId,
    pub project_id: ProjectId,
    pub number: u32,
    pub title: String,
    pub theme: ArcTheme,
    pub start_chapter: u32,
    pub end_chapter: u32,
    pub climax_chapter: u32,
    /// One tension value (0-100) per chapter of the arc.
    pub tension_curve: Vec<u8>,
    pub status: ArcStatus,
    pub summary: Option<String>,
}

impl StoryArc {
    pub fn new(
        project_id: ProjectId,
        number: u32,
        title: impl Into<String>,
        theme: ArcTheme,
        start_chapter: u32,
        end_chapter: u32,
    ) -> Result<Self, DomainError> {
        if start_chapter == 0 || end_chapter < start_chapter {
            return Err(DomainError::validation(format!(
                "Invalid arc range [{start_chapter}, {end_chapter}]"
            )));
        }
        let len = end_chapter - start_chapter + 1;
        // Climax lands at roughly 3/4 of the arc.
        let climax_chapter = start_chapter + (len * 3 / 4).min(len - 1);
        Ok(Self {
            id: ArcId::new(),
            project_id,
            number,
            title: title.into(),
            theme,
            start_chapter,
            end_chapter,
            climax_chapter,
            tension_curve: build_tension_curve(start_chapter, end_chapter, climax_chapter),
            status: ArcStatus::Planned,
            summary: None,
        })
    }

    pub fn len(&self) -> u32 {
        self.end_chapter - self.start_chapter + 1
    }

    pub fn is_empty(&self) -> bool {
        false // an arc always spans at least one chapter
    }

    pub fn contains(&self, chapter: u32) -> bool {
        (self.start_chapter..=self.end_chapter).contains(&chapter)
    }

    /// Planned tension (0-100) for a chapter of this arc.
    pub fn tension_at(&self, chapter: u32) -> Option<u8> {
        if !self.contains(chapter) {
            return None;
        }
        self.tension_curve
            .get((chapter - self.start_chapter) as usize)
            .copied()
    }
}

/// Tension rises from a low opening to 100 at the climax, then falls for
/// the cooldown chapters.
fn build_tension_curve(start: u32, end: u32, climax: u32) -> Vec<u8> {
    let len = (end - start + 1) as usize;
    let climax_idx = (climax - start) as usize;
    let mut curve = Vec::with_capacity(len);
    for i in 0..len {
        let tension = if i <= climax_idx {
            if climax_idx == 0 {
                100.0
            } else {
                30.0 + 70.0 * (i as f64 / climax_idx as f64)
            }
        } else {
            let fall_len = (len - 1 - climax_idx) as f64;
            100.0 - 60.0 * ((i - climax_idx) as f64 / fall_len)
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        curve.push(tension.round().clamp(0.0, 100.0) as u8);
    }
    curve
}

/// Partition `[1, total_chapters]` into arcs of roughly `chapters_per_arc`
/// chapters, cycling through the theme progression.
pub fn plan_arc_ranges(total_chapters: u32, chapters_per_arc: u32) -> Vec<(u32, u32, ArcTheme)> {
    let per_arc = chapters_per_arc.max(1);
    let mut ranges = Vec::new();
    let mut start = 1u32;
    let mut idx = 0usize;
    while start <= total_chapters {
        let end = (start + per_arc - 1).min(total_chapters);
        let theme = ArcTheme::ALL[idx % ArcTheme::ALL.len()];
        ranges.push((start, end, theme));
        start = end + 1;
        idx += 1;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arcs_partition_chapter_space() {
        for total in [10u32, 57, 100, 2000] {
            let ranges = plan_arc_ranges(total, 20);
            assert_eq!(ranges[0].0, 1);
            assert_eq!(ranges.last().expect("nonempty").1, total);
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].1 + 1, pair[1].0, "ranges must be contiguous");
            }
        }
    }

    #[test]
    fn minimum_project_gets_single_arc() {
        let ranges = plan_arc_ranges(10, 20);
        assert_eq!(ranges, vec![(1, 10, ArcTheme::Foundation)]);
    }

    #[test]
    fn tension_peaks_at_climax_then_falls() {
        let arc = StoryArc::new(ProjectId::new(), 1, "Lạc Nhật Sơn Mạch", ArcTheme::Conflict, 1, 20)
            .expect("arc");
        let climax_tension = arc.tension_at(arc.climax_chapter).expect("in range");
        assert_eq!(climax_tension, 100);
        for ch in arc.start_chapter..arc.climax_chapter {
            assert!(arc.tension_at(ch).expect("in range") <= climax_tension);
        }
        assert!(arc.tension_at(arc.end_chapter).expect("in range") < 100);
        assert_eq!(arc.tension_curve.len() as u32, arc.len());
    }

    #[test]
    fn invalid_range_rejected() {
        assert!(StoryArc::new(ProjectId::new(), 1, "x", ArcTheme::Growth, 5, 4).is_err());
        assert!(StoryArc::new(ProjectId::new(), 1, "x", ArcTheme::Growth, 0, 4).is_err());
    }

    #[test]
    fn single_chapter_arc_is_valid() {
        let arc =
            StoryArc::new(ProjectId::new(), 1, "x", ArcTheme::Triumph, 7, 7).expect("arc");
        assert_eq!(arc.tension_curve.len(), 1);
        assert_eq!(arc.climax_chapter, 7);
    }
}
