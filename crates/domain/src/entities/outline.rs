//! Chapter outline - the Architect agent's plan for one chapter.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::{DopamineType, SceneType};

/// One planned scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneOutline {
    pub order: u32,
    pub setting: String,
    pub characters: Vec<String>,
    pub goal: String,
    pub conflict: String,
    pub resolution: String,
    pub estimated_words: u32,
    #[serde(default)]
    pub scene_type: Option<SceneType>,
    #[serde(default)]
    pub dopamine_type: Option<DopamineType>,
}

/// A planned reader-payoff moment with setup and payoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DopaminePoint {
    #[serde(rename = "type")]
    pub kind: DopamineType,
    pub setup: String,
    pub payoff: String,
    /// 1-10.
    pub intensity: u8,
}

/// Emotional waypoints across the chapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionalArc {
    pub opening: String,
    pub midpoint: String,
    pub climax: String,
    pub closing: String,
}

/// The validated plan the Writer agent realizes into prose.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterOutline {
    pub chapter_number: u32,
    pub title: String,
    pub summary: String,
    pub pov_character: String,
    pub location: String,
    pub scenes: Vec<SceneOutline>,
    /// Planned tension 0-100.
    pub tension_level: u8,
    pub dopamine_points: Vec<DopaminePoint>,
    pub emotional_arc: EmotionalArc,
    pub cliffhanger: String,
    pub target_word_count: u32,
}

/// Hard minimum scenes per chapter; outlines below this are padded.
pub const MIN_SCENES: usize = 3;
/// Recommended scenes per chapter.
pub const RECOMMENDED_SCENES: usize = 4;

impl ChapterOutline {
    /// Minimum scene count the Architect is instructed to produce:
    /// `max(4, ceil(target / 600))`.
    pub fn required_scene_count(target_words: u32) -> usize {
        (RECOMMENDED_SCENES).max(target_words.div_ceil(600) as usize)
    }

    /// Per-scene word target for an even split.
    pub fn per_scene_words(target_words: u32, scene_count: usize) -> u32 {
        target_words / scene_count.max(1) as u32
    }

    /// Sum of scene word estimates.
    pub fn estimated_words(&self) -> u32 {
        self.scenes.iter().map(|s| s.estimated_words).sum()
    }

    /// Dominant scene type, by estimated word share.
    pub fn dominant_scene_type(&self) -> SceneType {
        let mut totals: std::collections::HashMap<SceneType, u32> = std::collections::HashMap::new();
        for scene in &self.scenes {
            if let Some(t) = scene.scene_type {
                *totals.entry(t).or_insert(0) += scene.estimated_words;
            }
        }
        totals
            .into_iter()
            .max_by_key(|(_, words)| *words)
            .map(|(t, _)| t)
            .unwrap_or(SceneType::Dialogue)
    }

    /// Normalize an outline fresh from the Architect:
    ///
    /// - fewer than [`MIN_SCENES`] scenes: pad with empty placeholder
    ///   scenes so the Writer always has a full structure;
    /// - scene word estimates summing below 80% of target: redistribute
    ///   the shortfall uniformly.
    pub fn normalize(&mut self) {
        while self.scenes.len() < MIN_SCENES {
            let order = self.scenes.len() as u32 + 1;
            self.scenes.push(SceneOutline {
                order,
                setting: self.location.clone(),
                characters: vec![self.pov_character.clone()],
                goal: String::new(),
                conflict: String::new(),
                resolution: String::new(),
                estimated_words: 0,
                scene_type: None,
                dopamine_type: None,
            });
        }

        let estimated = self.estimated_words();
        let floor = self.target_word_count * 4 / 5;
        if estimated < floor {
            let shortfall = self.target_word_count - estimated;
            let per_scene = shortfall / self.scenes.len() as u32;
            let mut remainder = shortfall % self.scenes.len() as u32;
            for scene in &mut self.scenes {
                scene.estimated_words += per_scene;
                if remainder > 0 {
                    scene.estimated_words += 1;
                    remainder -= 1;
                }
            }
        }

        for (idx, scene) in self.scenes.iter_mut().enumerate() {
            scene.order = idx as u32 + 1;
        }
    }

    /// Structural validation after normalization.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.scenes.len() < MIN_SCENES {
            return Err(DomainError::validation(format!(
                "Outline needs at least {MIN_SCENES} scenes, got {}",
                self.scenes.len()
            )));
        }
        if self.target_word_count == 0 {
            return Err(DomainError::validation("Outline target word count is zero"));
        }
        let estimated = self.estimated_words();
        let diff = estimated.abs_diff(self.target_word_count);
        if diff * 5 > self.target_word_count {
            return Err(DomainError::validation(format!(
                "Scene estimates ({estimated}) deviate more than 20% from target ({})",
                self.target_word_count
            )));
        }
        for point in &self.dopamine_points {
            if !(1..=10).contains(&point.intensity) {
                return Err(DomainError::validation(format!(
                    "Dopamine intensity must be 1-10, got {}",
                    point.intensity
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(order: u32, words: u32) -> SceneOutline {
        SceneOutline {
            order,
            setting: "Vân Lai Thành".to_string(),
            characters: vec!["Hàn Phong".to_string()],
            goal: "tìm dược liệu".to_string(),
            conflict: "bị chặn đường".to_string(),
            resolution: "ra tay áp chế".to_string(),
            estimated_words: words,
            scene_type: Some(SceneType::Action),
            dopamine_type: None,
        }
    }

    fn outline(scenes: Vec<SceneOutline>, target: u32) -> ChapterOutline {
        ChapterOutline {
            chapter_number: 5,
            title: "Sóng Gió Vân Lai".to_string(),
            summary: "Hàn Phong vào thành".to_string(),
            pov_character: "Hàn Phong".to_string(),
            location: "Vân Lai Thành".to_string(),
            scenes,
            tension_level: 60,
            dopamine_points: vec![],
            emotional_arc: EmotionalArc::default(),
            cliffhanger: "một bóng đen xuất hiện".to_string(),
            target_word_count: target,
        }
    }

    #[test]
    fn required_scene_count_scales_with_target() {
        assert_eq!(ChapterOutline::required_scene_count(2000), 4);
        assert_eq!(ChapterOutline::required_scene_count(2500), 5);
        assert_eq!(ChapterOutline::required_scene_count(5000), 9);
        // Small chapters still demand the recommended minimum.
        assert_eq!(ChapterOutline::required_scene_count(1000), 4);
    }

    #[test]
    fn normalize_pads_missing_scenes() {
        let mut o = outline(vec![scene(1, 2500)], 2500);
        o.normalize();
        assert_eq!(o.scenes.len(), MIN_SCENES);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn normalize_redistributes_underweight_estimates() {
        let mut o = outline(vec![scene(1, 300), scene(2, 300), scene(3, 300)], 2500);
        o.normalize();
        assert_eq!(o.estimated_words(), 2500);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn validate_rejects_large_deviation() {
        let o = outline(vec![scene(1, 500), scene(2, 500), scene(3, 500)], 2500);
        assert!(o.validate().is_err());
    }

    #[test]
    fn dominant_scene_type_by_word_share() {
        let mut scenes = vec![scene(1, 400), scene(2, 400)];
        scenes[1].scene_type = Some(SceneType::Cultivation);
        scenes[1].estimated_words = 1700;
        let o = outline(scenes, 2100);
        assert_eq!(o.dominant_scene_type(), SceneType::Cultivation);
    }

    #[test]
    fn intensity_out_of_band_rejected() {
        let mut o = outline(vec![scene(1, 900), scene(2, 800), scene(3, 800)], 2500);
        o.dopamine_points.push(DopaminePoint {
            kind: DopamineType::FaceSlap,
            setup: "khiêu khích".to_string(),
            payoff: "nghiền ép".to_string(),
            intensity: 11,
        });
        assert!(o.validate().is_err());
    }
}
