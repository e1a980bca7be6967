//! Style bible, vocabulary guide and pacing rules.
//!
//! A style bible is either selected by genre from the template registry
//! or supplied custom on the project. The ratio bands are percentage
//! ranges whose midpoints must sum to 100.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Narration point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeStyle {
    FirstPerson,
    ThirdPersonLimited,
    ThirdPersonOmniscient,
}

/// Overall pacing preference for the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingStyle {
    Fast,
    Medium,
    Slow,
}

/// The smallest outlined unit classification, used to pick pacing rules
/// and vocabulary hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneType {
    Action,
    Dialogue,
    Cultivation,
    Exploration,
    Emotional,
    Transition,
}

impl SceneType {
    pub const ALL: [SceneType; 6] = [
        SceneType::Action,
        SceneType::Dialogue,
        SceneType::Cultivation,
        SceneType::Exploration,
        SceneType::Emotional,
        SceneType::Transition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Dialogue => "dialogue",
            Self::Cultivation => "cultivation",
            Self::Exploration => "exploration",
            Self::Emotional => "emotional",
            Self::Transition => "transition",
        }
    }
}

impl std::str::FromStr for SceneType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "action" | "combat" | "fight" => Ok(Self::Action),
            "dialogue" | "conversation" => Ok(Self::Dialogue),
            "cultivation" | "training" => Ok(Self::Cultivation),
            "exploration" | "travel" => Ok(Self::Exploration),
            "emotional" | "romance" => Ok(Self::Emotional),
            "transition" | "bridge" => Ok(Self::Transition),
            other => Err(DomainError::parse(format!("Unknown scene type: '{other}'"))),
        }
    }
}

/// A [min, max] percentage band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioBand {
    pub min: u8,
    pub max: u8,
}

impl RatioBand {
    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    pub fn midpoint(&self) -> f64 {
        f64::from(self.min) + (f64::from(self.max) - f64::from(self.min)) / 2.0
    }
}

/// Prose composition rules for a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleBible {
    pub narrative_voice: String,
    pub narrative_style: NarrativeStyle,
    pub dialogue_ratio: RatioBand,
    pub description_ratio: RatioBand,
    pub inner_ratio: RatioBand,
    pub action_ratio: RatioBand,
    pub pacing: PacingStyle,
    /// Verbatim bullets injected into prompts.
    pub genre_conventions: Vec<String>,
}

impl StyleBible {
    /// Ratio-band midpoints must sum to 100 (within rounding slack).
    pub fn validate(&self) -> Result<(), DomainError> {
        let total = self.dialogue_ratio.midpoint()
            + self.description_ratio.midpoint()
            + self.inner_ratio.midpoint()
            + self.action_ratio.midpoint();
        if (total - 100.0).abs() > 1.0 {
            return Err(DomainError::validation(format!(
                "Ratio band midpoints must sum to 100, got {total}"
            )));
        }
        Ok(())
    }
}

/// Genre vocabulary injected into Writer prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyGuide {
    /// Honorific by relation (e.g. "tiền bối" for seniors).
    pub honorifics: Vec<(String, String)>,
    /// Stock expressions for power and cultivation.
    pub power_expressions: Vec<String>,
    /// Emotion vocabulary.
    pub emotions: Vec<String>,
    /// Atmosphere and scenery vocabulary.
    pub atmosphere: Vec<String>,
}

/// Per-scene-type pacing rule. Built statically by the template
/// registry, never deserialized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PacingRule {
    pub scene_type: SceneType,
    /// Target sentence length in words.
    pub sentence_length: (u8, u8),
    /// Target paragraph length in sentences.
    pub paragraph_length: (u8, u8),
    /// Dialogue share band for this scene type.
    pub dialogue_ratio: RatioBand,
    /// Information density hint (free text used in prompts).
    pub density: &'static str,
    /// Pace descriptor used in prompts.
    pub pace: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bible() -> StyleBible {
        StyleBible {
            narrative_voice: "sắc bén, giàu nhịp điệu".to_string(),
            narrative_style: NarrativeStyle::ThirdPersonLimited,
            dialogue_ratio: RatioBand::new(30, 40),
            description_ratio: RatioBand::new(20, 30),
            inner_ratio: RatioBand::new(10, 20),
            action_ratio: RatioBand::new(20, 30),
            pacing: PacingStyle::Fast,
            genre_conventions: vec![],
        }
    }

    #[test]
    fn valid_bands_pass() {
        assert!(bible().validate().is_ok());
    }

    #[test]
    fn unbalanced_bands_fail() {
        let mut b = bible();
        b.dialogue_ratio = RatioBand::new(60, 80);
        assert!(b.validate().is_err());
    }

    #[test]
    fn midpoint_math() {
        assert_eq!(RatioBand::new(30, 40).midpoint(), 35.0);
        assert_eq!(RatioBand::new(0, 0).midpoint(), 0.0);
    }
}
