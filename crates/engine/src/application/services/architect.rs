//! Architect agent: turns story state into a validated chapter outline.

use std::sync::Arc;

use serde::Deserialize;

use crate::application::services::llm::json_clean::parse_lenient;
use crate::application::services::llm::prompt_builder::{build_architect_prompt, ArchitectContext};
use crate::application::services::llm::AgentLlm;
use crate::application::services::style::StyleRegistry;
use crate::infrastructure::error::FactoryError;
use storyforge_domain::{
    BeatType, ChapterOutline, DopaminePoint, DopamineType, EmotionalArc, Project, SceneOutline,
    SceneType, StoryArc, TaskKind, WorldBible,
};

pub const ARCHITECT_TEMPERATURE: f32 = 0.3;
const ARCHITECT_MAX_TOKENS: u32 = 3000;

/// Inputs gathered by the runner for one planning call.
pub struct PlanningInput<'a> {
    pub project: &'a Project,
    pub world: &'a WorldBible,
    pub arc: Option<&'a StoryArc>,
    pub chapter_number: u32,
    pub previous_summaries: Vec<(u32, String)>,
    pub arc_summary: Option<String>,
    pub rag_snippets: Vec<String>,
    pub suggested_beats: Vec<BeatType>,
    pub avoid_beats: Vec<BeatType>,
    pub rewrite_instructions: Option<String>,
}

pub struct Architect {
    llm: AgentLlm,
    registry: Arc<StyleRegistry>,
}

impl Architect {
    pub fn new(llm: AgentLlm, registry: Arc<StyleRegistry>) -> Self {
        Self { llm, registry }
    }

    /// Produce a normalized, validated outline. A malformed response is
    /// retried once before failing with `JsonParseFailed`.
    pub async fn plan(&self, input: &PlanningInput<'_>) -> Result<ChapterOutline, FactoryError> {
        let style = self.registry.style(input.project.genre);
        let ctx = ArchitectContext {
            chapter_number: input.chapter_number,
            genre: input.project.genre,
            target_words: input.project.target_chapter_words,
            world: input.world,
            style,
            arc: input.arc,
            previous_summaries: &input.previous_summaries,
            arc_summary: input.arc_summary.as_deref(),
            rag_snippets: &input.rag_snippets,
            suggested_beats: &input.suggested_beats,
            avoid_beats: &input.avoid_beats,
            cliffhangers: self.registry.cliffhanger_techniques(),
            rewrite_instructions: input.rewrite_instructions.as_deref(),
        };
        let (system, prompt) = build_architect_prompt(&ctx);

        let mut last_error = String::new();
        for attempt in 0..2 {
            let response = self
                .llm
                .call(
                    input.project.id,
                    TaskKind::Outline,
                    system.clone(),
                    prompt.clone(),
                    ARCHITECT_TEMPERATURE,
                    ARCHITECT_MAX_TOKENS,
                    true,
                )
                .await?;

            match parse_lenient::<RawOutline>(&response.content) {
                Ok(raw) => {
                    let mut outline = raw.into_outline(
                        input.chapter_number,
                        input.project.target_chapter_words,
                    );
                    outline.normalize();
                    rescale_overweight(&mut outline);
                    outline.validate().map_err(FactoryError::from)?;
                    return Ok(outline);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "Architect returned malformed outline JSON"
                    );
                    last_error = e;
                }
            }
        }
        Err(FactoryError::JsonParseFailed(format!(
            "architect outline: {last_error}"
        )))
    }
}

/// Scene estimates more than 20% above target are scaled back down; the
/// under-target case is handled by `ChapterOutline::normalize`.
fn rescale_overweight(outline: &mut ChapterOutline) {
    let estimated = outline.estimated_words();
    if estimated > outline.target_word_count * 6 / 5 && estimated > 0 {
        let target = outline.target_word_count;
        for scene in &mut outline.scenes {
            scene.estimated_words =
                (u64::from(scene.estimated_words) * u64::from(target) / u64::from(estimated)) as u32;
        }
    }
}

// =============================================================================
// Raw response shape (unknown fields discarded, missing fields defaulted)
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOutline {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    pov_character: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    scenes: Vec<RawScene>,
    #[serde(default)]
    tension_level: Option<u8>,
    #[serde(default)]
    dopamine_points: Vec<RawDopamine>,
    #[serde(default)]
    emotional_arc: Option<EmotionalArc>,
    #[serde(default)]
    cliffhanger: Option<String>,
    #[serde(default)]
    target_word_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScene {
    #[serde(default)]
    order: Option<u32>,
    #[serde(default)]
    setting: Option<String>,
    #[serde(default)]
    characters: Vec<String>,
    #[serde(default)]
    goal: Option<String>,
    #[serde(default)]
    conflict: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    estimated_words: Option<u32>,
    #[serde(default)]
    scene_type: Option<String>,
    #[serde(default)]
    dopamine_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDopamine {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    setup: Option<String>,
    #[serde(default)]
    payoff: Option<String>,
    #[serde(default)]
    intensity: Option<u8>,
}

impl RawOutline {
    fn into_outline(self, chapter_number: u32, default_target: u32) -> ChapterOutline {
        let scenes = self
            .scenes
            .into_iter()
            .enumerate()
            .map(|(idx, raw)| SceneOutline {
                order: raw.order.unwrap_or(idx as u32 + 1),
                setting: raw.setting.unwrap_or_default(),
                characters: raw.characters,
                goal: raw.goal.unwrap_or_default(),
                conflict: raw.conflict.unwrap_or_default(),
                resolution: raw.resolution.unwrap_or_default(),
                estimated_words: raw.estimated_words.unwrap_or(0),
                scene_type: raw.scene_type.and_then(|s| s.parse::<SceneType>().ok()),
                dopamine_type: raw.dopamine_type.and_then(|s| s.parse::<DopamineType>().ok()),
            })
            .collect();

        let dopamine_points = self
            .dopamine_points
            .into_iter()
            .filter_map(|raw| {
                Some(DopaminePoint {
                    kind: raw.kind?.parse::<DopamineType>().ok()?,
                    setup: raw.setup.unwrap_or_default(),
                    payoff: raw.payoff.unwrap_or_default(),
                    intensity: raw.intensity.unwrap_or(5).clamp(1, 10),
                })
            })
            .collect();

        ChapterOutline {
            chapter_number,
            title: self
                .title
                .unwrap_or_else(|| format!("Chương {chapter_number}")),
            summary: self.summary.unwrap_or_default(),
            pov_character: self.pov_character.unwrap_or_default(),
            location: self.location.unwrap_or_default(),
            scenes,
            tension_level: self.tension_level.unwrap_or(50).min(100),
            dopamine_points,
            emotional_arc: self.emotional_arc.unwrap_or_default(),
            cliffhanger: self.cliffhanger.unwrap_or_default(),
            target_word_count: self.target_word_count.unwrap_or(default_target),
        }
    }
}
