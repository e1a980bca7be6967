//! Writer agent: realizes an outline into prose with length enforcement.

use std::sync::Arc;

use crate::application::services::llm::prompt_builder::{
    build_continuation_prompt, build_writer_prompt,
};
use crate::application::services::llm::AgentLlm;
use crate::application::services::style::StyleRegistry;
use crate::infrastructure::error::FactoryError;
use crate::infrastructure::ports::FinishReason;
use storyforge_domain::common::word_count;
use storyforge_domain::{ChapterOutline, Project, TaskKind, WorldBible};

pub const WRITER_TEMPERATURE: f32 = 0.8;
/// Continuations allowed per chapter, a hard cap.
pub const MAX_CONTINUATIONS: u32 = 3;
/// Below this ratio a continuation is requested.
pub const CONTINUATION_RATIO: f64 = 0.7;
/// Below this ratio the draft is marked for rewrite.
pub const REWRITE_FLOOR_RATIO: f64 = 0.6;

/// Writer output plus the continuation bookkeeping the gate needs.
#[derive(Debug, Clone)]
pub struct Draft {
    pub content: String,
    pub word_count: u32,
    pub continuations_used: u32,
    /// Still under 0.6 x target after all continuations.
    pub below_floor: bool,
}

pub struct Writer {
    llm: AgentLlm,
    registry: Arc<StyleRegistry>,
}

impl Writer {
    pub fn new(llm: AgentLlm, registry: Arc<StyleRegistry>) -> Self {
        Self { llm, registry }
    }

    pub async fn write(
        &self,
        project: &Project,
        world: &WorldBible,
        outline: &ChapterOutline,
    ) -> Result<Draft, FactoryError> {
        let style = self.registry.style(project.genre);
        let dominant = outline.dominant_scene_type();
        let vocabulary = self.registry.vocabulary(project.genre, dominant);
        let pacing = self.registry.pacing_rule(dominant);
        let exemplars = self.registry.exemplars(dominant);

        // Voice guide restricted to characters appearing this chapter.
        let appearing: Vec<String> = outline
            .scenes
            .iter()
            .flat_map(|s| s.characters.iter().cloned())
            .collect();
        let voice_guide = world.relationships_for(&appearing);

        let (system, prompt) = build_writer_prompt(
            outline,
            style,
            &vocabulary,
            &voice_guide,
            &pacing,
            exemplars,
        );

        let max_tokens = outline.target_word_count * 2;
        let response = self
            .llm
            .call(
                project.id,
                TaskKind::Writing,
                system,
                prompt,
                project.temperature.clamp(0.0, 1.0),
                max_tokens,
                true,
            )
            .await?;

        let mut content = postprocess(&response.content);
        let mut finish_reason = response.finish_reason;
        let mut continuations = 0u32;

        let target = outline.target_word_count;
        while continuations < MAX_CONTINUATIONS {
            let words = word_count(&content) as u32;
            let needs_more = finish_reason == FinishReason::Length
                || f64::from(words) < f64::from(target) * CONTINUATION_RATIO;
            if !needs_more {
                break;
            }

            let remaining = target.saturating_sub(words).max(200);
            let (cont_system, cont_prompt) = build_continuation_prompt(&content, remaining);
            let cont_response = self
                .llm
                .call(
                    project.id,
                    TaskKind::Continuation,
                    cont_system,
                    cont_prompt,
                    WRITER_TEMPERATURE,
                    remaining * 2,
                    true,
                )
                .await?;

            let addition = postprocess(&cont_response.content);
            if !addition.is_empty() {
                content.push_str("\n\n");
                content.push_str(&addition);
            }
            finish_reason = cont_response.finish_reason;
            continuations += 1;
        }

        let words = word_count(&content) as u32;
        Ok(Draft {
            below_floor: f64::from(words) < f64::from(target) * REWRITE_FLOOR_RATIO,
            content,
            word_count: words,
            continuations_used: continuations,
        })
    }
}

/// Strip residual markup and collapse runs of blank lines.
pub fn postprocess(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let mut cleaned = line.trim_end().to_string();
        // Markdown headers and blockquotes
        while cleaned.starts_with('#') || cleaned.starts_with('>') {
            cleaned = cleaned[1..].trim_start().to_string();
        }
        // Emphasis and code markers
        cleaned = cleaned.replace("**", "").replace("__", "").replace('`', "");
        // Horizontal rules become blank lines
        if cleaned.chars().all(|c| c == '-' || c == '*' || c == '=') && cleaned.len() >= 3 {
            cleaned.clear();
        }
        lines.push(cleaned);
    }

    // Collapse blank-line runs
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut blank_run = 0usize;
    for line in lines {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push(String::new());
        } else {
            blank_run = 0;
            out.push(line);
        }
    }

    out.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::cost::CostGovernor;
    use crate::application::services::llm::test_support::ScriptedLlm;
    use crate::infrastructure::config::{BudgetConfig, TierModels};
    use crate::infrastructure::persistence::{CostRepo, Database};
    use chrono::Utc;
    use storyforge_domain::{
        DopaminePoint, EmotionalArc, GenreType, Protagonist, SceneOutline, SceneType, UserId,
    };

    async fn agent_llm(llm: Arc<ScriptedLlm>) -> AgentLlm {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        let governor = CostGovernor::new(
            CostRepo::new(db.pool().clone()),
            BudgetConfig {
                daily_usd: 100.0,
                session_usd: 100.0,
            },
            TierModels {
                small: "s".into(),
                medium: "m".into(),
                large: "l".into(),
            },
        );
        AgentLlm::new(llm, Arc::new(governor))
    }

    fn project() -> Project {
        Project::new(
            UserId::new(),
            "Kiếm Đạo Độc Tôn",
            GenreType::TienHiep,
            100,
            1000,
            Utc::now(),
        )
        .expect("project")
    }

    fn world(p: &Project) -> WorldBible {
        WorldBible {
            project_id: p.id,
            story_title: p.title.clone(),
            power_system: StyleRegistry::new().power_system(p.genre).clone(),
            protagonist: Protagonist {
                name: "Hàn Phong".to_string(),
                realm: "Luyện Khí".to_string(),
                level: 1,
                traits: vec![],
                abilities: vec![],
                inventory: vec![],
                goals: vec![],
                status: "alive".to_string(),
            },
            npc_relationships: vec![],
            locations: vec![],
            plot_threads: vec![],
            foreshadowing: vec![],
            world_rules: vec![],
        }
    }

    fn outline(target: u32) -> ChapterOutline {
        ChapterOutline {
            chapter_number: 2,
            title: "Thí Luyện".to_string(),
            summary: "thử thách".to_string(),
            pov_character: "Hàn Phong".to_string(),
            location: "tông môn".to_string(),
            scenes: vec![
                SceneOutline {
                    order: 1,
                    setting: "sân luyện".to_string(),
                    characters: vec!["Hàn Phong".to_string()],
                    goal: "qua vòng loại".to_string(),
                    conflict: "đối thủ mạnh".to_string(),
                    resolution: "thắng sát nút".to_string(),
                    estimated_words: target / 3,
                    scene_type: Some(SceneType::Action),
                    dopamine_type: None,
                },
                SceneOutline {
                    order: 2,
                    setting: "hậu viện".to_string(),
                    characters: vec!["Hàn Phong".to_string()],
                    goal: "hồi phục".to_string(),
                    conflict: "nội thương".to_string(),
                    resolution: "ổn định".to_string(),
                    estimated_words: target / 3,
                    scene_type: Some(SceneType::Cultivation),
                    dopamine_type: None,
                },
                SceneOutline {
                    order: 3,
                    setting: "đại điện".to_string(),
                    characters: vec!["Hàn Phong".to_string()],
                    goal: "nhận thưởng".to_string(),
                    conflict: "bị ganh ghét".to_string(),
                    resolution: "nhận pháp khí".to_string(),
                    estimated_words: target - 2 * (target / 3),
                    scene_type: Some(SceneType::Dialogue),
                    dopamine_type: None,
                },
            ],
            tension_level: 60,
            dopamine_points: vec![DopaminePoint {
                kind: storyforge_domain::DopamineType::Recognition,
                setup: "bị xem nhẹ".to_string(),
                payoff: "được trưởng lão chú ý".to_string(),
                intensity: 6,
            }],
            emotional_arc: EmotionalArc::default(),
            cliffhanger: "pháp khí rung lên bất thường".to_string(),
            target_word_count: target,
        }
    }

    fn words(n: usize) -> String {
        vec!["chữ"; n].join(" ")
    }

    #[tokio::test]
    async fn full_length_draft_needs_no_continuation() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text(&words(1050))]));
        let llm_ref = Arc::clone(&llm);
        let writer = Writer::new(agent_llm(llm).await, Arc::new(StyleRegistry::new()));
        let p = project();
        let w = world(&p);

        let draft = writer.write(&p, &w, &outline(1000)).await.expect("draft");
        assert_eq!(draft.continuations_used, 0);
        assert!(!draft.below_floor);
        assert_eq!(llm_ref.request_count(), 1);
    }

    #[tokio::test]
    async fn truncated_draft_triggers_continuation() {
        // 600 of 1000 words (60%), finishReason=length -> one continuation
        // bringing the total to 92%.
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::truncated(&words(600)),
            ScriptedLlm::text(&words(320)),
        ]));
        let llm_ref = Arc::clone(&llm);
        let writer = Writer::new(agent_llm(llm).await, Arc::new(StyleRegistry::new()));
        let p = project();
        let w = world(&p);

        let draft = writer.write(&p, &w, &outline(1000)).await.expect("draft");
        assert_eq!(draft.continuations_used, 1);
        assert_eq!(draft.word_count, 920);
        assert!(!draft.below_floor);
        assert_eq!(llm_ref.request_count(), 2);
    }

    #[tokio::test]
    async fn continuations_hard_cap_at_three() {
        // The model keeps returning tiny truncated fragments.
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::truncated(&words(100)),
            ScriptedLlm::truncated(&words(50)),
            ScriptedLlm::truncated(&words(50)),
            ScriptedLlm::truncated(&words(50)),
            ScriptedLlm::truncated(&words(50)),
        ]));
        let llm_ref = Arc::clone(&llm);
        let writer = Writer::new(agent_llm(llm).await, Arc::new(StyleRegistry::new()));
        let p = project();
        let w = world(&p);

        let draft = writer.write(&p, &w, &outline(1000)).await.expect("draft");
        assert_eq!(draft.continuations_used, MAX_CONTINUATIONS);
        assert!(draft.below_floor, "250 of 1000 words is under the 0.6 floor");
        assert_eq!(llm_ref.request_count(), 1 + MAX_CONTINUATIONS as usize);
    }

    #[test]
    fn postprocess_strips_markup_and_collapses_blanks() {
        let raw = "# Chương 2\n\n\n\n**Hàn Phong** bước vào sân.\n\n---\n\n> Lời dẫn\n`đoạn mã`";
        let cleaned = postprocess(raw);
        assert!(!cleaned.contains('#'));
        assert!(!cleaned.contains("**"));
        assert!(!cleaned.contains('`'));
        assert!(!cleaned.contains('>'));
        assert!(!cleaned.contains("\n\n\n"));
        assert!(cleaned.contains("Hàn Phong bước vào sân."));
    }
}
