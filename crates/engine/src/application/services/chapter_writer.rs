//! Chapter writer: the Architect -> Writer -> Critic pipeline with the
//! quality gate and auto-rewrite loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::services::architect::{Architect, PlanningInput};
use crate::application::services::critic::{Critic, CriticReport};
use crate::application::services::quality_gate::{GateOutcome, GateSeverity, QualityGate};
use crate::application::services::title::TitleChecker;
use crate::application::services::trackers::{CanonResolver, ConsistencyChecker, PowerTracker};
use crate::application::services::writer::{Draft, Writer};
use crate::infrastructure::error::FactoryError;
use storyforge_domain::{
    BeatType, CanonFact, ChapterOutline, ConsistencyIssue, Project, StoryArc, WorldBible,
};

/// Cooperative cancellation flag shared with the runner. Checked between
/// agent calls; an in-flight LLM call finishes but its result is
/// discarded once cancellation is observed.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives progress updates after each agent step.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: u8, step: &str);
}

/// A sink that drops everything (tests, batch preflight).
pub struct NullProgress;

#[async_trait]
impl ProgressSink for NullProgress {
    async fn report(&self, _percent: u8, _step: &str) {}
}

/// Context the runner assembles before a pipeline run.
pub struct ChapterContext {
    pub arc: Option<StoryArc>,
    pub previous_summaries: Vec<(u32, String)>,
    pub arc_summary: Option<String>,
    pub rag_snippets: Vec<String>,
    pub suggested_beats: Vec<BeatType>,
    pub avoid_beats: Vec<BeatType>,
    pub prior_titles: Vec<String>,
}

/// Everything the runner needs to persist one produced chapter.
pub struct ChapterDraftResult {
    pub outline: ChapterOutline,
    pub title: String,
    pub content: String,
    pub word_count: u32,
    pub critic: CriticReport,
    pub gate: GateOutcome,
    pub retry_count: u32,
    pub continuations_used: u32,
    pub approved: bool,
    /// Facts extracted from the approved draft, ready to commit.
    pub candidate_facts: Vec<CanonFact>,
    pub consistency_issues: Vec<ConsistencyIssue>,
}

/// Pipeline outcome: a draft, or observed cancellation.
pub enum PipelineOutcome {
    Completed(Box<ChapterDraftResult>),
    Cancelled,
}

pub struct ChapterWriter {
    architect: Architect,
    writer: Writer,
    critic: Critic,
    gate: QualityGate,
    titles: TitleChecker,
    canon: Arc<CanonResolver>,
    consistency: Arc<ConsistencyChecker>,
    power: Arc<PowerTracker>,
    max_retries: u32,
}

impl ChapterWriter {
    pub fn new(
        architect: Architect,
        writer: Writer,
        critic: Critic,
        gate: QualityGate,
        canon: Arc<CanonResolver>,
        consistency: Arc<ConsistencyChecker>,
        power: Arc<PowerTracker>,
        max_retries: u32,
    ) -> Self {
        Self {
            architect,
            writer,
            critic,
            gate,
            titles: TitleChecker::new(),
            canon,
            consistency,
            power,
            max_retries,
        }
    }

    /// Produce one chapter draft through the full pipeline. The retry
    /// loop reruns Architect and Writer with targeted instructions; on
    /// final failure the last draft is returned unapproved so the caller
    /// can store it for inspection.
    pub async fn produce(
        &self,
        project: &Project,
        world: &WorldBible,
        chapter_number: u32,
        context: &ChapterContext,
        cancel: &CancelFlag,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineOutcome, FactoryError> {
        let mut rewrite_instructions: Option<String> = None;
        let mut last: Option<ChapterDraftResult> = None;

        for attempt in 0..=self.max_retries {
            if cancel.is_cancelled() {
                return Ok(PipelineOutcome::Cancelled);
            }
            if attempt > 0 {
                tracing::info!(chapter = chapter_number, attempt, "Rewrite iteration");
            }

            // --- Architect ---
            let input = PlanningInput {
                project,
                world,
                arc: context.arc.as_ref(),
                chapter_number,
                previous_summaries: context.previous_summaries.clone(),
                arc_summary: context.arc_summary.clone(),
                rag_snippets: context.rag_snippets.clone(),
                suggested_beats: context.suggested_beats.clone(),
                avoid_beats: context.avoid_beats.clone(),
                rewrite_instructions: rewrite_instructions.clone(),
            };
            let outline = self.architect.plan(&input).await?;
            progress.report(30, "architect").await;
            if cancel.is_cancelled() {
                return Ok(PipelineOutcome::Cancelled);
            }

            // --- Writer (with continuations) ---
            let draft: Draft = self.writer.write(project, world, &outline).await?;
            progress.report(70, "writer").await;
            if cancel.is_cancelled() {
                return Ok(PipelineOutcome::Cancelled);
            }

            // --- Title diversity ---
            let mut title = self
                .titles
                .optimize(&outline.title, &context.prior_titles, &draft.content);
            if self.titles.score(&title, &context.prior_titles).hard_reject {
                // Last resort when no candidate cleared the duplicate
                // check: disambiguate with the chapter number.
                title = format!("Chương {chapter_number}: {title}");
            }

            // --- Canon and consistency signals ---
            let candidate_facts = self
                .canon
                .extract(project.id, chapter_number, &draft.content)
                .await;
            let canon_check = self
                .canon
                .check(project.id, chapter_number, &candidate_facts)
                .await
                .unwrap_or_default();
            let consistency_issues = match self
                .consistency
                .check_draft(
                    project.id,
                    chapter_number,
                    &draft.content,
                    world,
                    &self.canon,
                    &self.power,
                )
                .await
            {
                Ok(issues) => issues,
                Err(e) => {
                    tracing::warn!(error = %e, "Consistency check failed; continuing without it");
                    vec![]
                }
            };

            // --- Critic ---
            let critic = self
                .critic
                .review(project.id, &outline, &draft.content)
                .await;
            progress.report(90, "critic").await;
            if cancel.is_cancelled() {
                return Ok(PipelineOutcome::Cancelled);
            }

            // --- Gate ---
            let gate = self.gate.evaluate(
                &outline,
                &title,
                &draft.content,
                &critic,
                &consistency_issues,
                &canon_check,
            );

            let result = ChapterDraftResult {
                approved: gate.approved,
                retry_count: attempt,
                continuations_used: draft.continuations_used,
                word_count: draft.word_count,
                outline,
                title,
                content: draft.content,
                critic,
                gate,
                candidate_facts,
                consistency_issues,
            };

            if result.approved {
                return Ok(PipelineOutcome::Completed(Box::new(result)));
            }

            match result.gate.severity {
                Some(GateSeverity::Fatal) => {
                    // Canon conflicts and critical consistency issues are
                    // not retried; they surface with the draft attached.
                    return Ok(PipelineOutcome::Completed(Box::new(result)));
                }
                _ => {
                    rewrite_instructions = Some(build_rewrite_note(&result));
                    last = Some(result);
                }
            }
        }

        let result = last.ok_or_else(|| {
            FactoryError::ValidationFailed("pipeline produced no draft".to_string())
        })?;
        Ok(PipelineOutcome::Completed(Box::new(result)))
    }
}

/// The Architect's "additional instructions" for the next attempt: the
/// prior word count plus the gate's targeted instructions.
fn build_rewrite_note(result: &ChapterDraftResult) -> String {
    let mut note = format!(
        "Bản trước đạt {} chữ trên mục tiêu {} chữ.\n",
        result.word_count, result.outline.target_word_count
    );
    if let Some(instructions) = &result.gate.rewrite_instructions {
        note.push_str(instructions);
    }
    if let Some(extra) = &result.critic.rewrite_instructions {
        note.push_str(extra);
    }
    note
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Full pipeline fixture over in-memory storage and a scripted LLM.

    use std::sync::Arc;

    use super::*;
    use crate::application::services::cost::CostGovernor;
    use crate::application::services::llm::test_support::ScriptedLlm;
    use crate::application::services::llm::AgentLlm;
    use crate::application::services::quality_gate::GateThresholds;
    use crate::application::services::style::StyleRegistry;
    use crate::infrastructure::config::{BudgetConfig, TierModels};
    use crate::infrastructure::persistence::{
        CanonRepo, CharacterRepo, CostRepo, Database, IssueRepo,
    };
    use crate::infrastructure::ports::LlmResponse;
    use chrono::Utc;
    use storyforge_domain::{GenreType, Protagonist, UserId};

    pub struct PipelineFixture {
        pub writer: ChapterWriter,
        pub project: Project,
        pub world: WorldBible,
        pub characters: CharacterRepo,
        pub db: Database,
    }

    pub async fn fixture(responses: Vec<LlmResponse>) -> PipelineFixture {
        fixture_with_budget(responses, 100.0).await
    }

    pub async fn fixture_with_budget(
        responses: Vec<LlmResponse>,
        budget_usd: f64,
    ) -> PipelineFixture {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        let governor = Arc::new(CostGovernor::new(
            CostRepo::new(db.pool().clone()),
            BudgetConfig {
                daily_usd: budget_usd,
                session_usd: budget_usd,
            },
            TierModels {
                small: "s".into(),
                medium: "m".into(),
                large: "l".into(),
            },
        ));
        let llm = AgentLlm::new(Arc::new(ScriptedLlm::new(responses)), governor);
        let registry = Arc::new(StyleRegistry::new());
        let characters = CharacterRepo::new(db.pool().clone());

        let canon = Arc::new(CanonResolver::new(
            CanonRepo::new(db.pool().clone()),
            llm.clone(),
        ));
        let consistency = Arc::new(ConsistencyChecker::new(
            characters.clone(),
            IssueRepo::new(db.pool().clone()),
            llm.clone(),
        ));
        let power = Arc::new(PowerTracker::new(characters.clone()));

        let writer = ChapterWriter::new(
            Architect::new(llm.clone(), registry.clone()),
            Writer::new(llm.clone(), registry.clone()),
            Critic::new(llm.clone()),
            QualityGate::new(GateThresholds::default()),
            canon,
            consistency,
            power,
            3,
        );

        let project = Project::new(
            UserId::new(),
            "Kiếm Đạo Độc Tôn",
            GenreType::TienHiep,
            100,
            1000,
            Utc::now(),
        )
        .expect("project");

        let world = WorldBible {
            project_id: project.id,
            story_title: project.title.clone(),
            power_system: StyleRegistry::new().power_system(project.genre).clone(),
            protagonist: Protagonist {
                name: "Hàn Phong".to_string(),
                realm: "Luyện Khí".to_string(),
                level: 1,
                traits: vec![],
                abilities: vec![],
                inventory: vec![],
                goals: vec!["báo thù".to_string()],
                status: "alive".to_string(),
            },
            npc_relationships: vec![],
            locations: vec![],
            plot_threads: vec![],
            foreshadowing: vec![],
            world_rules: vec![],
        };

        PipelineFixture {
            writer,
            project,
            world,
            characters,
            db,
        }
    }

    pub fn empty_context() -> ChapterContext {
        ChapterContext {
            arc: None,
            previous_summaries: vec![],
            arc_summary: None,
            rag_snippets: vec![],
            suggested_beats: vec![],
            avoid_beats: vec![],
            prior_titles: vec![],
        }
    }

    /// Outline JSON for a 1000-word chapter with four scenes.
    pub fn outline_json(title: &str) -> String {
        format!(
            r#"{{
              "title": "{title}",
              "summary": "Hàn Phong vượt vòng loại",
              "povCharacter": "Hàn Phong",
              "location": "Vân Lai Thành",
              "scenes": [
                {{"order": 1, "setting": "sân luyện", "characters": ["Hàn Phong"], "goal": "vào trận", "conflict": "đối thủ khiêu khích", "resolution": "ra đòn", "estimatedWords": 250, "sceneType": "action"}},
                {{"order": 2, "setting": "khán đài", "characters": ["Hàn Phong"], "goal": "quan sát", "conflict": "bị dò xét", "resolution": "giữ kín", "estimatedWords": 250, "sceneType": "dialogue"}},
                {{"order": 3, "setting": "hậu trường", "characters": ["Hàn Phong"], "goal": "hồi phục", "conflict": "nội thương", "resolution": "ổn định", "estimatedWords": 250, "sceneType": "cultivation"}},
                {{"order": 4, "setting": "đài chính", "characters": ["Hàn Phong"], "goal": "thắng trận", "conflict": "cường địch", "resolution": "lật kèo", "estimatedWords": 250, "sceneType": "action"}}
              ],
              "tensionLevel": 70,
              "dopaminePoints": [{{"type": "face_slap", "setup": "bị khinh thường", "payoff": "nghiền ép", "intensity": 7}}],
              "emotionalArc": {{"opening": "tĩnh", "midpoint": "căng", "climax": "bùng nổ", "closing": "dư âm"}},
              "cliffhanger": "một tia kiếm khí lạ quét qua khán đài",
              "targetWordCount": 1000
            }}"#
        )
    }

    /// Sensory prose of roughly `n` whitespace-separated words.
    pub fn prose(n: usize) -> String {
        let base = "Hắn nhìn ánh kiếm lóe lên, nghe tiếng gió rít qua tai, hơi lạnh thấm vào da thịt. ";
        let base_words = base.split_whitespace().count();
        let body = base.repeat(n / base_words + 1);
        body.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
    }

    pub fn approving_critic() -> String {
        r#"{"overallScore": 7, "dopamineScore": 7, "pacingScore": 7,
            "issues": [], "approved": true, "requiresRewrite": false}"#
            .to_string()
    }

    /// Empty canon extraction (keeps scripted sequences short).
    pub fn no_facts() -> String {
        r#"{"facts": []}"#.to_string()
    }
}
