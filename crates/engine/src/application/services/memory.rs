//! Memory manager: rolling chapter summaries and arc summaries.

use crate::application::services::llm::prompt_builder::{
    build_arc_summary_prompt, build_summary_prompt,
};
use crate::application::services::llm::AgentLlm;
use crate::infrastructure::persistence::WorldRepo;
use crate::infrastructure::ports::RepoError;
use storyforge_domain::{ArcStatus, ProjectId, StoryArc, TaskKind};

const SUMMARY_TEMPERATURE: f32 = 0.3;
const SUMMARY_MAX_TOKENS: u32 = 400;
const ARC_SUMMARY_MAX_TOKENS: u32 = 900;

/// Chapter summaries fed to the Architect.
pub const CONTEXT_SUMMARY_COUNT: u32 = 3;
/// Arc summaries refresh at arc end or every this many chapters.
const ARC_SUMMARY_CADENCE: u32 = 5;

/// Context bundle for the next chapter's planning call.
#[derive(Debug, Default)]
pub struct WriterContext {
    pub previous_summaries: Vec<(u32, String)>,
    pub arc_summary: Option<String>,
}

pub struct MemoryManager {
    worlds: WorldRepo,
    llm: AgentLlm,
}

impl MemoryManager {
    pub fn new(worlds: WorldRepo, llm: AgentLlm) -> Self {
        Self { worlds, llm }
    }

    /// Summarize a finished chapter into one paragraph. Best effort: on
    /// failure a mechanical fallback summary is stored instead.
    pub async fn summarize_chapter(
        &self,
        project: ProjectId,
        chapter: u32,
        content: &str,
    ) -> Result<String, RepoError> {
        let (system, prompt) = build_summary_prompt(chapter, content);
        let summary = match self
            .llm
            .call(
                project,
                TaskKind::Summarization,
                system,
                prompt,
                SUMMARY_TEMPERATURE,
                SUMMARY_MAX_TOKENS,
                false,
            )
            .await
        {
            Ok(response) if !response.content.trim().is_empty() => {
                response.content.trim().to_string()
            }
            Ok(_) | Err(_) => {
                tracing::warn!(chapter, "Chapter summary fell back to head excerpt");
                fallback_summary(content)
            }
        };

        self.worlds
            .upsert_chapter_summary(project, chapter, &summary)
            .await?;
        Ok(summary)
    }

    /// Refresh the arc summary at the arc boundary or every five
    /// chapters within it.
    pub async fn maybe_update_arc_summary(
        &self,
        project: ProjectId,
        arc: &StoryArc,
        chapter: u32,
    ) -> Result<(), RepoError> {
        let at_arc_end = chapter == arc.end_chapter;
        let on_cadence = (chapter - arc.start_chapter + 1) % ARC_SUMMARY_CADENCE == 0;
        if !at_arc_end && !on_cadence {
            return Ok(());
        }

        let summaries = self
            .worlds
            .recent_summaries(project, chapter, chapter - arc.start_chapter + 1)
            .await?;
        if summaries.is_empty() {
            return Ok(());
        }

        let (system, prompt) = build_arc_summary_prompt(&arc.title, &summaries);
        let summary = match self
            .llm
            .call(
                project,
                TaskKind::Summarization,
                system,
                prompt,
                SUMMARY_TEMPERATURE,
                ARC_SUMMARY_MAX_TOKENS,
                false,
            )
            .await
        {
            Ok(response) if !response.content.trim().is_empty() => {
                response.content.trim().to_string()
            }
            Ok(_) | Err(_) => summaries
                .iter()
                .map(|(n, s)| format!("Chương {n}: {s}"))
                .collect::<Vec<_>>()
                .join("\n"),
        };

        let status = if at_arc_end {
            ArcStatus::Completed
        } else {
            ArcStatus::InProgress
        };
        self.worlds
            .update_arc_status(project, arc.number, status, Some(&summary))
            .await
    }

    /// The writer context for chapter `n`: last three chapter summaries
    /// plus the current arc summary. Older chapters reach the prompt
    /// only through retrieval.
    pub async fn writer_context(
        &self,
        project: ProjectId,
        chapter: u32,
        arc: Option<&StoryArc>,
    ) -> Result<WriterContext, RepoError> {
        let previous_summaries = if chapter > 1 {
            self.worlds
                .recent_summaries(project, chapter - 1, CONTEXT_SUMMARY_COUNT)
                .await?
        } else {
            vec![]
        };
        Ok(WriterContext {
            previous_summaries,
            arc_summary: arc.and_then(|a| a.summary.clone()),
        })
    }

    pub async fn rollback_chapter(&self, project: ProjectId, chapter: u32) {
        if let Err(e) = self.worlds.delete_chapter_summary(project, chapter).await {
            tracing::warn!(error = %e, chapter, "Failed to roll back chapter summary");
        }
    }
}

/// Head excerpt used when summarization is unavailable.
fn fallback_summary(content: &str) -> String {
    let head: String = content.chars().take(300).collect();
    format!("{head}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::cost::CostGovernor;
    use crate::application::services::llm::test_support::ScriptedLlm;
    use crate::infrastructure::config::{BudgetConfig, TierModels};
    use crate::infrastructure::persistence::{CostRepo, Database};
    use std::sync::Arc;
    use storyforge_domain::ArcTheme;

    async fn manager(llm: Arc<ScriptedLlm>) -> (MemoryManager, WorldRepo, ProjectId) {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        let governor = Arc::new(CostGovernor::new(
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
        ));
        let worlds = WorldRepo::new(db.pool().clone());
        (
            MemoryManager::new(worlds.clone(), AgentLlm::new(llm, governor)),
            worlds,
            ProjectId::new(),
        )
    }

    #[tokio::test]
    async fn summaries_feed_writer_context() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text("tóm tắt chương")]));
        let (manager, _, project) = manager(llm).await;

        for chapter in 1..=4u32 {
            manager
                .summarize_chapter(project, chapter, "nội dung chương dài")
                .await
                .expect("summary");
        }

        let context = manager
            .writer_context(project, 5, None)
            .await
            .expect("context");
        assert_eq!(
            context.previous_summaries.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            vec![2, 3, 4],
            "last three summaries, oldest first"
        );
    }

    #[tokio::test]
    async fn chapter_one_has_empty_context() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let (manager, _, project) = manager(llm).await;
        let context = manager.writer_context(project, 1, None).await.expect("context");
        assert!(context.previous_summaries.is_empty());
        assert!(context.arc_summary.is_none());
    }

    #[tokio::test]
    async fn failed_summary_falls_back_to_excerpt() {
        // No scripted responses: every call errors.
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let (manager, worlds, project) = manager(llm).await;

        let summary = manager
            .summarize_chapter(project, 1, "Hàn Phong vung kiếm.")
            .await
            .expect("summary");
        assert!(summary.starts_with("Hàn Phong vung kiếm."));

        let stored = worlds.recent_summaries(project, 1, 1).await.expect("load");
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn arc_summary_written_at_cadence_and_end() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text("tóm tắt arc")]));
        let (manager, worlds, project) = manager(llm).await;
        let arc = StoryArc::new(project, 1, "Khởi Đầu", ArcTheme::Foundation, 1, 10).expect("arc");
        worlds.insert_arc(&arc).await.expect("insert");
        manager
            .summarize_chapter(project, 5, "nội dung")
            .await
            .expect("summary");

        // Chapter 5 is on the 5-chapter cadence.
        manager
            .maybe_update_arc_summary(project, &arc, 5)
            .await
            .expect("update");
        let arcs = worlds.list_arcs(project).await.expect("arcs");
        assert_eq!(arcs[0].summary.as_deref(), Some("tóm tắt arc"));
        assert_eq!(arcs[0].status, ArcStatus::InProgress);

        // Chapter 10 closes the arc.
        manager
            .maybe_update_arc_summary(project, &arc, 10)
            .await
            .expect("update");
        let arcs = worlds.list_arcs(project).await.expect("arcs");
        assert_eq!(arcs[0].status, ArcStatus::Completed);

        // Chapter 7 is neither cadence nor end: no-op.
        manager
            .maybe_update_arc_summary(project, &arc, 7)
            .await
            .expect("update");
    }
}
