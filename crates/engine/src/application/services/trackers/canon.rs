//! Canon resolver: extraction, conflict checking and ingestion of story
//! facts.
//!
//! Conflict policy: a new hard fact contradicting an existing hard fact
//! blocks the chapter; a new hard fact overrides prior soft/retractable
//! facts on the same ground; soft conflicts warn; retractable facts
//! expire after 20 chapters without reinforcement.

use serde::Deserialize;
use std::str::FromStr;

use crate::application::services::llm::json_clean::parse_lenient;
use crate::application::services::llm::prompt_builder::build_extraction_prompt;
use crate::application::services::llm::AgentLlm;
use crate::infrastructure::persistence::CanonRepo;
use crate::infrastructure::ports::RepoError;
use storyforge_domain::{CanonCategory, CanonFact, CanonLevel, ProjectId, TaskKind};

const EXTRACTION_TEMPERATURE: f32 = 0.1;
const EXTRACTION_MAX_TOKENS: u32 = 1200;

/// Outcome of checking candidate facts against the store.
#[derive(Debug, Default)]
pub struct CanonCheck {
    /// Hard-vs-hard contradiction; blocks the chapter.
    pub hard_conflict: Option<String>,
    /// Soft conflicts; warn only.
    pub warnings: Vec<String>,
}

pub struct CanonResolver {
    repo: CanonRepo,
    llm: AgentLlm,
}

impl CanonResolver {
    pub fn new(repo: CanonRepo, llm: AgentLlm) -> Self {
        Self { repo, llm }
    }

    /// Extract candidate facts from chapter prose via the small tier.
    /// Extraction failures are not fatal; they yield an empty candidate
    /// list.
    pub async fn extract(
        &self,
        project: ProjectId,
        chapter: u32,
        content: &str,
    ) -> Vec<CanonFact> {
        let (system, prompt) = build_extraction_prompt(chapter, content);
        let response = match self
            .llm
            .call(
                project,
                TaskKind::Extraction,
                system,
                prompt,
                EXTRACTION_TEMPERATURE,
                EXTRACTION_MAX_TOKENS,
                false,
            )
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, chapter, "Canon extraction call failed");
                return vec![];
            }
        };

        let raw: RawExtraction = match parse_lenient(&response.content) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, chapter, "Canon extraction returned bad JSON");
                return vec![];
            }
        };

        raw.facts
            .into_iter()
            .filter_map(|f| {
                let level = CanonLevel::from_str(&f.level.unwrap_or_default()).ok()?;
                let category = CanonCategory::from_str(&f.category.unwrap_or_default()).ok()?;
                let statement = f.statement?;
                if statement.trim().is_empty() {
                    return None;
                }
                Some(CanonFact::new(
                    project,
                    chapter,
                    level,
                    category,
                    f.entities,
                    statement,
                    f.confidence.unwrap_or(0.5),
                ))
            })
            .collect()
    }

    /// Gate-side check: would these candidates contradict the store?
    pub async fn check(
        &self,
        project: ProjectId,
        current_chapter: u32,
        candidates: &[CanonFact],
    ) -> Result<CanonCheck, RepoError> {
        let existing = self.live_facts(project, current_chapter).await?;
        let mut check = CanonCheck::default();

        for candidate in candidates {
            for fact in &existing {
                if !contradicts(candidate, fact) {
                    continue;
                }
                match (candidate.level, fact.level) {
                    (CanonLevel::Hard, CanonLevel::Hard) => {
                        check.hard_conflict = Some(format!(
                            "\"{}\" contradicts established canon \"{}\" (chapter {})",
                            candidate.statement, fact.statement, fact.chapter_introduced
                        ));
                        return Ok(check);
                    }
                    (_, CanonLevel::Hard) | (_, CanonLevel::Soft) => {
                        check.warnings.push(format!(
                            "\"{}\" conflicts with {} fact \"{}\"",
                            candidate.statement,
                            fact.level.as_str(),
                            fact.statement
                        ));
                    }
                    _ => {}
                }
            }
        }
        Ok(check)
    }

    /// Commit candidates after approval. Re-ingesting the facts of an
    /// already-processed chapter only reinforces; it creates nothing new.
    /// Returns the number of newly inserted facts.
    pub async fn commit(
        &self,
        project: ProjectId,
        chapter: u32,
        candidates: Vec<CanonFact>,
    ) -> Result<u32, RepoError> {
        let existing = self.live_facts(project, chapter).await?;
        let mut inserted = 0u32;

        for candidate in candidates {
            // Duplicate statement: reinforce instead of insert.
            if let Some(duplicate) = existing
                .iter()
                .find(|f| same_statement(f, &candidate))
            {
                self.repo.reinforce(duplicate.id, chapter).await?;
                continue;
            }

            // A new hard fact overrides conflicting weaker facts.
            if candidate.level == CanonLevel::Hard {
                for fact in &existing {
                    if fact.level != CanonLevel::Hard && contradicts(&candidate, fact) {
                        tracing::debug!(
                            overridden = %fact.statement,
                            by = %candidate.statement,
                            "Hard fact overrides weaker canon"
                        );
                        self.repo.delete(fact.id).await?;
                    }
                }
            } else if existing
                .iter()
                .any(|f| f.level == CanonLevel::Hard && contradicts(&candidate, f))
            {
                // Weaker candidates lose against established hard canon.
                continue;
            }

            self.repo.insert(&candidate).await?;
            inserted += 1;
        }
        Ok(inserted)
    }

    /// Live (non-expired) facts at the given chapter.
    async fn live_facts(
        &self,
        project: ProjectId,
        current_chapter: u32,
    ) -> Result<Vec<CanonFact>, RepoError> {
        Ok(self
            .repo
            .list(project)
            .await?
            .into_iter()
            .filter(|f| !f.is_expired(current_chapter))
            .collect())
    }

    /// Drop expired retractable facts from the store.
    pub async fn expire(&self, project: ProjectId, current_chapter: u32) -> Result<u32, RepoError> {
        let mut removed = 0;
        for fact in self.repo.list(project).await? {
            if fact.is_expired(current_chapter) {
                self.repo.delete(fact.id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Whether a revival fact exists for a character (used by the
    /// dead-character check).
    pub async fn has_revival_fact(
        &self,
        project: ProjectId,
        character: &str,
    ) -> Result<bool, RepoError> {
        let facts = self.repo.list(project).await?;
        Ok(facts.iter().any(|f| {
            f.entities.iter().any(|e| e == character)
                && is_revival_statement(&f.statement)
        }))
    }

    pub async fn rollback_chapter(
        &self,
        project: ProjectId,
        chapter: u32,
    ) -> Result<u64, RepoError> {
        self.repo.delete_for_chapter(project, chapter).await
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn same_statement(a: &CanonFact, b: &CanonFact) -> bool {
    a.category == b.category && normalize(&a.statement) == normalize(&b.statement)
}

/// Deterministic contradiction test. Single-valued categories (power
/// level, location, relationship) contradict when they assert different
/// statements about the same entity; additive categories (traits, items,
/// world rules, events) only contradict on explicit negation.
fn contradicts(a: &CanonFact, b: &CanonFact) -> bool {
    if a.category != b.category {
        return false;
    }
    let shared_entity = a.entities.iter().any(|e| b.entities.contains(e));
    if !shared_entity {
        return false;
    }
    if same_statement(a, b) {
        return false;
    }
    match a.category {
        CanonCategory::PowerLevel | CanonCategory::Location | CanonCategory::Relationship => true,
        CanonCategory::CharacterTrait
        | CanonCategory::WorldRule
        | CanonCategory::Item
        | CanonCategory::Event => negates(&a.statement, &b.statement),
    }
}

/// Crude negation heuristic: one statement embeds the other's core with
/// a Vietnamese negation marker.
fn negates(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    const NEGATIONS: [&str; 4] = ["không", "chưa từng", "chẳng", "không hề"];
    let a_negated = NEGATIONS.iter().any(|n| a.contains(n));
    let b_negated = NEGATIONS.iter().any(|n| b.contains(n));
    if a_negated == b_negated {
        return false;
    }
    let (negated, plain) = if a_negated { (&a, &b) } else { (&b, &a) };
    // The negated statement must reference most of the plain one's words.
    let plain_words: Vec<&str> = plain.split_whitespace().collect();
    if plain_words.is_empty() {
        return false;
    }
    let covered = plain_words
        .iter()
        .filter(|w| negated.contains(*w))
        .count();
    covered * 2 >= plain_words.len()
}

/// Statements that bring a character back from the dead.
fn is_revival_statement(statement: &str) -> bool {
    let s = normalize(statement);
    ["hồi sinh", "sống lại", "phục sinh", "trùng sinh"]
        .iter()
        .any(|marker| s.contains(marker))
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    facts: Vec<RawFact>,
}

#[derive(Debug, Deserialize)]
struct RawFact {
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    statement: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::cost::CostGovernor;
    use crate::application::services::llm::test_support::ScriptedLlm;
    use crate::infrastructure::config::{BudgetConfig, TierModels};
    use crate::infrastructure::persistence::{CostRepo, Database};
    use std::sync::Arc;

    async fn resolver(llm: Arc<ScriptedLlm>) -> CanonResolver {
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
        CanonResolver::new(
            CanonRepo::new(db.pool().clone()),
            AgentLlm::new(llm, Arc::new(governor)),
        )
    }

    fn fact(
        project: ProjectId,
        chapter: u32,
        level: CanonLevel,
        category: CanonCategory,
        entity: &str,
        statement: &str,
    ) -> CanonFact {
        CanonFact::new(
            project,
            chapter,
            level,
            category,
            vec![entity.to_string()],
            statement,
            0.9,
        )
    }

    #[tokio::test]
    async fn hard_vs_hard_conflict_blocks() {
        let r = resolver(Arc::new(ScriptedLlm::new(vec![]))).await;
        let project = ProjectId::new();
        let established = fact(
            project,
            7,
            CanonLevel::Hard,
            CanonCategory::PowerLevel,
            "Hàn Phong",
            "Hàn Phong đang ở Luyện Khí tầng chín",
        );
        r.commit(project, 7, vec![established]).await.expect("commit");

        let candidate = fact(
            project,
            9,
            CanonLevel::Hard,
            CanonCategory::PowerLevel,
            "Hàn Phong",
            "Hàn Phong đang ở Nguyên Anh sơ kỳ",
        );
        let check = r.check(project, 9, &[candidate]).await.expect("check");
        assert!(check.hard_conflict.is_some());
    }

    #[tokio::test]
    async fn hard_overrides_soft_on_commit() {
        let r = resolver(Arc::new(ScriptedLlm::new(vec![]))).await;
        let project = ProjectId::new();
        r.commit(
            project,
            3,
            vec![fact(
                project,
                3,
                CanonLevel::Soft,
                CanonCategory::Location,
                "Hàn Phong",
                "Hàn Phong đang ở Vân Lai Thành",
            )],
        )
        .await
        .expect("commit soft");

        let inserted = r
            .commit(
                project,
                8,
                vec![fact(
                    project,
                    8,
                    CanonLevel::Hard,
                    CanonCategory::Location,
                    "Hàn Phong",
                    "Hàn Phong đang ở Lạc Nhật Sơn Mạch",
                )],
            )
            .await
            .expect("commit hard");
        assert_eq!(inserted, 1);

        // Only the hard fact survives.
        let check = r
            .check(
                project,
                9,
                &[fact(
                    project,
                    9,
                    CanonLevel::Soft,
                    CanonCategory::Location,
                    "Hàn Phong",
                    "Hàn Phong đang ở Vân Lai Thành",
                )],
            )
            .await
            .expect("check");
        assert!(check.hard_conflict.is_none());
        assert_eq!(check.warnings.len(), 1, "soft conflict with surviving hard fact");
    }

    #[tokio::test]
    async fn reingestion_creates_no_new_facts() {
        let r = resolver(Arc::new(ScriptedLlm::new(vec![]))).await;
        let project = ProjectId::new();
        let statement = "Vương Hổ chết tại Lạc Nhật Sơn";
        let make = || {
            fact(
                project,
                7,
                CanonLevel::Hard,
                CanonCategory::Event,
                "Vương Hổ",
                statement,
            )
        };

        assert_eq!(r.commit(project, 7, vec![make()]).await.expect("first"), 1);
        assert_eq!(
            r.commit(project, 7, vec![make()]).await.expect("second"),
            0,
            "round-trip yields no new facts"
        );
    }

    #[tokio::test]
    async fn retractable_facts_expire() {
        let r = resolver(Arc::new(ScriptedLlm::new(vec![]))).await;
        let project = ProjectId::new();
        r.commit(
            project,
            5,
            vec![fact(
                project,
                5,
                CanonLevel::Retractable,
                CanonCategory::CharacterTrait,
                "Lâm Uyển Nhi",
                "Lâm Uyển Nhi có vẻ che giấu thân phận",
            )],
        )
        .await
        .expect("commit");

        assert_eq!(r.expire(project, 20).await.expect("expire"), 0);
        assert_eq!(r.expire(project, 26).await.expect("expire"), 1);
    }

    #[tokio::test]
    async fn revival_fact_detected() {
        let r = resolver(Arc::new(ScriptedLlm::new(vec![]))).await;
        let project = ProjectId::new();
        assert!(!r
            .has_revival_fact(project, "Vương Hổ")
            .await
            .expect("check"));

        r.commit(
            project,
            30,
            vec![fact(
                project,
                30,
                CanonLevel::Hard,
                CanonCategory::Event,
                "Vương Hổ",
                "Vương Hổ hồi sinh nhờ Huyết Ma Đại Pháp",
            )],
        )
        .await
        .expect("commit");
        assert!(r.has_revival_fact(project, "Vương Hổ").await.expect("check"));
    }

    #[tokio::test]
    async fn extraction_parses_model_output() {
        let json = r#"{"facts": [
            {"level": "hard", "category": "event", "entities": ["Vương Hổ"],
             "statement": "Vương Hổ chết dưới kiếm Hàn Phong", "confidence": 0.9},
            {"level": "bogus", "category": "event", "entities": [], "statement": "bị loại"}
        ]}"#;
        let r = resolver(Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text(json)]))).await;
        let facts = r.extract(ProjectId::new(), 7, "nội dung chương").await;
        assert_eq!(facts.len(), 1, "invalid levels are discarded");
        assert_eq!(facts[0].level, CanonLevel::Hard);
    }

    #[test]
    fn negation_heuristic() {
        assert!(negates(
            "hàn phong không có linh căn",
            "hàn phong có linh căn"
        ));
        assert!(!negates(
            "hàn phong có linh căn hỏa",
            "hàn phong có linh căn băng"
        ));
    }
}
