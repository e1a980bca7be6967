//! Consistency checker: cross-chapter character-state validation of a
//! draft before the gate decides.

use serde::Deserialize;

use crate::application::services::llm::json_clean::parse_lenient;
use crate::application::services::llm::prompt_builder::build_trait_check_prompt;
use crate::application::services::llm::AgentLlm;
use crate::application::services::trackers::canon::CanonResolver;
use crate::application::services::trackers::power::PowerTracker;
use crate::infrastructure::persistence::{CharacterRepo, IssueRepo};
use crate::infrastructure::ports::RepoError;
use storyforge_domain::{
    CanonCategory, CanonFact, CharacterState, CharacterStatus, ConsistencyIssue, IssueKind,
    IssueSeverity, NpcRole, ProjectId, WorldBible,
};

/// Cues that make a dead character's appearance legitimate.
const FLASHBACK_CUES: [&str; 6] = [
    "nhớ lại",
    "hồi tưởng",
    "ký ức",
    "trong mơ",
    "năm đó",
    "di ngôn",
];

/// Markers of one character helping another.
const HELP_MARKERS: [&str; 5] = ["cứu", "giúp", "đỡ", "che chở", "bảo vệ"];

/// Markers that an explanation accompanies the help.
const EXPLANATION_MARKERS: [&str; 5] = ["vì", "bởi", "do ", "hóa ra", "thì ra"];

/// Markers of a breakthrough happening on the page.
const BREAKTHROUGH_MARKERS: [&str; 3] = ["đột phá", "phá cảnh", "thăng cấp cảnh giới"];

const TRAIT_CHECK_TEMPERATURE: f32 = 0.1;
const TRAIT_CHECK_MAX_TOKENS: u32 = 300;

pub struct ConsistencyChecker {
    characters: CharacterRepo,
    issues: IssueRepo,
    llm: AgentLlm,
}

impl ConsistencyChecker {
    pub fn new(characters: CharacterRepo, issues: IssueRepo, llm: AgentLlm) -> Self {
        Self {
            characters,
            issues,
            llm,
        }
    }

    /// Run all checks against a draft. Issues are returned, not yet
    /// persisted; the runner stores them with the gate outcome.
    pub async fn check_draft(
        &self,
        project: ProjectId,
        chapter: u32,
        content: &str,
        world: &WorldBible,
        canon: &CanonResolver,
        power: &PowerTracker,
    ) -> Result<Vec<ConsistencyIssue>, RepoError> {
        let mut issues = Vec::new();
        let states = self.characters.list_states(project).await?;
        let lowered = content.to_lowercase();

        // Dead characters appearing without a flashback cue.
        for state in states.iter().filter(|s| s.status == CharacterStatus::Dead) {
            if let Some(fragment) = appearance_without_cue(content, &state.name) {
                let revived = canon
                    .has_revival_fact(project, &state.name)
                    .await
                    .unwrap_or(false);
                if !revived {
                    issues.push(
                        ConsistencyIssue::new(
                            project,
                            chapter,
                            IssueKind::DeadCharacterAppearance,
                            IssueSeverity::Critical,
                            format!(
                                "{} chết ở chương {} nhưng xuất hiện không có dấu hiệu hồi tưởng",
                                state.name, state.status_chapter
                            ),
                        )
                        .with_fragment(fragment)
                        .with_fix(format!(
                            "Thêm dấu hiệu hồi tưởng hoặc bỏ sự xuất hiện của {}",
                            state.name
                        )),
                    );
                }
            }
        }

        // Breakthrough cadence.
        if BREAKTHROUGH_MARKERS.iter().any(|m| lowered.contains(m)) {
            let protagonist = &world.protagonist.name;
            if lowered.contains(&protagonist.to_lowercase()) {
                if let Some(problem) = power
                    .cadence_violation(project, protagonist, chapter)
                    .await?
                {
                    issues.push(
                        ConsistencyIssue::new(
                            project,
                            chapter,
                            IssueKind::PowerLevelJump,
                            IssueSeverity::Major,
                            problem,
                        )
                        .with_fix("Giãn nhịp đột phá hoặc thêm tích lũy trước đó".to_string()),
                    );
                }
            }
        }

        // Enemies helping without explanation.
        for rel in world
            .npc_relationships
            .iter()
            .filter(|r| r.role == NpcRole::Enemy)
        {
            if let Some(fragment) = unexplained_help(content, &rel.name) {
                issues.push(
                    ConsistencyIssue::new(
                        project,
                        chapter,
                        IssueKind::RelationshipViolation,
                        IssueSeverity::Moderate,
                        format!("Kẻ địch {} ra tay giúp đỡ mà không có lý do", rel.name),
                    )
                    .with_fragment(fragment),
                );
            }
        }

        // AI-assisted trait contradiction, best effort.
        for state in states.iter().filter(|s| !s.traits.is_empty()) {
            if !content.contains(&state.name) {
                continue;
            }
            if let Some(issue) = self
                .trait_contradiction(project, chapter, state, content)
                .await
            {
                issues.push(issue);
            }
        }

        Ok(issues)
    }

    async fn trait_contradiction(
        &self,
        project: ProjectId,
        chapter: u32,
        state: &CharacterState,
        content: &str,
    ) -> Option<ConsistencyIssue> {
        let traits: Vec<String> = state.traits.iter().map(|t| t.description.clone()).collect();
        let fragment = fragment_around(content, &state.name, 400)?;
        let (system, prompt) = build_trait_check_prompt(&state.name, &traits, &fragment);

        let response = self
            .llm
            .call(
                project,
                storyforge_domain::TaskKind::Classification,
                system,
                prompt,
                TRAIT_CHECK_TEMPERATURE,
                TRAIT_CHECK_MAX_TOKENS,
                false,
            )
            .await
            .ok()?;

        let verdict: TraitVerdict = parse_lenient(&response.content).ok()?;
        if !verdict.contradicts {
            return None;
        }
        Some(
            ConsistencyIssue::new(
                project,
                chapter,
                IssueKind::TraitContradiction,
                IssueSeverity::Major,
                format!(
                    "{} hành xử mâu thuẫn với thiết lập: {}",
                    state.name,
                    verdict.explanation.unwrap_or_default()
                ),
            )
            .with_fragment(fragment),
        )
    }

    /// Persist gate-time issues for later inspection. Best effort.
    pub async fn store_issues(&self, issues: &[ConsistencyIssue]) {
        for issue in issues {
            if let Err(e) = self.issues.insert(issue).await {
                tracing::warn!(error = %e, "Failed to store consistency issue");
            }
        }
    }

    /// Apply committed canon facts to character state: deaths recorded
    /// from death events, new characters registered on first sight.
    pub async fn apply_facts(
        &self,
        project: ProjectId,
        chapter: u32,
        facts: &[CanonFact],
    ) -> Result<(), RepoError> {
        for fact in facts {
            if fact.category != CanonCategory::Event {
                continue;
            }
            let statement = fact.statement.to_lowercase();
            let died = ["chết", "tử vong", "bỏ mạng", "vẫn lạc"]
                .iter()
                .any(|m| statement.contains(m));
            if !died {
                continue;
            }
            for entity in &fact.entities {
                let mut state = self
                    .characters
                    .get_state(project, entity)
                    .await?
                    .unwrap_or_else(|| CharacterState::new(project, entity.clone()));
                state.mark_dead(chapter);
                self.characters.upsert_state(&state).await?;
            }
        }
        Ok(())
    }

    pub async fn rollback_chapter(
        &self,
        project: ProjectId,
        chapter: u32,
    ) -> Result<u64, RepoError> {
        self.issues.delete_for_chapter(project, chapter).await
    }
}

/// First appearance of `name` in a paragraph carrying no flashback cue.
fn appearance_without_cue(content: &str, name: &str) -> Option<String> {
    for paragraph in content.split("\n\n") {
        if !paragraph.contains(name) {
            continue;
        }
        let lowered = paragraph.to_lowercase();
        if FLASHBACK_CUES.iter().any(|cue| lowered.contains(cue)) {
            continue;
        }
        return Some(snippet(paragraph, 200));
    }
    None
}

/// A sentence where `name` helps someone with no explanation marker.
fn unexplained_help(content: &str, name: &str) -> Option<String> {
    for sentence in content.split(['.', '!', '?']) {
        if !sentence.contains(name) {
            continue;
        }
        let lowered = sentence.to_lowercase();
        let helps = HELP_MARKERS.iter().any(|m| lowered.contains(m));
        let explained = EXPLANATION_MARKERS.iter().any(|m| lowered.contains(m));
        if helps && !explained {
            return Some(snippet(sentence.trim(), 200));
        }
    }
    None
}

/// Up to `max_chars` characters of context around the first occurrence
/// of `name`.
fn fragment_around(content: &str, name: &str, max_chars: usize) -> Option<String> {
    let byte_idx = content.find(name)?;
    let char_idx = content[..byte_idx].chars().count();
    let chars: Vec<char> = content.chars().collect();
    let start = char_idx.saturating_sub(max_chars / 2);
    let end = (char_idx + max_chars / 2).min(chars.len());
    Some(chars[start..end].iter().collect())
}

fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Debug, Deserialize)]
struct TraitVerdict {
    #[serde(default)]
    contradicts: bool,
    #[serde(default)]
    explanation: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::cost::CostGovernor;
    use crate::application::services::llm::test_support::ScriptedLlm;
    use crate::infrastructure::config::{BudgetConfig, TierModels};
    use crate::infrastructure::persistence::{CanonRepo, CostRepo, Database};
    use std::sync::Arc;
    use storyforge_domain::{NpcRelationship, Protagonist, PowerRealm, PowerSystem};

    struct Fixture {
        checker: ConsistencyChecker,
        canon: CanonResolver,
        power: PowerTracker,
        characters: CharacterRepo,
        project: ProjectId,
    }

    async fn fixture(llm_responses: Vec<crate::infrastructure::ports::LlmResponse>) -> Fixture {
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
        let llm = AgentLlm::new(Arc::new(ScriptedLlm::new(llm_responses)), governor);
        let characters = CharacterRepo::new(db.pool().clone());
        Fixture {
            checker: ConsistencyChecker::new(
                characters.clone(),
                IssueRepo::new(db.pool().clone()),
                llm.clone(),
            ),
            canon: CanonResolver::new(CanonRepo::new(db.pool().clone()), llm.clone()),
            power: PowerTracker::new(characters.clone()),
            characters,
            project: ProjectId::new(),
        }
    }

    fn world() -> WorldBible {
        WorldBible {
            project_id: ProjectId::new(),
            story_title: "t".to_string(),
            power_system: PowerSystem {
                name: "Cửu Thiên".to_string(),
                realms: vec![PowerRealm {
                    rank: 0,
                    name: "Luyện Khí".to_string(),
                    sub_levels: 9,
                    abilities: vec![],
                    breakthrough_difficulty: String::new(),
                }],
            },
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
            npc_relationships: vec![
                NpcRelationship::new("Lý Thiên Bá", NpcRole::Enemy, -80).expect("valid"),
            ],
            locations: vec![],
            plot_threads: vec![],
            foreshadowing: vec![],
            world_rules: vec![],
        }
    }

    #[tokio::test]
    async fn dead_character_without_cue_is_critical() {
        let f = fixture(vec![]).await;
        let mut state = CharacterState::new(f.project, "Vương Hổ");
        state.mark_dead(7);
        f.characters.upsert_state(&state).await.expect("state");

        let content = "Vương Hổ bước ra từ bóng tối, nở nụ cười lạnh lẽo.";
        let issues = f
            .checker
            .check_draft(f.project, 10, content, &world(), &f.canon, &f.power)
            .await
            .expect("check");

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::DeadCharacterAppearance);
        assert_eq!(issues[0].severity, IssueSeverity::Critical);
        assert!(issues[0].fragment.is_some());
    }

    #[tokio::test]
    async fn flashback_cue_legitimizes_appearance() {
        let f = fixture(vec![]).await;
        let mut state = CharacterState::new(f.project, "Vương Hổ");
        state.mark_dead(7);
        f.characters.upsert_state(&state).await.expect("state");

        let content = "Hàn Phong nhớ lại ngày Vương Hổ còn ngang dọc một phương.";
        let issues = f
            .checker
            .check_draft(f.project, 10, content, &world(), &f.canon, &f.power)
            .await
            .expect("check");
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn revival_fact_legitimizes_appearance() {
        let f = fixture(vec![]).await;
        let mut state = CharacterState::new(f.project, "Vương Hổ");
        state.mark_dead(7);
        f.characters.upsert_state(&state).await.expect("state");
        f.canon
            .commit(
                f.project,
                9,
                vec![CanonFact::new(
                    f.project,
                    9,
                    storyforge_domain::CanonLevel::Hard,
                    CanonCategory::Event,
                    vec!["Vương Hổ".to_string()],
                    "Vương Hổ hồi sinh trong quan tài huyết ngọc",
                    0.9,
                )],
            )
            .await
            .expect("canon");

        let content = "Vương Hổ đứng dậy, thân thể phủ huyết quang.";
        let issues = f
            .checker
            .check_draft(f.project, 10, content, &world(), &f.canon, &f.power)
            .await
            .expect("check");
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn enemy_helping_without_reason_warns() {
        let f = fixture(vec![]).await;
        let content = "Lý Thiên Bá đột nhiên ra tay cứu Hàn Phong khỏi kiếm quang.";
        let issues = f
            .checker
            .check_draft(f.project, 10, content, &world(), &f.canon, &f.power)
            .await
            .expect("check");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::RelationshipViolation);
        assert_eq!(issues[0].severity, IssueSeverity::Moderate);
    }

    #[tokio::test]
    async fn explained_help_passes() {
        let f = fixture(vec![]).await;
        let content =
            "Lý Thiên Bá ra tay cứu Hàn Phong, bởi hắn còn cần con mồi này sống đến đại hội.";
        let issues = f
            .checker
            .check_draft(f.project, 10, content, &world(), &f.canon, &f.power)
            .await
            .expect("check");
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn death_events_update_character_state() {
        let f = fixture(vec![]).await;
        let facts = vec![CanonFact::new(
            f.project,
            12,
            storyforge_domain::CanonLevel::Hard,
            CanonCategory::Event,
            vec!["Lý Thiên Bá".to_string()],
            "Lý Thiên Bá bỏ mạng dưới một kiếm",
            0.9,
        )];
        f.checker
            .apply_facts(f.project, 12, &facts)
            .await
            .expect("apply");

        let state = f
            .characters
            .get_state(f.project, "Lý Thiên Bá")
            .await
            .expect("get")
            .expect("created");
        assert_eq!(state.status, CharacterStatus::Dead);
        assert_eq!(state.status_chapter, 12);
    }
}
