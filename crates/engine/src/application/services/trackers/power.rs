//! Power tracker: breakthrough cadence and realm progression per
//! character.

use crate::infrastructure::persistence::CharacterRepo;
use crate::infrastructure::ports::RepoError;
use storyforge_domain::{
    BreakthroughTrigger, PowerState, ProgressionEvent, ProjectId, WorldBible,
};

/// Default minimum chapters between breakthroughs. Genre-tunable.
pub const DEFAULT_MIN_GAP: u32 = 10;

/// Whether a proposed breakthrough was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakthroughOutcome {
    Recorded,
    Rejected(String),
}

pub struct PowerTracker {
    characters: CharacterRepo,
    min_gap: u32,
}

impl PowerTracker {
    pub fn new(characters: CharacterRepo) -> Self {
        Self {
            characters,
            min_gap: DEFAULT_MIN_GAP,
        }
    }

    pub fn with_min_gap(mut self, min_gap: u32) -> Self {
        self.min_gap = min_gap;
        self
    }

    /// Cadence problem message if a breakthrough at `chapter` would come
    /// too soon after the last one.
    pub async fn cadence_violation(
        &self,
        project: ProjectId,
        character: &str,
        chapter: u32,
    ) -> Result<Option<String>, RepoError> {
        let Some((state, _)) = self.characters.get_power(project, character).await? else {
            return Ok(None);
        };
        if state.last_breakthrough_chapter == 0 {
            return Ok(None);
        }
        let since = state.chapters_since_breakthrough(chapter);
        if since < self.min_gap {
            return Ok(Some(format!(
                "{character} vừa đột phá ở chương {} ({} chương trước, tối thiểu {})",
                state.last_breakthrough_chapter, since, self.min_gap
            )));
        }
        Ok(None)
    }

    /// Propose a breakthrough. Requires the cadence gap and an
    /// accumulated trigger; a jump over more than one realm requires the
    /// golden-finger trigger flagged in the outline.
    pub async fn record_breakthrough(
        &self,
        project: ProjectId,
        world: &WorldBible,
        character: &str,
        chapter: u32,
        trigger: Option<BreakthroughTrigger>,
        target_realm_index: Option<u32>,
    ) -> Result<BreakthroughOutcome, RepoError> {
        let Some(trigger) = trigger else {
            return Ok(BreakthroughOutcome::Rejected(
                "đột phá không có tích lũy (thiếu beat tu luyện, bình cảnh hoặc kỳ ngộ)".to_string(),
            ));
        };

        let (mut state, mut events) = match self.characters.get_power(project, character).await? {
            Some(pair) => pair,
            None => (self.initial_state(project, world, character), vec![]),
        };

        if state.last_breakthrough_chapter > 0
            && state.chapters_since_breakthrough(chapter) < self.min_gap
        {
            return Ok(BreakthroughOutcome::Rejected(format!(
                "chưa đủ {} chương từ lần đột phá trước",
                self.min_gap
            )));
        }

        let realms = &world.power_system.realms;
        let current_realm = realms.get(state.realm_index as usize);
        let sub_levels = current_realm.map(|r| r.sub_levels).unwrap_or(1).max(1);

        // Default advance: next level, rolling into the next realm at the top.
        let (to_realm_index, to_level) = match target_realm_index {
            Some(target) => (target.min(realms.len() as u32 - 1), 1),
            None if state.level >= sub_levels => (state.realm_index + 1, 1),
            None => (state.realm_index, state.level + 1),
        };
        let to_realm_index = to_realm_index.min(realms.len() as u32 - 1);
        let to_realm = realms
            .get(to_realm_index as usize)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| state.realm.clone());

        let event = ProgressionEvent {
            project_id: project,
            character_name: character.to_string(),
            from_realm: state.realm.clone(),
            from_realm_index: state.realm_index,
            from_level: state.level,
            to_realm: to_realm.clone(),
            to_realm_index,
            to_level,
            chapter,
            trigger,
        };

        if event.is_impossible_jump() {
            return Ok(BreakthroughOutcome::Rejected(format!(
                "nhảy {} đại cảnh giới cần lý giải golden-finger tường minh trong dàn ý",
                event.realms_skipped() + 1
            )));
        }

        state.realm = to_realm;
        state.realm_index = to_realm_index;
        state.level = to_level;
        state.last_breakthrough_chapter = chapter;
        events.push(event);
        self.characters.upsert_power(&state, &events).await?;
        Ok(BreakthroughOutcome::Recorded)
    }

    /// Current state, if tracked.
    pub async fn state(
        &self,
        project: ProjectId,
        character: &str,
    ) -> Result<Option<PowerState>, RepoError> {
        Ok(self
            .characters
            .get_power(project, character)
            .await?
            .map(|(state, _)| state))
    }

    /// Remove events recorded at `chapter` and rebuild the state from
    /// what remains.
    pub async fn rollback_chapter(
        &self,
        project: ProjectId,
        world: &WorldBible,
        character: &str,
        chapter: u32,
    ) -> Result<(), RepoError> {
        let Some((_, events)) = self.characters.get_power(project, character).await? else {
            return Ok(());
        };
        let remaining: Vec<ProgressionEvent> =
            events.into_iter().filter(|e| e.chapter != chapter).collect();

        let mut state = self.initial_state(project, world, character);
        if let Some(last) = remaining.last() {
            state.realm = last.to_realm.clone();
            state.realm_index = last.to_realm_index;
            state.level = last.to_level;
            state.last_breakthrough_chapter = last.chapter;
        }
        self.characters.upsert_power(&state, &remaining).await
    }

    fn initial_state(
        &self,
        project: ProjectId,
        world: &WorldBible,
        character: &str,
    ) -> PowerState {
        if character == world.protagonist.name {
            let realm_index = world
                .power_system
                .realm_index(&world.protagonist.realm)
                .unwrap_or(0) as u32;
            PowerState::new(
                project,
                character,
                world.protagonist.realm.clone(),
                realm_index,
                world.protagonist.level.max(1),
            )
        } else {
            let first = world
                .power_system
                .realms
                .first()
                .map(|r| r.name.clone())
                .unwrap_or_default();
            PowerState::new(project, character, first, 0, 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::Database;
    use storyforge_domain::{PowerRealm, PowerSystem, Protagonist};

    async fn tracker() -> (PowerTracker, ProjectId) {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        (
            PowerTracker::new(CharacterRepo::new(db.pool().clone())),
            ProjectId::new(),
        )
    }

    fn world(project: ProjectId) -> WorldBible {
        WorldBible {
            project_id: project,
            story_title: "t".to_string(),
            power_system: PowerSystem {
                name: "Cửu Thiên".to_string(),
                realms: vec![
                    PowerRealm {
                        rank: 0,
                        name: "Luyện Khí".to_string(),
                        sub_levels: 3,
                        abilities: vec![],
                        breakthrough_difficulty: String::new(),
                    },
                    PowerRealm {
                        rank: 1,
                        name: "Trúc Cơ".to_string(),
                        sub_levels: 3,
                        abilities: vec![],
                        breakthrough_difficulty: String::new(),
                    },
                    PowerRealm {
                        rank: 2,
                        name: "Kim Đan".to_string(),
                        sub_levels: 3,
                        abilities: vec![],
                        breakthrough_difficulty: String::new(),
                    },
                ],
            },
            protagonist: Protagonist {
                name: "Hàn Phong".to_string(),
                realm: "Luyện Khí".to_string(),
                level: 3,
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

    #[tokio::test]
    async fn breakthrough_without_trigger_rejected() {
        let (tracker, project) = tracker().await;
        let w = world(project);
        let outcome = tracker
            .record_breakthrough(project, &w, "Hàn Phong", 12, None, None)
            .await
            .expect("call");
        assert!(matches!(outcome, BreakthroughOutcome::Rejected(_)));
    }

    #[tokio::test]
    async fn level_top_rolls_into_next_realm() {
        let (tracker, project) = tracker().await;
        let w = world(project);
        // Protagonist starts at Luyện Khí level 3 (the realm top).
        let outcome = tracker
            .record_breakthrough(
                project,
                &w,
                "Hàn Phong",
                12,
                Some(BreakthroughTrigger::Cultivation),
                None,
            )
            .await
            .expect("call");
        assert_eq!(outcome, BreakthroughOutcome::Recorded);

        let state = tracker
            .state(project, "Hàn Phong")
            .await
            .expect("get")
            .expect("tracked");
        assert_eq!(state.realm, "Trúc Cơ");
        assert_eq!(state.level, 1);
        assert_eq!(state.last_breakthrough_chapter, 12);
    }

    #[tokio::test]
    async fn cadence_enforced_between_breakthroughs() {
        let (tracker, project) = tracker().await;
        let w = world(project);
        tracker
            .record_breakthrough(
                project,
                &w,
                "Hàn Phong",
                12,
                Some(BreakthroughTrigger::Cultivation),
                None,
            )
            .await
            .expect("first");

        let outcome = tracker
            .record_breakthrough(
                project,
                &w,
                "Hàn Phong",
                15,
                Some(BreakthroughTrigger::Treasure),
                None,
            )
            .await
            .expect("second");
        assert!(matches!(outcome, BreakthroughOutcome::Rejected(_)));

        let violation = tracker
            .cadence_violation(project, "Hàn Phong", 15)
            .await
            .expect("check");
        assert!(violation.is_some());
        assert!(tracker
            .cadence_violation(project, "Hàn Phong", 22)
            .await
            .expect("check")
            .is_none());
    }

    #[tokio::test]
    async fn realm_skip_requires_golden_finger() {
        let (tracker, project) = tracker().await;
        let w = world(project);
        // From Luyện Khí straight to Kim Đan (skipping Trúc Cơ).
        let rejected = tracker
            .record_breakthrough(
                project,
                &w,
                "Hàn Phong",
                12,
                Some(BreakthroughTrigger::Treasure),
                Some(2),
            )
            .await
            .expect("call");
        assert!(matches!(rejected, BreakthroughOutcome::Rejected(_)));

        let accepted = tracker
            .record_breakthrough(
                project,
                &w,
                "Hàn Phong",
                12,
                Some(BreakthroughTrigger::GoldenFinger),
                Some(2),
            )
            .await
            .expect("call");
        assert_eq!(accepted, BreakthroughOutcome::Recorded);
    }

    #[tokio::test]
    async fn rollback_restores_previous_state() {
        let (tracker, project) = tracker().await;
        let w = world(project);
        tracker
            .record_breakthrough(
                project,
                &w,
                "Hàn Phong",
                12,
                Some(BreakthroughTrigger::Cultivation),
                None,
            )
            .await
            .expect("breakthrough");

        tracker
            .rollback_chapter(project, &w, "Hàn Phong", 12)
            .await
            .expect("rollback");
        let state = tracker
            .state(project, "Hàn Phong")
            .await
            .expect("get")
            .expect("tracked");
        assert_eq!(state.realm, "Luyện Khí");
        assert_eq!(state.level, 3);
        assert_eq!(state.last_breakthrough_chapter, 0);
    }
}
