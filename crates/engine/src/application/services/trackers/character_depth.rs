//! Character depth tracker: uniqueness on creation, milestone growth,
//! stagnation surfacing.

use crate::infrastructure::persistence::CharacterRepo;
use crate::infrastructure::ports::RepoError;
use storyforge_domain::{
    CharacterDepthProfile, Milestone, ProjectId,
};

/// Below this uniqueness score a new profile draws a warning.
pub const UNIQUENESS_WARNING_THRESHOLD: u32 = 50;

/// Result of registering a profile.
#[derive(Debug)]
pub struct RegistrationResult {
    /// Lowest uniqueness score against existing profiles (100 if first).
    pub uniqueness: u32,
    /// Warning when the new character reads like a clone.
    pub warning: Option<String>,
}

pub struct CharacterDepthTracker {
    characters: CharacterRepo,
}

impl CharacterDepthTracker {
    pub fn new(characters: CharacterRepo) -> Self {
        Self { characters }
    }

    /// Register (or update) a profile, scoring uniqueness against the
    /// existing cast.
    pub async fn register(
        &self,
        profile: &CharacterDepthProfile,
    ) -> Result<RegistrationResult, RepoError> {
        let existing = self.characters.list_profiles(profile.project_id).await?;
        let uniqueness = existing
            .iter()
            .filter(|p| p.name != profile.name)
            .map(|p| profile.uniqueness_against(p))
            .min()
            .unwrap_or(100);

        let warning = if uniqueness < UNIQUENESS_WARNING_THRESHOLD {
            let closest = existing
                .iter()
                .filter(|p| p.name != profile.name)
                .min_by_key(|p| profile.uniqueness_against(p))
                .map(|p| p.name.clone())
                .unwrap_or_default();
            Some(format!(
                "Nhân vật '{}' quá giống '{}' (độ khác biệt {}/100)",
                profile.name, closest, uniqueness
            ))
        } else {
            None
        };

        self.characters.upsert_profile(profile).await?;
        Ok(RegistrationResult {
            uniqueness,
            warning,
        })
    }

    /// Record a milestone for a character; creates nothing if untracked.
    pub async fn record_milestone(
        &self,
        project: ProjectId,
        character: &str,
        milestone: Milestone,
    ) -> Result<Option<u32>, RepoError> {
        let Some(mut profile) = self.characters.get_profile(project, character).await? else {
            return Ok(None);
        };
        profile.character_arc.record_milestone(milestone);
        let score = profile.character_arc.growth_score;
        self.characters.upsert_profile(&profile).await?;
        Ok(Some(score))
    }

    /// Mark appearances for this chapter's cast.
    pub async fn record_appearances(
        &self,
        project: ProjectId,
        chapter: u32,
        cast: &[String],
    ) -> Result<(), RepoError> {
        for name in cast {
            if let Some(mut profile) = self.characters.get_profile(project, name).await? {
                profile.record_appearance(chapter);
                self.characters.upsert_profile(&profile).await?;
            }
        }
        Ok(())
    }

    /// Non-minor characters with no milestone in the stagnation window.
    pub async fn needs_development(
        &self,
        project: ProjectId,
        current_chapter: u32,
    ) -> Result<Vec<String>, RepoError> {
        Ok(self
            .characters
            .list_profiles(project)
            .await?
            .into_iter()
            .filter(|p| p.needs_development(current_chapter))
            .map(|p| p.name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::Database;
    use storyforge_domain::{CharacterRole, MilestoneImpact, MilestoneKind};

    async fn tracker() -> (CharacterDepthTracker, ProjectId) {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        (
            CharacterDepthTracker::new(CharacterRepo::new(db.pool().clone())),
            ProjectId::new(),
        )
    }

    fn profile(
        project: ProjectId,
        name: &str,
        role: CharacterRole,
        traits: &[&str],
    ) -> CharacterDepthProfile {
        let mut p = CharacterDepthProfile::new(project, name, role);
        p.personality_traits = traits.iter().map(|s| s.to_string()).collect();
        p
    }

    #[tokio::test]
    async fn first_character_is_fully_unique() {
        let (tracker, project) = tracker().await;
        let result = tracker
            .register(&profile(project, "Hàn Phong", CharacterRole::Protagonist, &["kiên nghị"]))
            .await
            .expect("register");
        assert_eq!(result.uniqueness, 100);
        assert!(result.warning.is_none());
    }

    #[tokio::test]
    async fn clone_character_draws_warning() {
        let (tracker, project) = tracker().await;
        tracker
            .register(&profile(
                project,
                "Lý Hàn",
                CharacterRole::Supporting,
                &["lạnh lùng", "kiêu ngạo"],
            ))
            .await
            .expect("first");

        let result = tracker
            .register(&profile(
                project,
                "Trần Mặc",
                CharacterRole::Supporting,
                &["lạnh lùng", "kiêu ngạo"],
            ))
            .await
            .expect("second");
        assert!(result.uniqueness < UNIQUENESS_WARNING_THRESHOLD);
        assert!(result.warning.as_deref().unwrap_or("").contains("Lý Hàn"));
    }

    #[tokio::test]
    async fn milestones_accumulate_growth() {
        let (tracker, project) = tracker().await;
        tracker
            .register(&profile(project, "Hàn Phong", CharacterRole::Protagonist, &[]))
            .await
            .expect("register");

        let score = tracker
            .record_milestone(
                project,
                "Hàn Phong",
                Milestone {
                    kind: MilestoneKind::Sacrifice,
                    impact: MilestoneImpact::Major,
                    description: "bỏ cơ duyên cứu bạn".to_string(),
                    chapter: 9,
                },
            )
            .await
            .expect("record")
            .expect("tracked");
        assert_eq!(score, 15);

        // Untracked characters are ignored.
        assert!(tracker
            .record_milestone(
                project,
                "người qua đường",
                Milestone {
                    kind: MilestoneKind::Growth,
                    impact: MilestoneImpact::Minor,
                    description: String::new(),
                    chapter: 9,
                },
            )
            .await
            .expect("record")
            .is_none());
    }

    #[tokio::test]
    async fn stagnant_characters_surface() {
        let (tracker, project) = tracker().await;
        tracker
            .register(&profile(project, "Lâm Uyển Nhi", CharacterRole::Supporting, &[]))
            .await
            .expect("register");
        tracker
            .record_appearances(project, 5, &["Lâm Uyển Nhi".to_string()])
            .await
            .expect("appear");

        assert!(tracker
            .needs_development(project, 40)
            .await
            .expect("check")
            .is_empty());
        assert_eq!(
            tracker.needs_development(project, 60).await.expect("check"),
            vec!["Lâm Uyển Nhi".to_string()]
        );
    }
}
