//! Romance progression tracker: pacing minimums and stall surfacing.

use crate::infrastructure::persistence::CharacterRepo;
use crate::infrastructure::ports::RepoError;
use storyforge_domain::{
    ProgressionSpeed, ProjectId, RomanceProgression, RomanceStage,
};

/// Result of a stage advance.
#[derive(Debug)]
pub struct AdvanceResult {
    /// Pacing warning when the transition came too early. Never blocks.
    pub warning: Option<String>,
    pub stage: RomanceStage,
}

pub struct RomanceTracker {
    characters: CharacterRepo,
}

impl RomanceTracker {
    pub fn new(characters: CharacterRepo) -> Self {
        Self { characters }
    }

    /// Begin tracking a pair, if not already tracked.
    pub async fn ensure_pair(
        &self,
        project: ProjectId,
        a: &str,
        b: &str,
        speed: ProgressionSpeed,
    ) -> Result<RomanceProgression, RepoError> {
        if let Some(existing) = self.characters.get_romance(project, a, b).await? {
            return Ok(existing);
        }
        let romance = RomanceProgression::new(project, a, b, speed);
        self.characters.upsert_romance(&romance).await?;
        Ok(romance)
    }

    /// Advance a pair to a new stage. Early transitions warn and are
    /// still recorded.
    pub async fn advance(
        &self,
        project: ProjectId,
        a: &str,
        b: &str,
        stage: RomanceStage,
        chapter: u32,
        trigger: &str,
    ) -> Result<AdvanceResult, RepoError> {
        let mut romance = self
            .ensure_pair(project, a, b, ProgressionSpeed::Medium)
            .await?;

        let warning = if romance.transition_too_early(stage, chapter) {
            Some(format!(
                "Cặp {}/{} chuyển sang '{}' ở chương {chapter}, sớm hơn tối thiểu {} chương (tốc độ {})",
                romance.character_a,
                romance.character_b,
                stage.as_str(),
                romance.speed.minimum_chapters_for(stage),
                romance.speed.as_str(),
            ))
        } else {
            None
        };

        romance.advance(stage, chapter, trigger);
        self.characters.upsert_romance(&romance).await?;
        Ok(AdvanceResult { warning, stage })
    }

    /// Record a shared moment without a stage change.
    pub async fn record_moment(
        &self,
        project: ProjectId,
        a: &str,
        b: &str,
        moment: &str,
    ) -> Result<(), RepoError> {
        let mut romance = self
            .ensure_pair(project, a, b, ProgressionSpeed::Medium)
            .await?;
        romance.romantic_moments.push(moment.to_string());
        self.characters.upsert_romance(&romance).await
    }

    /// Pairs sitting in one stage beyond the speed-dependent threshold.
    pub async fn stalled(
        &self,
        project: ProjectId,
        current_chapter: u32,
    ) -> Result<Vec<RomanceProgression>, RepoError> {
        Ok(self
            .characters
            .list_romances(project)
            .await?
            .into_iter()
            .filter(|r| r.is_stalled(current_chapter))
            .collect())
    }
}
