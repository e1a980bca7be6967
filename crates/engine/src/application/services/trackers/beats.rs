//! Beat ledger: rotation budgets and cooldown windows over narrative beats.

use std::collections::HashMap;

use crate::infrastructure::persistence::BeatRepo;
use crate::infrastructure::ports::RepoError;
use storyforge_domain::{BeatEntry, BeatType, ProjectId};

/// Cap on suggested beats per chapter.
const MAX_SUGGESTED: usize = 5;
/// Cap on to-avoid beats per chapter.
const MAX_AVOID: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct BeatRecommendations {
    pub suggested: Vec<BeatType>,
    pub avoid: Vec<BeatType>,
}

/// A non-blocking problem found while recording beats.
#[derive(Debug, Clone)]
pub struct BeatWarning {
    pub beat: BeatType,
    pub message: String,
}

pub struct BeatLedger {
    repo: BeatRepo,
}

impl BeatLedger {
    pub fn new(repo: BeatRepo) -> Self {
        Self { repo }
    }

    /// Pre-chapter guidance for the Architect prompt.
    pub async fn recommendations(
        &self,
        project: ProjectId,
        chapter: u32,
        arc_number: u32,
    ) -> Result<BeatRecommendations, RepoError> {
        let cooling: Vec<BeatType> = self
            .repo
            .cooling_down(project, chapter)
            .await?
            .into_iter()
            .map(|e| e.beat_type)
            .collect();
        let budgets = self.repo.arc_budgets(project, arc_number).await?;
        let exhausted: Vec<BeatType> = budgets
            .iter()
            .filter(|b| b.exhausted())
            .map(|b| b.beat_type)
            .collect();

        let mut avoid: Vec<BeatType> = Vec::new();
        for beat in cooling.iter().chain(exhausted.iter()) {
            if !avoid.contains(beat) {
                avoid.push(*beat);
            }
        }
        avoid.truncate(MAX_AVOID);

        // Least-recently-used available beats first.
        let mut last_used: HashMap<BeatType, u32> = HashMap::new();
        for entry in self.repo.list(project).await? {
            let last = last_used.entry(entry.beat_type).or_insert(0);
            *last = (*last).max(entry.chapter_number);
        }

        let mut available: Vec<BeatType> = BeatType::ALL
            .iter()
            .filter(|b| !avoid.contains(b))
            .copied()
            .collect();
        available.sort_by_key(|b| last_used.get(b).copied().unwrap_or(0));
        available.truncate(MAX_SUGGESTED);

        Ok(BeatRecommendations {
            suggested: available,
            avoid,
        })
    }

    /// Post-chapter scan: find delivered beats in the prose, record each
    /// (extending its cooldown, consuming arc budget) and surface
    /// violations as warnings. Never blocks approval.
    pub async fn detect_and_record(
        &self,
        project: ProjectId,
        chapter: u32,
        arc_number: u32,
        content: &str,
    ) -> Result<(Vec<BeatEntry>, Vec<BeatWarning>), RepoError> {
        let lowered = content.to_lowercase();
        let cooling: Vec<BeatType> = self
            .repo
            .cooling_down(project, chapter)
            .await?
            .into_iter()
            .map(|e| e.beat_type)
            .collect();
        let budgets = self.repo.arc_budgets(project, arc_number).await?;

        let mut recorded = Vec::new();
        let mut warnings = Vec::new();

        for beat in BeatType::ALL {
            let hits: usize = beat
                .lexicon()
                .iter()
                .map(|phrase| lowered.matches(&phrase.to_lowercase()).count())
                .sum();
            if hits == 0 {
                continue;
            }

            if cooling.contains(&beat) {
                warnings.push(BeatWarning {
                    beat,
                    message: format!(
                        "Beat '{beat}' delivered at chapter {chapter} while still cooling down"
                    ),
                });
            }
            if let Some(budget) = budgets.iter().find(|b| b.beat_type == beat) {
                if budget.exhausted() {
                    warnings.push(BeatWarning {
                        beat,
                        message: format!(
                            "Beat '{beat}' exceeds its arc {arc_number} budget ({}/{})",
                            budget.used + 1,
                            budget.max
                        ),
                    });
                }
            }

            let intensity = (hits as u8).saturating_mul(3).clamp(1, 10);
            let entry = BeatEntry::new(project, chapter, arc_number, beat, intensity);
            self.repo.insert(&entry).await?;
            recorded.push(entry);
        }

        Ok((recorded, warnings))
    }

    /// Rollback for chapter deletion.
    pub async fn rollback_chapter(
        &self,
        project: ProjectId,
        chapter: u32,
    ) -> Result<u64, RepoError> {
        self.repo.delete_for_chapter(project, chapter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::Database;
    use storyforge_domain::PlotBeat;

    async fn ledger() -> BeatLedger {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        BeatLedger::new(BeatRepo::new(db.pool().clone()))
    }

    #[tokio::test]
    async fn recommendations_exclude_cooling_beats() {
        let ledger = ledger().await;
        let project = ProjectId::new();
        let tournament = BeatType::Plot(PlotBeat::Tournament);

        // Tournament at chapter 5 cools until chapter 35.
        let (recorded, _) = ledger
            .detect_and_record(project, 5, 1, "đại hội tỷ võ khai mạc, vạn người vây xem")
            .await
            .expect("record");
        assert!(recorded.iter().any(|e| e.beat_type == tournament));

        let recs = ledger.recommendations(project, 12, 1).await.expect("recs");
        assert!(recs.avoid.contains(&tournament));
        assert!(!recs.suggested.contains(&tournament));
        assert!(recs.suggested.len() <= 5);
        assert!(recs.avoid.len() <= 10);
    }

    #[tokio::test]
    async fn delivered_beat_in_cooldown_warns_but_records() {
        let ledger = ledger().await;
        let project = ProjectId::new();

        ledger
            .detect_and_record(project, 5, 1, "đại hội bắt đầu")
            .await
            .expect("first");
        // Writer delivers tournament content again at chapter 12 anyway.
        let (recorded, warnings) = ledger
            .detect_and_record(project, 12, 1, "lại một trận tỷ võ trên đài thi đấu")
            .await
            .expect("second");

        assert_eq!(recorded.len(), 1);
        assert!(
            warnings.iter().any(|w| w.message.contains("cooling down")),
            "cooldown violation surfaces as warning"
        );
    }

    #[tokio::test]
    async fn no_beats_in_plain_prose() {
        let ledger = ledger().await;
        let project = ProjectId::new();
        let (recorded, warnings) = ledger
            .detect_and_record(project, 1, 1, "Hàn Phong lặng lẽ uống trà bên cửa sổ.")
            .await
            .expect("scan");
        assert!(recorded.is_empty());
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn rollback_clears_recorded_beats() {
        let ledger = ledger().await;
        let project = ProjectId::new();
        ledger
            .detect_and_record(project, 5, 1, "phiên đấu giá mở màn với giá khởi điểm trên trời")
            .await
            .expect("record");
        assert_eq!(ledger.rollback_chapter(project, 5).await.expect("rollback"), 1);
    }
}
