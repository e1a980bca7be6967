//! Item tracker: fuzzy name dedup, grade-by-chapter schedule, forgotten
//! item reminders.

use crate::infrastructure::persistence::ItemRepo;
use crate::infrastructure::ports::RepoError;
use storyforge_domain::common::name_similarity;
use storyforge_domain::{
    ItemGrade, ProjectId, TrackedItem, UNUSED_ITEM_THRESHOLD,
};

/// Similarity at or above this blocks registration.
pub const BLOCK_SIMILARITY: f64 = 0.8;
/// Similarity in [WARN, BLOCK) warns.
pub const WARN_SIMILARITY: f64 = 0.6;

/// Outcome of attempting to register a new item.
#[derive(Debug)]
pub enum ItemRegistration {
    /// Stored as a new item.
    Registered {
        warning: Option<String>,
    },
    /// Too similar to an existing item; treated as a mention of it.
    MergedInto {
        existing_name: String,
    },
}

pub struct ItemTracker {
    items: ItemRepo,
    unused_threshold: u32,
}

impl ItemTracker {
    pub fn new(items: ItemRepo) -> Self {
        Self {
            items,
            unused_threshold: UNUSED_ITEM_THRESHOLD,
        }
    }

    pub fn with_unused_threshold(mut self, threshold: u32) -> Self {
        self.unused_threshold = threshold;
        self
    }

    /// Register a new item. A name at >= 80% similarity to an existing
    /// item is rejected and recorded as a mention of that item; 60-79%
    /// registers with a warning.
    pub async fn register(
        &self,
        item: TrackedItem,
        total_chapters: u32,
    ) -> Result<ItemRegistration, RepoError> {
        let existing = self.items.list(item.project_id).await?;

        let mut best: Option<(f64, &TrackedItem)> = None;
        for other in &existing {
            let similarity = name_similarity(&item.name, &other.name).max(
                other
                    .alternate_name
                    .as_deref()
                    .map(|alt| name_similarity(&item.name, alt))
                    .unwrap_or(0.0),
            );
            if best.map(|(s, _)| similarity > s).unwrap_or(true) {
                best = Some((similarity, other));
            }
        }

        if let Some((similarity, other)) = best {
            if similarity >= BLOCK_SIMILARITY {
                let mut merged = other.clone();
                merged.record_mention(item.first_mention_chapter);
                self.items.upsert(&merged).await?;
                return Ok(ItemRegistration::MergedInto {
                    existing_name: other.name.clone(),
                });
            }
            if similarity >= WARN_SIMILARITY {
                let warning = format!(
                    "Vật phẩm '{}' giống '{}' tới {:.0}%",
                    item.name,
                    other.name,
                    similarity * 100.0
                );
                let grade_warning = grade_warning(&item, total_chapters);
                self.items.upsert(&item).await?;
                return Ok(ItemRegistration::Registered {
                    warning: Some(match grade_warning {
                        Some(g) => format!("{warning}; {g}"),
                        None => warning,
                    }),
                });
            }
        }

        let warning = grade_warning(&item, total_chapters);
        self.items.upsert(&item).await?;
        Ok(ItemRegistration::Registered { warning })
    }

    /// Record mentions of known items found in chapter prose.
    pub async fn record_mentions(
        &self,
        project: ProjectId,
        chapter: u32,
        content: &str,
    ) -> Result<u32, RepoError> {
        let mut mentioned = 0;
        for mut item in self.items.list(project).await? {
            let named = content.contains(&item.name)
                || item
                    .alternate_name
                    .as_deref()
                    .map(|alt| content.contains(alt))
                    .unwrap_or(false);
            if named {
                item.record_mention(chapter);
                self.items.upsert(&item).await?;
                mentioned += 1;
            }
        }
        Ok(mentioned)
    }

    /// Active items unmentioned for longer than the threshold.
    pub async fn forgotten(
        &self,
        project: ProjectId,
        current_chapter: u32,
    ) -> Result<Vec<TrackedItem>, RepoError> {
        Ok(self
            .items
            .list(project)
            .await?
            .into_iter()
            .filter(|i| i.is_forgotten(current_chapter, self.unused_threshold))
            .collect())
    }

    pub async fn rollback_chapter(
        &self,
        project: ProjectId,
        chapter: u32,
    ) -> Result<u64, RepoError> {
        self.items.delete_introduced_in(project, chapter).await
    }
}

fn grade_warning(item: &TrackedItem, total_chapters: u32) -> Option<String> {
    if item.grade_too_early(total_chapters) {
        Some(format!(
            "'{}' là {} nhưng xuất hiện ở chương {}, vượt lịch phẩm cấp (tối đa {})",
            item.name,
            item.grade.display_name(),
            item.first_mention_chapter,
            ItemGrade::max_for_chapter(item.first_mention_chapter, total_chapters).display_name()
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::Database;

    async fn tracker() -> (ItemTracker, ProjectId) {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        (
            ItemTracker::new(ItemRepo::new(db.pool().clone())),
            ProjectId::new(),
        )
    }

    fn item(project: ProjectId, name: &str, grade: ItemGrade, chapter: u32) -> TrackedItem {
        TrackedItem::new(project, name, "pháp bảo", grade, "Hàn Phong", chapter)
    }

    #[tokio::test]
    async fn near_duplicate_names_merge() {
        let (tracker, project) = tracker().await;
        tracker
            .register(item(project, "Huyết Ma Kiếm", ItemGrade::Huyen, 10), 1000)
            .await
            .expect("first");

        // Contained name floors at 0.8 similarity and merges.
        let result = tracker
            .register(item(project, "Ma Kiếm", ItemGrade::Huyen, 30), 1000)
            .await
            .expect("second");
        assert!(matches!(
            result,
            ItemRegistration::MergedInto { ref existing_name } if existing_name == "Huyết Ma Kiếm"
        ));

        let items = tracker.items.list(project).await.expect("list");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].mention_count, 2, "merge counts as a mention");
    }

    #[tokio::test]
    async fn distinct_names_register_cleanly() {
        let (tracker, project) = tracker().await;
        tracker
            .register(item(project, "Huyết Ma Kiếm", ItemGrade::Huyen, 200), 1000)
            .await
            .expect("first");
        let result = tracker
            .register(item(project, "Tụ Linh Trận Bàn", ItemGrade::Hoang, 210), 1000)
            .await
            .expect("second");
        assert!(matches!(result, ItemRegistration::Registered { warning: None }));
    }

    #[tokio::test]
    async fn premature_grade_warns() {
        let (tracker, project) = tracker().await;
        let result = tracker
            .register(item(project, "Hỗn Độn Chung", ItemGrade::Tien, 5), 1000)
            .await
            .expect("register");
        match result {
            ItemRegistration::Registered { warning } => {
                assert!(warning.unwrap_or_default().contains("vượt lịch phẩm cấp"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn forgotten_items_surface_and_mentions_reset() {
        let (tracker, project) = tracker().await;
        tracker
            .register(item(project, "Trường Sinh Đăng", ItemGrade::Pham, 10), 1000)
            .await
            .expect("register");

        assert_eq!(tracker.forgotten(project, 61).await.expect("check").len(), 1);

        tracker
            .record_mentions(project, 62, "ngọn Trường Sinh Đăng lại sáng lên")
            .await
            .expect("mention");
        assert!(tracker.forgotten(project, 80).await.expect("check").is_empty());
    }
}
