//! SQLite persistence adapters.

pub mod beat_repo;
pub mod canon_repo;
pub mod chapter_repo;
pub mod character_repo;
pub mod connection;
pub mod cost_repo;
pub mod embedding_repo;
pub mod issue_repo;
pub mod item_repo;
pub mod job_repo;
pub mod project_repo;
pub mod schedule_repo;
pub mod world_repo;

pub use beat_repo::BeatRepo;
pub use canon_repo::CanonRepo;
pub use chapter_repo::ChapterRepo;
pub use character_repo::CharacterRepo;
pub use connection::Database;
pub use cost_repo::CostRepo;
pub use embedding_repo::{EmbeddingRepo, RagChunk};
pub use issue_repo::IssueRepo;
pub use item_repo::ItemRepo;
pub use job_repo::JobRepo;
pub use project_repo::ProjectRepo;
pub use schedule_repo::ScheduleRepo;
pub use world_repo::WorldRepo;
