//! StoryForge domain - core data model for the serial-fiction factory.
//!
//! Pure types and invariants only: no async, no I/O, no LLM awareness.
//! The engine crate supplies adapters and services around these.

pub mod common;
pub mod entities;
pub mod error;
pub mod ids;
pub mod value_objects;

pub use entities::*;
pub use error::DomainError;
pub use ids::{
    ArcId, BeatEntryId, ChapterId, CostRecordId, FactId, IssueId, JobId, ProfileId, ProjectId,
    RomanceId, ScheduleId, TrackedItemId, UserId,
};
pub use value_objects::{
    DopamineType, GenreType, NarrativeStyle, PacingRule, PacingStyle, RatioBand, SceneType,
    StyleBible, VocabularyGuide,
};
