//! Cross-chapter state trackers.
//!
//! Tracker writes are best effort: the runner logs failures and keeps
//! going. Only the gate-time checks (canon conflicts, critical
//! consistency issues) can block a chapter.

pub mod beats;
pub mod canon;
pub mod character_depth;
pub mod consistency;
pub mod items;
pub mod power;
pub mod romance;

pub use beats::{BeatLedger, BeatRecommendations, BeatWarning};
pub use canon::{CanonCheck, CanonResolver};
pub use character_depth::CharacterDepthTracker;
pub use consistency::ConsistencyChecker;
pub use items::{ItemRegistration, ItemTracker};
pub use power::{BreakthroughOutcome, PowerTracker};
pub use romance::RomanceTracker;
