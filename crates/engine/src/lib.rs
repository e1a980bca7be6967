//! StoryForge Engine - serial fiction production backend.
//!
//! The engine drives an Architect -> Writer -> Critic pipeline against
//! any OpenAI-compatible chat endpoint, gates drafts through
//! deterministic and model scoring, and maintains cross-chapter state
//! (canon, beats, power progression, items, romance, character depth)
//! for stories hundreds to thousands of chapters long.

pub mod application;
pub mod infrastructure;
