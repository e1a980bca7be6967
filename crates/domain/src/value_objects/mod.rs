//! Value objects shared across entities.

pub mod dopamine;
pub mod genre;
pub mod style;

pub use dopamine::DopamineType;
pub use genre::GenreType;
pub use style::{
    NarrativeStyle, PacingRule, PacingStyle, RatioBand, SceneType, StyleBible, VocabularyGuide,
};
