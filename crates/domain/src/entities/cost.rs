//! Cost records and model-tier routing constants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{CostRecordId, ProjectId};

/// Model routing class. Callers request by task label, never by model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Small,
    Medium,
    Large,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    /// USD per 1000 input tokens. Output tokens cost 3x.
    pub fn input_price_per_1k(&self) -> f64 {
        match self {
            Self::Small => 0.0002,
            Self::Medium => 0.0015,
            Self::Large => 0.0060,
        }
    }

    /// Output-token multiplier over the input price.
    pub const OUTPUT_MULTIPLIER: f64 = 3.0;

    pub fn cost_usd(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let per_1k = self.input_price_per_1k();
        (f64::from(input_tokens) * per_1k + f64::from(output_tokens) * per_1k * Self::OUTPUT_MULTIPLIER)
            / 1000.0
    }

    /// The next tier down, if any, for budget-pressure downgrades.
    pub fn downgrade(&self) -> Option<ModelTier> {
        match self {
            Self::Large => Some(Self::Medium),
            Self::Medium => Some(Self::Small),
            Self::Small => None,
        }
    }
}

/// Task labels the router understands. The task→tier mapping is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Chapter prose and complex dialogue.
    Writing,
    /// Continuation of truncated prose.
    Continuation,
    /// Chapter outlines and arc planning.
    Outline,
    /// Rewrite editing passes.
    Editing,
    /// Critic scoring.
    QualityCheck,
    /// Chapter and arc summaries.
    Summarization,
    /// Canon fact extraction.
    Extraction,
    /// Trait-contradiction and other classification checks.
    Classification,
    /// Embedding requests (token accounting only).
    Embedding,
}

impl TaskKind {
    pub const ALL: [TaskKind; 9] = [
        TaskKind::Writing,
        TaskKind::Continuation,
        TaskKind::Outline,
        TaskKind::Editing,
        TaskKind::QualityCheck,
        TaskKind::Summarization,
        TaskKind::Extraction,
        TaskKind::Classification,
        TaskKind::Embedding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Writing => "writing",
            Self::Continuation => "continuation",
            Self::Outline => "outline",
            Self::Editing => "editing",
            Self::QualityCheck => "quality_check",
            Self::Summarization => "summarization",
            Self::Extraction => "extraction",
            Self::Classification => "classification",
            Self::Embedding => "embedding",
        }
    }

    /// The fixed task-to-tier mapping.
    pub fn tier(&self) -> ModelTier {
        match self {
            Self::Writing | Self::Continuation => ModelTier::Large,
            Self::Outline | Self::Editing => ModelTier::Medium,
            Self::QualityCheck
            | Self::Summarization
            | Self::Extraction
            | Self::Classification
            | Self::Embedding => ModelTier::Small,
        }
    }
}

impl std::str::FromStr for TaskKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| DomainError::parse(format!("Unknown task kind: '{s}'")))
    }
}

/// One recorded LLM call. Append-only, rolled up on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostRecord {
    pub id: CostRecordId,
    pub project_id: ProjectId,
    pub timestamp: DateTime<Utc>,
    pub model_id: String,
    pub task: TaskKind,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
}

impl CostRecord {
    pub fn new(
        project_id: ProjectId,
        model_id: impl Into<String>,
        task: TaskKind,
        input_tokens: u32,
        output_tokens: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let tier = task.tier();
        Self {
            id: CostRecordId::new(),
            project_id,
            timestamp,
            model_id: model_id.into(),
            task,
            input_tokens,
            output_tokens,
            cost_usd: tier.cost_usd(input_tokens, output_tokens),
        }
    }
}
