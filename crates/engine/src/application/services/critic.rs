//! Critic agent: scores a draft. Fails closed - no affirmative evidence,
//! no approval.

use serde::Deserialize;

use crate::application::services::llm::json_clean::parse_lenient;
use crate::application::services::llm::prompt_builder::build_critic_prompt;
use crate::application::services::llm::AgentLlm;
use storyforge_domain::common::word_count;
use storyforge_domain::{ChapterOutline, ProjectId, TaskKind};

pub const CRITIC_TEMPERATURE: f32 = 0.2;
const CRITIC_MAX_TOKENS: u32 = 1500;

/// Approval needs at least this overall score.
pub const APPROVE_MIN_SCORE: f32 = 6.0;
/// Approval needs at least this word ratio.
pub const APPROVE_MIN_RATIO: f64 = 0.7;
/// Below this ratio, or at/below this score, a rewrite is forced.
pub const FORCE_REWRITE_RATIO: f64 = 0.6;
pub const FORCE_REWRITE_SCORE: f32 = 3.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticIssue {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_severity")]
    pub severity: String,
}

fn default_severity() -> String {
    "minor".to_string()
}

/// The Critic's verdict after local enforcement of the thresholds.
#[derive(Debug, Clone)]
pub struct CriticReport {
    pub overall_score: f32,
    pub dopamine_score: f32,
    pub pacing_score: f32,
    pub issues: Vec<CriticIssue>,
    pub approved: bool,
    pub requires_rewrite: bool,
    pub rewrite_instructions: Option<String>,
    pub word_ratio: f64,
    /// True when the report came from the fail-closed path rather than a
    /// parsed model response.
    pub fail_closed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCriticReport {
    #[serde(default)]
    overall_score: Option<f32>,
    #[serde(default)]
    dopamine_score: Option<f32>,
    #[serde(default)]
    pacing_score: Option<f32>,
    #[serde(default)]
    issues: Vec<CriticIssue>,
    #[serde(default)]
    approved: Option<bool>,
    #[serde(default)]
    requires_rewrite: Option<bool>,
    #[serde(default)]
    rewrite_instructions: Option<String>,
}

pub struct Critic {
    llm: AgentLlm,
}

impl Critic {
    pub fn new(llm: AgentLlm) -> Self {
        Self { llm }
    }

    pub async fn review(
        &self,
        project: ProjectId,
        outline: &ChapterOutline,
        content: &str,
    ) -> CriticReport {
        let word_ratio =
            word_count(content) as f64 / f64::from(outline.target_word_count.max(1));

        let (system, prompt) = build_critic_prompt(outline, content);
        let response = self
            .llm
            .call(
                project,
                TaskKind::QualityCheck,
                system,
                prompt,
                CRITIC_TEMPERATURE,
                CRITIC_MAX_TOKENS,
                true,
            )
            .await;

        let raw = match response {
            Ok(response) => match parse_lenient::<RawCriticReport>(&response.content) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(error = %e, "Critic returned unparseable report, failing closed");
                    return Self::closed(word_ratio);
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Critic call failed, failing closed");
                return Self::closed(word_ratio);
            }
        };

        let overall = raw.overall_score.unwrap_or(0.0).clamp(0.0, 10.0);
        // The thresholds are enforced here regardless of what the model
        // claimed about its own verdict.
        let approved = raw.approved.unwrap_or(false)
            && overall >= APPROVE_MIN_SCORE
            && word_ratio >= APPROVE_MIN_RATIO;
        let requires_rewrite = raw.requires_rewrite.unwrap_or(false)
            || word_ratio < FORCE_REWRITE_RATIO
            || overall <= FORCE_REWRITE_SCORE;

        CriticReport {
            overall_score: overall,
            dopamine_score: raw.dopamine_score.unwrap_or(0.0).clamp(0.0, 10.0),
            pacing_score: raw.pacing_score.unwrap_or(0.0).clamp(0.0, 10.0),
            issues: raw.issues,
            approved,
            requires_rewrite,
            rewrite_instructions: raw.rewrite_instructions.filter(|s| !s.trim().is_empty()),
            word_ratio,
            fail_closed: false,
        }
    }

    /// Fail-closed verdict: not approved; rewrite only when the draft is
    /// also under the hard word floor.
    fn closed(word_ratio: f64) -> CriticReport {
        CriticReport {
            overall_score: 0.0,
            dopamine_score: 0.0,
            pacing_score: 0.0,
            issues: vec![],
            approved: false,
            requires_rewrite: word_ratio < FORCE_REWRITE_RATIO,
            rewrite_instructions: None,
            word_ratio,
            fail_closed: true,
        }
    }
}
