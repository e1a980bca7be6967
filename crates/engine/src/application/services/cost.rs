//! Cost governor and model router.
//!
//! Callers request LLM work by task label; the router resolves the tier
//! and concrete model id. The governor enforces the daily and rolling
//! one-hour session budgets and is the factory's primary backpressure:
//! a denial either downgrades the task or pauses the project.
//!
//! Downgrade fallback matrix on denial:
//!   writing       -> medium tier, then fail
//!   outline       -> small tier, then fail
//!   quality_check -> skip the Critic (gate falls back to mechanical checks)
//!   summarization, extraction, classification -> skip (best-effort consumers)

use chrono::Utc;

use crate::infrastructure::config::{BudgetConfig, TierModels};
use crate::infrastructure::persistence::CostRepo;
use crate::infrastructure::ports::{RepoError, TokenUsage};
use storyforge_domain::{CostRecord, ModelTier, ProjectId, TaskKind};

/// Outcome of a budget check.
#[derive(Debug, Clone)]
pub struct ProceedDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    /// A cheaper tier that would fit the remaining budget, if any.
    pub suggested_tier: Option<ModelTier>,
}

impl ProceedDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            suggested_tier: None,
        }
    }
}

#[derive(Clone)]
pub struct CostGovernor {
    costs: CostRepo,
    budget: BudgetConfig,
    models: TierModels,
}

impl CostGovernor {
    pub fn new(costs: CostRepo, budget: BudgetConfig, models: TierModels) -> Self {
        Self {
            costs,
            budget,
            models,
        }
    }

    /// Concrete model id for a tier.
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Small => &self.models.small,
            ModelTier::Medium => &self.models.medium,
            ModelTier::Large => &self.models.large,
        }
    }

    /// Model id the given task routes to (before any downgrade).
    pub fn model_for_task(&self, task: TaskKind) -> &str {
        self.model_for(task.tier())
    }

    /// Check both budget windows before an LLM call.
    pub async fn can_proceed(
        &self,
        project: ProjectId,
        estimated_tokens: u32,
        task: TaskKind,
    ) -> Result<ProceedDecision, RepoError> {
        let tier = task.tier();
        let estimated_cost = estimate_cost(tier, estimated_tokens);

        let daily_spent = self.costs.total_today(project).await?;
        let session_spent = self.costs.total_last_hour(project).await?;

        let daily_headroom = self.budget.daily_usd - daily_spent;
        let session_headroom = self.budget.session_usd - session_spent;

        let (window, headroom) = if daily_headroom < session_headroom {
            ("daily", daily_headroom)
        } else {
            ("session", session_headroom)
        };

        if estimated_cost <= headroom {
            return Ok(ProceedDecision::allow());
        }

        // A cheaper tier may still fit.
        let mut suggestion = None;
        let mut candidate = tier.downgrade();
        while let Some(lower) = candidate {
            if estimate_cost(lower, estimated_tokens) <= headroom {
                suggestion = Some(lower);
                break;
            }
            candidate = lower.downgrade();
        }

        Ok(ProceedDecision {
            allowed: false,
            reason: Some(format!(
                "{window} budget exhausted: estimated ${estimated_cost:.4} exceeds remaining ${:.4}",
                headroom.max(0.0)
            )),
            suggested_tier: suggestion,
        })
    }

    /// Record token usage for a completed call. Best effort: bookkeeping
    /// failures are logged, never propagated into the pipeline.
    pub async fn record(
        &self,
        project: ProjectId,
        task: TaskKind,
        model_id: &str,
        usage: TokenUsage,
    ) {
        let record = CostRecord::new(
            project,
            model_id,
            task,
            usage.prompt_tokens,
            usage.completion_tokens,
            Utc::now(),
        );
        if let Err(e) = self.costs.insert(&record).await {
            tracing::warn!(error = %e, task = task.as_str(), "Failed to record LLM cost");
        }
    }
}

/// Rough cost for an estimated token volume, assuming a 2:1 input/output
/// split.
fn estimate_cost(tier: ModelTier, estimated_tokens: u32) -> f64 {
    let output = estimated_tokens / 3;
    let input = estimated_tokens - output;
    tier.cost_usd(input, output)
}
