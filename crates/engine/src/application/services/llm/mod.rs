//! LLM plumbing shared by the agents: routing, budget enforcement,
//! cost recording and tolerant output parsing.

pub mod json_clean;
pub mod prompt_builder;

use std::sync::Arc;

use crate::application::services::cost::CostGovernor;
use crate::infrastructure::error::FactoryError;
use crate::infrastructure::ports::{ChatMessage, LlmPort, LlmRequest, LlmResponse};
use storyforge_domain::{ProjectId, TaskKind};

/// The single entry point agents use for chat calls.
///
/// Resolves the model from the task label, checks the budget, executes
/// the call (already retry-wrapped by `ResilientLlmClient`), and records
/// token usage. A denied budget check optionally downgrades one tier per
/// the fallback matrix before giving up with `BudgetExceeded`.
#[derive(Clone)]
pub struct AgentLlm {
    llm: Arc<dyn LlmPort>,
    governor: Arc<CostGovernor>,
}

impl AgentLlm {
    pub fn new(llm: Arc<dyn LlmPort>, governor: Arc<CostGovernor>) -> Self {
        Self { llm, governor }
    }

    pub fn governor(&self) -> &CostGovernor {
        &self.governor
    }

    pub async fn call(
        &self,
        project: ProjectId,
        task: TaskKind,
        system: String,
        user: String,
        temperature: f32,
        max_tokens: u32,
        allow_downgrade: bool,
    ) -> Result<LlmResponse, FactoryError> {
        let estimated = estimate_tokens(&system, &user, max_tokens);
        let decision = self.governor.can_proceed(project, estimated, task).await?;

        let model = if decision.allowed {
            self.governor.model_for_task(task).to_string()
        } else if let (true, Some(tier)) = (allow_downgrade, decision.suggested_tier) {
            tracing::warn!(
                task = task.as_str(),
                tier = tier.as_str(),
                reason = decision.reason.as_deref().unwrap_or(""),
                "Budget pressure: downgrading task tier"
            );
            self.governor.model_for(tier).to_string()
        } else {
            return Err(FactoryError::BudgetExceeded(
                decision.reason.unwrap_or_else(|| "budget exhausted".to_string()),
            ));
        };

        let prompt_chars = system.len() + user.len();
        let request = LlmRequest::new(
            model.clone(),
            vec![ChatMessage::system(system), ChatMessage::user(user)],
        )
        .with_temperature(temperature)
        .with_max_tokens(max_tokens);

        let response = self.llm.generate(request).await?;
        self.governor
            .record(project, task, &model, response.usage_or_estimate(prompt_chars))
            .await;
        Ok(response)
    }
}

/// Crude token estimate for the budget check: prompt chars / 4 plus the
/// full output allowance.
fn estimate_tokens(system: &str, user: &str, max_tokens: u32) -> u32 {
    ((system.len() + user.len()) / 4) as u32 + max_tokens
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted LLM mock shared by the agent tests.

    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::infrastructure::ports::{
        FinishReason, LlmError, LlmPort, LlmRequest, LlmResponse,
    };

    /// Returns queued responses in order; repeats the last one when the
    /// queue runs dry.
    pub struct ScriptedLlm {
        responses: Mutex<Vec<LlmResponse>>,
        pub requests: Mutex<Vec<LlmRequest>>,
    }

    impl ScriptedLlm {
        pub fn new(responses: Vec<LlmResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(vec![]),
            }
        }

        pub fn text(content: &str) -> LlmResponse {
            LlmResponse {
                content: content.to_string(),
                finish_reason: FinishReason::Stop,
                usage: None,
            }
        }

        pub fn truncated(content: &str) -> LlmResponse {
            LlmResponse {
                content: content.to_string(),
                finish_reason: FinishReason::Length,
                usage: None,
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().map(|r| r.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl LlmPort for ScriptedLlm {
        async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
            if let Ok(mut log) = self.requests.lock() {
                log.push(request);
            }
            let mut responses = self
                .responses
                .lock()
                .map_err(|_| LlmError::RequestFailed("mock poisoned".to_string()))?;
            if responses.len() > 1 {
                Ok(responses.remove(0))
            } else {
                responses
                    .first()
                    .cloned()
                    .ok_or_else(|| LlmError::RequestFailed("script exhausted".to_string()))
            }
        }
    }
}
