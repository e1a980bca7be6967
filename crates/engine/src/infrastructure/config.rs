//! Application configuration from environment variables.

use anyhow::Result;

/// Model ids per routing tier.
#[derive(Debug, Clone)]
pub struct TierModels {
    pub small: String,
    pub medium: String,
    pub large: String,
}

/// Budget limits in USD.
#[derive(Debug, Clone, Copy)]
pub struct BudgetConfig {
    pub daily_usd: f64,
    /// Rolling one-hour session budget.
    pub session_usd: f64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub embedding_model: String,
    pub tier_models: TierModels,
    pub budget: BudgetConfig,
    /// Chapter pipeline retry cap.
    pub max_chapter_retries: u32,
    /// Wall-clock limit for one batch run, seconds.
    pub batch_time_limit_secs: u64,
    /// Projects processed per scheduler tick.
    pub scheduler_tick_cap: usize,
    /// Hours a terminal job record is kept before cleanup.
    pub job_retention_hours: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let server_port = env_or("STORYFORGE_PORT", "8700").parse()?;
        let database_url = env_or("DATABASE_URL", "sqlite://storyforge.db?mode=rwc");
        let llm_base_url = env_or("LLM_BASE_URL", crate::infrastructure::llm::DEFAULT_LLM_BASE_URL);
        let llm_api_key = std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());

        Ok(Self {
            server_port,
            database_url,
            llm_base_url,
            llm_api_key,
            embedding_model: env_or("EMBEDDING_MODEL", "nomic-embed-text"),
            tier_models: TierModels {
                small: env_or("MODEL_SMALL", "qwen2.5:3b"),
                medium: env_or("MODEL_MEDIUM", "qwen2.5:14b"),
                large: env_or("MODEL_LARGE", "qwen2.5:72b"),
            },
            budget: BudgetConfig {
                daily_usd: env_or("BUDGET_DAILY_USD", "10.0").parse()?,
                session_usd: env_or("BUDGET_SESSION_USD", "3.0").parse()?,
            },
            max_chapter_retries: env_or("MAX_CHAPTER_RETRIES", "3").parse()?,
            batch_time_limit_secs: env_or("BATCH_TIME_LIMIT_SECS", "7200").parse()?,
            scheduler_tick_cap: env_or("SCHEDULER_TICK_CAP", "10").parse()?,
            job_retention_hours: env_or("JOB_RETENTION_HOURS", "72").parse()?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
