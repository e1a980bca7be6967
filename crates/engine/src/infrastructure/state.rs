//! Application state: wires adapters into services at startup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::application::services::{
    Architect, ChapterWriter, CostGovernor, Critic, MemoryManager, QualityGate, RagService,
    Runner, Scheduler, StyleRegistry, Writer,
};
use crate::application::services::llm::AgentLlm;
use crate::application::services::quality_gate::GateThresholds;
use crate::application::services::trackers::{
    BeatLedger, CanonResolver, CharacterDepthTracker, ConsistencyChecker, ItemTracker,
    PowerTracker, RomanceTracker,
};
use crate::infrastructure::cache::{
    EmbeddingMemoryCache, EMBEDDING_CACHE_CAPACITY, EMBEDDING_CACHE_TTL,
};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::embeddings::EmbeddingClient;
use crate::infrastructure::llm::ChatClient;
use crate::infrastructure::persistence::{
    BeatRepo, CanonRepo, ChapterRepo, CharacterRepo, CostRepo, Database, EmbeddingRepo, IssueRepo,
    ItemRepo, JobRepo, ProjectRepo, ScheduleRepo, WorldRepo,
};
use crate::infrastructure::ports::LlmPort;
use crate::infrastructure::resilient_llm::{ResilientLlmClient, RetryConfig};

pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub runner: Arc<Runner>,
    pub scheduler: Arc<Scheduler>,
    pub projects: ProjectRepo,
    pub chapters: ChapterRepo,
    pub jobs: JobRepo,
    pub schedules: ScheduleRepo,
    pub embeddings: EmbeddingRepo,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let db = Database::connect(&config.database_url).await?;
        db.initialize_schema().await?;
        let pool = db.pool().clone();

        // Repositories
        let projects = ProjectRepo::new(pool.clone());
        let chapters = ChapterRepo::new(pool.clone());
        let jobs = JobRepo::new(pool.clone());
        let schedules = ScheduleRepo::new(pool.clone());
        let worlds = WorldRepo::new(pool.clone());
        let characters = CharacterRepo::new(pool.clone());
        let items_repo = ItemRepo::new(pool.clone());
        let embeddings = EmbeddingRepo::new(pool.clone());

        // LLM plumbing: chat client, retry wrapper, budget governor.
        let chat = ChatClient::new(&config.llm_base_url, config.llm_api_key.clone());
        let resilient: Arc<dyn LlmPort> =
            Arc::new(ResilientLlmClient::new(Arc::new(chat), RetryConfig::default()));
        let governor = Arc::new(CostGovernor::new(
            CostRepo::new(pool.clone()),
            config.budget,
            config.tier_models.clone(),
        ));
        let llm = AgentLlm::new(resilient, governor);

        let registry = Arc::new(StyleRegistry::new());

        // Trackers
        let canon = Arc::new(CanonResolver::new(CanonRepo::new(pool.clone()), llm.clone()));
        let consistency = Arc::new(ConsistencyChecker::new(
            characters.clone(),
            IssueRepo::new(pool.clone()),
            llm.clone(),
        ));
        let power = Arc::new(PowerTracker::new(characters.clone()));
        let beats = Arc::new(BeatLedger::new(BeatRepo::new(pool.clone())));
        let items = Arc::new(ItemTracker::new(items_repo.clone()));
        let depth = Arc::new(CharacterDepthTracker::new(characters.clone()));
        let romance = Arc::new(RomanceTracker::new(characters));

        // Retrieval + memory
        let embedder = Arc::new(EmbeddingClient::new(
            &config.llm_base_url,
            config.llm_api_key.clone(),
        ));
        let rag = Arc::new(RagService::new(
            embedder,
            embeddings.clone(),
            Arc::new(EmbeddingMemoryCache::new(
                EMBEDDING_CACHE_CAPACITY,
                EMBEDDING_CACHE_TTL,
            )),
            config.embedding_model.clone(),
        ));
        let memory = Arc::new(MemoryManager::new(worlds.clone(), llm.clone()));

        // The three-agent pipeline
        let pipeline = Arc::new(ChapterWriter::new(
            Architect::new(llm.clone(), registry.clone()),
            Writer::new(llm.clone(), registry.clone()),
            Critic::new(llm.clone()),
            QualityGate::new(GateThresholds::default()),
            canon.clone(),
            consistency.clone(),
            power.clone(),
            config.max_chapter_retries,
        ));

        let runner = Arc::new(Runner::new(
            projects.clone(),
            chapters.clone(),
            jobs.clone(),
            worlds,
            items_repo,
            pipeline,
            memory,
            rag,
            beats,
            canon,
            consistency,
            power,
            items,
            depth,
            romance,
            registry,
            Duration::from_secs(config.batch_time_limit_secs),
        ));

        let scheduler = Arc::new(Scheduler::new(
            schedules.clone(),
            runner.clone(),
            config.scheduler_tick_cap,
        ));

        Ok(Self {
            config,
            db,
            runner,
            scheduler,
            projects,
            chapters,
            jobs,
            schedules,
            embeddings,
        })
    }
}
