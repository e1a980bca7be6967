//! Runner: project setup, the chapter job state machine, batch
//! production and cooperative cancellation.
//!
//! Within one project at most one job runs at a time (advisory per-
//! project mutex). Across projects jobs are independent. Tracker writes
//! after approval are best effort; the chapter row and job state stay
//! authoritative.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::application::services::chapter_writer::{
    CancelFlag, ChapterContext, ChapterDraftResult, ChapterWriter, PipelineOutcome, ProgressSink,
};
use crate::application::services::memory::MemoryManager;
use crate::application::services::quality_gate::GateSeverity;
use crate::application::services::rag::{RagService, DEFAULT_SIMILARITY_THRESHOLD};
use crate::application::services::style::StyleRegistry;
use crate::application::services::trackers::{
    BeatLedger, CanonResolver, CharacterDepthTracker, ConsistencyChecker, ItemTracker,
    PowerTracker, RomanceTracker,
};
use crate::infrastructure::error::FactoryError;
use crate::infrastructure::persistence::{ChapterRepo, ItemRepo, JobRepo, ProjectRepo, WorldRepo};
use storyforge_domain::{
    plan_arc_ranges, BreakthroughTrigger, CanonCategory, Chapter, ChapterStatus, DopamineType,
    GenreType, ItemGrade, Job, JobId, JobStatus, NpcRole, Project, ProjectId, ProjectStatus,
    StoryArc, TrackedItem, UserId, WorldBible,
};

/// Snippets retrieved for the Architect context.
const RAG_TOP_K: usize = 5;

/// Result of a batch run.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub chapters_written: u32,
    pub chapters_failed: u32,
    pub stopped_reason: Option<String>,
}

/// Project setup payload for `create_project`.
pub struct ProjectSetup {
    pub title: String,
    pub genre: GenreType,
    pub target_chapters: u32,
    pub target_chapter_words: u32,
    pub chapters_per_arc: Option<u32>,
    pub protagonist_name: String,
    pub world_bible: Option<WorldBible>,
}

/// Everything the runner drives.
pub struct Runner {
    pub projects: ProjectRepo,
    pub chapters: ChapterRepo,
    pub jobs: JobRepo,
    pub worlds: WorldRepo,
    pub items_repo: ItemRepo,
    pub pipeline: Arc<ChapterWriter>,
    pub memory: Arc<MemoryManager>,
    pub rag: Arc<RagService>,
    pub beats: Arc<BeatLedger>,
    pub canon: Arc<CanonResolver>,
    pub consistency: Arc<ConsistencyChecker>,
    pub power: Arc<PowerTracker>,
    pub items: Arc<ItemTracker>,
    pub depth: Arc<CharacterDepthTracker>,
    pub romance: Arc<RomanceTracker>,
    pub registry: Arc<StyleRegistry>,
    /// Advisory per-project mutex map; an entry exists while the project
    /// has produced at least one job and is dropped on completion.
    locks: DashMap<ProjectId, Arc<Mutex<()>>>,
    /// Cancel flags per live job.
    cancels: DashMap<JobId, CancelFlag>,
    batch_time_limit: Duration,
}

impl Runner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        projects: ProjectRepo,
        chapters: ChapterRepo,
        jobs: JobRepo,
        worlds: WorldRepo,
        items_repo: ItemRepo,
        pipeline: Arc<ChapterWriter>,
        memory: Arc<MemoryManager>,
        rag: Arc<RagService>,
        beats: Arc<BeatLedger>,
        canon: Arc<CanonResolver>,
        consistency: Arc<ConsistencyChecker>,
        power: Arc<PowerTracker>,
        items: Arc<ItemTracker>,
        depth: Arc<CharacterDepthTracker>,
        romance: Arc<RomanceTracker>,
        registry: Arc<StyleRegistry>,
        batch_time_limit: Duration,
    ) -> Self {
        Self {
            projects,
            chapters,
            jobs,
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
            locks: DashMap::new(),
            cancels: DashMap::new(),
            batch_time_limit,
        }
    }

    // =========================================================================
    // Project setup
    // =========================================================================

    /// Create a project with its world bible and arc plan.
    pub async fn create_project(
        &self,
        owner: UserId,
        setup: ProjectSetup,
    ) -> Result<Project, FactoryError> {
        let mut project = Project::new(
            owner,
            setup.title,
            setup.genre,
            setup.target_chapters,
            setup.target_chapter_words,
            Utc::now(),
        )?;
        if let Some(per_arc) = setup.chapters_per_arc {
            project = project.with_chapters_per_arc(per_arc)?;
        }

        let world = match setup.world_bible {
            Some(mut world) => {
                world.project_id = project.id;
                world.validate()?;
                world
            }
            None => self.default_world_bible(&project, &setup.protagonist_name),
        };

        self.projects.insert(&project).await.map_err(FactoryError::from)?;
        self.worlds
            .upsert_world_bible(&world)
            .await
            .map_err(FactoryError::from)?;

        // Story-wide outline: partition the chapter space into themed arcs.
        for (number, (start, end, theme)) in plan_arc_ranges(
            project.target_chapters,
            project.chapters_per_arc,
        )
        .into_iter()
        .enumerate()
        {
            let arc = StoryArc::new(
                project.id,
                number as u32 + 1,
                format!("Arc {}: {}", number + 1, theme.as_str()),
                theme,
                start,
                end,
            )?;
            self.worlds.insert_arc(&arc).await.map_err(FactoryError::from)?;
        }

        tracing::info!(project = %project.id, "Project created");
        Ok(project)
    }

    fn default_world_bible(&self, project: &Project, protagonist: &str) -> WorldBible {
        let power_system = self.registry.power_system(project.genre).clone();
        let realm = power_system
            .realms
            .first()
            .map(|r| r.name.clone())
            .unwrap_or_default();
        WorldBible {
            project_id: project.id,
            story_title: project.title.clone(),
            power_system,
            protagonist: storyforge_domain::Protagonist {
                name: protagonist.to_string(),
                realm,
                level: 1,
                traits: vec![],
                abilities: vec![],
                inventory: vec![],
                goals: vec![],
                status: "alive".to_string(),
            },
            npc_relationships: vec![],
            locations: vec![],
            plot_threads: vec![],
            foreshadowing: vec![],
            world_rules: vec![],
        }
    }

    // =========================================================================
    // Job lifecycle
    // =========================================================================

    /// Allocate a job and run the chapter pipeline to completion.
    /// Returns the finished job record.
    pub async fn write_chapter(
        &self,
        project_id: ProjectId,
        chapter_number: Option<u32>,
    ) -> Result<Job, FactoryError> {
        let lock = self
            .locks
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let Ok(_guard) = lock.try_lock() else {
            return Err(FactoryError::BusyProject);
        };

        let project = self
            .projects
            .get(project_id)
            .await?
            .ok_or_else(|| FactoryError::not_found("Project", project_id))?;
        if project.status == ProjectStatus::Completed {
            return Err(FactoryError::ValidationFailed(
                "project is already completed".to_string(),
            ));
        }
        let chapter_number = chapter_number.unwrap_or_else(|| project.next_chapter());

        let mut job = Job::new(project_id, chapter_number, Utc::now());
        self.jobs.insert(&job).await?;
        let cancel = CancelFlag::new();
        self.cancels.insert(job.id, cancel.clone());

        let outcome = self
            .run_chapter_job(&project, &mut job, chapter_number, &cancel)
            .await;
        self.cancels.remove(&job.id);

        match outcome {
            Ok(()) => {}
            Err(e) => {
                job.error = Some(format!("{} ({})", e, e.code()));
                if !job.status.is_terminal() {
                    let _ = job.transition(JobStatus::Failed, Utc::now());
                }
                self.jobs.update(&job).await.ok();
                // Budget exhaustion pauses the project for the reset;
                // other failures surface as the error status.
                let status = if matches!(e, FactoryError::BudgetExceeded(_)) {
                    ProjectStatus::Paused
                } else {
                    ProjectStatus::Error
                };
                self.projects.set_status(project_id, status).await.ok();
                return Err(e);
            }
        }

        self.jobs.update(&job).await?;
        Ok(job)
    }

    /// Spawn `write_chapter` in the background and return the job id
    /// immediately (the polling API).
    pub fn start_chapter_job(self: &Arc<Self>, project_id: ProjectId) -> JobId {
        // The job record is created inside write_chapter; hand back a
        // pre-allocated id by creating the record here instead.
        let job = Job::new(project_id, 0, Utc::now());
        let job_id = job.id;
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = runner.write_chapter_with_job(project_id, job).await {
                tracing::warn!(project = %project_id, error = %e, "Background chapter job failed");
            }
        });
        job_id
    }

    /// `write_chapter` against a pre-allocated job record (background path).
    async fn write_chapter_with_job(
        &self,
        project_id: ProjectId,
        mut job: Job,
    ) -> Result<(), FactoryError> {
        let lock = self
            .locks
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.try_lock();

        let project = match self.projects.get(project_id).await? {
            Some(project) => project,
            None => {
                job.error = Some("project not found".to_string());
                let _ = job.transition(JobStatus::Failed, Utc::now());
                self.jobs.insert(&job).await.ok();
                return Err(FactoryError::not_found("Project", project_id));
            }
        };
        job.chapter_number = project.next_chapter();
        self.jobs.insert(&job).await?;

        if guard.is_err() {
            job.error = Some("project already has a running job".to_string());
            let _ = job.transition(JobStatus::Failed, Utc::now());
            self.jobs.update(&job).await.ok();
            return Err(FactoryError::BusyProject);
        }

        let cancel = CancelFlag::new();
        self.cancels.insert(job.id, cancel.clone());
        let chapter_number = job.chapter_number;
        let outcome = self
            .run_chapter_job(&project, &mut job, chapter_number, &cancel)
            .await;
        self.cancels.remove(&job.id);

        match outcome {
            Ok(()) => {
                self.jobs.update(&job).await?;
                Ok(())
            }
            Err(e) => {
                job.error = Some(format!("{} ({})", e, e.code()));
                if !job.status.is_terminal() {
                    let _ = job.transition(JobStatus::Failed, Utc::now());
                }
                self.jobs.update(&job).await.ok();
                let status = if matches!(e, FactoryError::BudgetExceeded(_)) {
                    ProjectStatus::Paused
                } else {
                    ProjectStatus::Error
                };
                self.projects.set_status(project_id, status).await.ok();
                Err(e)
            }
        }
    }

    /// Cooperative stop: flips the cancel flag; the pipeline observes it
    /// at the next suspension point.
    pub async fn stop_job(&self, job_id: JobId) -> Result<(), FactoryError> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| FactoryError::not_found("Job", job_id))?;
        if job.status.is_terminal() {
            return Ok(());
        }
        if let Some(flag) = self.cancels.get(&job_id) {
            flag.cancel();
            return Ok(());
        }
        // No live flag: the job never started running (e.g. crash).
        let mut job = job;
        let _ = job.transition(JobStatus::Stopped, Utc::now());
        self.jobs.update(&job).await?;
        Ok(())
    }

    /// Serial batch production. Stops on the first failure unless
    /// `continue_on_error`; always bounded by the wall-clock limit.
    pub async fn write_batch(
        &self,
        project_id: ProjectId,
        count: u32,
        continue_on_error: bool,
    ) -> Result<BatchResult, FactoryError> {
        let started = tokio::time::Instant::now();
        let mut result = BatchResult::default();

        for _ in 0..count {
            if started.elapsed() >= self.batch_time_limit {
                result.stopped_reason = Some("batch time limit reached".to_string());
                break;
            }
            match self.write_chapter(project_id, None).await {
                Ok(job) if job.status == JobStatus::Completed => {
                    result.chapters_written += 1;
                }
                Ok(job) => {
                    result.chapters_failed += 1;
                    result.stopped_reason = job.error.clone();
                    if !continue_on_error {
                        break;
                    }
                }
                Err(e) => {
                    result.chapters_failed += 1;
                    result.stopped_reason = Some(e.to_string());
                    if !continue_on_error || matches!(e, FactoryError::BudgetExceeded(_)) {
                        break;
                    }
                }
            }
        }
        Ok(result)
    }

    /// Drive a project until its planned chapters are all written (or a
    /// failure stops the loop).
    pub async fn run_until_complete(&self, project_id: ProjectId) -> Result<BatchResult, FactoryError> {
        let project = self
            .projects
            .get(project_id)
            .await?
            .ok_or_else(|| FactoryError::not_found("Project", project_id))?;
        let remaining = project
            .target_chapters
            .saturating_sub(project.current_chapter);
        self.write_batch(project_id, remaining, false).await
    }

    // =========================================================================
    // The pipeline run for one job
    // =========================================================================

    async fn run_chapter_job(
        &self,
        project: &Project,
        job: &mut Job,
        chapter_number: u32,
        cancel: &CancelFlag,
    ) -> Result<(), FactoryError> {
        job.transition(JobStatus::Running, Utc::now())?;
        job.report_progress(5, "context", Utc::now());
        self.jobs.update(job).await?;
        self.projects
            .set_status(project.id, ProjectStatus::Writing)
            .await
            .ok();

        // Chapter n requires chapter n-1 on disk (unless rolled back).
        if chapter_number > 1
            && self
                .chapters
                .get_by_number(project.id, chapter_number - 1)
                .await?
                .is_none()
        {
            return Err(FactoryError::ValidationFailed(format!(
                "chapter {} cannot be written before chapter {}",
                chapter_number,
                chapter_number - 1
            )));
        }
        // A rejected draft left by a previous attempt is replaced.
        if let Some(stale) = self
            .chapters
            .get_by_number(project.id, chapter_number)
            .await?
        {
            if stale.status == ChapterStatus::Rejected {
                self.chapters.delete(stale.id).await?;
            } else {
                return Err(FactoryError::ValidationFailed(format!(
                    "chapter {chapter_number} already exists"
                )));
            }
        }

        let world = self
            .worlds
            .get_world_bible(project.id)
            .await?
            .ok_or_else(|| FactoryError::not_found("WorldBible", project.id))?;

        let context = self.build_context(project, &world, chapter_number).await?;

        let sink = JobProgressSink {
            jobs: self.jobs.clone(),
            job: Mutex::new(job.clone()),
        };
        let outcome = self
            .pipeline
            .produce(project, &world, chapter_number, &context, cancel, &sink)
            .await?;
        *job = sink.job.into_inner();

        let result = match outcome {
            PipelineOutcome::Cancelled => {
                job.transition(JobStatus::Stopped, Utc::now())?;
                self.projects
                    .set_status(project.id, ProjectStatus::Idle)
                    .await
                    .ok();
                tracing::info!(job = %job.id, "Job stopped cooperatively");
                return Ok(());
            }
            PipelineOutcome::Completed(result) => result,
        };

        if result.approved {
            self.commit_chapter(project, &world, job, chapter_number, *result)
                .await
        } else {
            self.handle_rejection(project, job, chapter_number, *result)
                .await
        }
    }

    async fn build_context(
        &self,
        project: &Project,
        world: &WorldBible,
        chapter_number: u32,
    ) -> Result<ChapterContext, FactoryError> {
        let arc = self
            .worlds
            .arc_for_chapter(project.id, chapter_number)
            .await?;
        let memory = self
            .memory
            .writer_context(project.id, chapter_number, arc.as_ref())
            .await?;

        // Retrieval query: the freshest summary plus the active cast.
        let mut query = memory
            .previous_summaries
            .last()
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| world.story_title.clone());
        query.push(' ');
        query.push_str(&world.protagonist.name);
        let mut rag_snippets: Vec<String> = match self
            .rag
            .retrieve(project.id, &query, RAG_TOP_K, DEFAULT_SIMILARITY_THRESHOLD)
            .await
        {
            Ok(snippets) => snippets.into_iter().map(|s| s.content).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval failed; planning without snippets");
                vec![]
            }
        };

        // Tracker reminders ride along with the retrieved context.
        if let Ok(forgotten) = self.items.forgotten(project.id, chapter_number).await {
            for item in forgotten {
                rag_snippets.push(format!(
                    "Vật phẩm '{}' của {} chưa xuất hiện lại từ chương {}",
                    item.name, item.current_owner, item.last_mention_chapter
                ));
            }
        }
        if let Ok(stalled) = self.romance.stalled(project.id, chapter_number).await {
            for romance in stalled {
                rag_snippets.push(format!(
                    "Tuyến tình cảm {}/{} giậm chân ở '{}' từ chương {}",
                    romance.character_a,
                    romance.character_b,
                    romance.current_stage.as_str(),
                    romance.stage_entered_chapter
                ));
            }
        }
        if let Ok(stagnant) = self.depth.needs_development(project.id, chapter_number).await {
            for name in stagnant {
                rag_snippets.push(format!(
                    "Nhân vật {name} đã lâu không có bước phát triển đáng kể"
                ));
            }
        }

        let arc_number = arc.as_ref().map(|a| a.number).unwrap_or(1);
        let recommendations = self
            .beats
            .recommendations(project.id, chapter_number, arc_number)
            .await
            .unwrap_or_default();

        let prior_titles = self.chapters.list_titles(project.id).await?;

        Ok(ChapterContext {
            arc,
            previous_summaries: memory.previous_summaries,
            arc_summary: memory.arc_summary,
            rag_snippets,
            suggested_beats: recommendations.suggested,
            avoid_beats: recommendations.avoid,
            prior_titles,
        })
    }

    /// Persist an approved chapter and run the tracker commits.
    async fn commit_chapter(
        &self,
        project: &Project,
        world: &WorldBible,
        job: &mut Job,
        chapter_number: u32,
        result: ChapterDraftResult,
    ) -> Result<(), FactoryError> {
        let mut chapter = Chapter::new(
            project.id,
            chapter_number,
            result.title.clone(),
            result.content.clone(),
            Utc::now(),
        )?
        .with_quality(
            result.critic.overall_score,
            result.outline.dopamine_points.len() as u32,
        );
        chapter.approve();
        self.chapters.insert(&chapter).await?;

        // The project pointer is part of the chapter's logical commit; a
        // failure here deletes the chapter row so the job can re-attempt.
        if let Err(e) = self
            .projects
            .advance_chapter(project.id, chapter_number)
            .await
        {
            tracing::error!(error = %e, "Chapter commit failed; rolling back row");
            self.chapters.delete(chapter.id).await.ok();
            return Err(e.into());
        }

        // Tracker updates: best effort, log and continue.
        self.update_trackers(project, world, chapter_number, &result)
            .await;

        let updated = self.projects.get(project.id).await?;
        if updated.map(|p| p.is_complete()).unwrap_or(false) {
            self.projects
                .set_status(project.id, ProjectStatus::Completed)
                .await
                .ok();
            self.locks.remove(&project.id);
            tracing::info!(project = %project.id, "Project completed");
        } else {
            self.projects
                .set_status(project.id, ProjectStatus::Idle)
                .await
                .ok();
        }

        job.result_chapter_id = Some(chapter.id);
        job.report_progress(100, "persist", Utc::now());
        job.transition(JobStatus::Completed, Utc::now())?;
        tracing::info!(
            job = %job.id,
            chapter = chapter_number,
            retries = result.retry_count,
            "Chapter approved and committed"
        );
        Ok(())
    }

    async fn handle_rejection(
        &self,
        project: &Project,
        job: &mut Job,
        chapter_number: u32,
        result: ChapterDraftResult,
    ) -> Result<(), FactoryError> {
        if result.gate.severity == Some(GateSeverity::Fatal) {
            // Canon conflicts and critical consistency issues surface to
            // the user with the offending fragment; no chapter row.
            self.consistency.store_issues(&result.consistency_issues).await;
            let detail = result
                .gate
                .reasons
                .first()
                .cloned()
                .unwrap_or_else(|| "blocked by gate".to_string());
            let error = if result.gate.reasons.iter().any(|r| r.contains("canon")) {
                FactoryError::CanonConflict(detail)
            } else {
                FactoryError::ConsistencyCritical(detail)
            };
            return Err(error);
        }

        // Retry budget exhausted: keep the last draft for inspection.
        let mut draft = Chapter::new(
            project.id,
            chapter_number,
            result.title,
            result.content,
            Utc::now(),
        )?
        .with_quality(result.critic.overall_score, 0);
        draft.reject();
        if self.chapters.insert(&draft).await.is_ok() {
            job.result_chapter_id = Some(draft.id);
        }

        if result.word_count * 10 < result.outline.target_word_count * 6 {
            return Err(FactoryError::WordCountFloor(format!(
                "draft reached {} of {} words after all retries",
                result.word_count, result.outline.target_word_count
            )));
        }
        Err(FactoryError::ValidationFailed(format!(
            "chapter rejected after {} rewrite attempts: {}",
            result.retry_count,
            result.gate.reasons.join("; ")
        )))
    }

    /// Post-approval tracker commits. Any failure is logged and skipped;
    /// a tracker outage must not fail the chapter write.
    async fn update_trackers(
        &self,
        project: &Project,
        world: &WorldBible,
        chapter_number: u32,
        result: &ChapterDraftResult,
    ) {
        let arc_number = chapter_number.div_ceil(project.chapters_per_arc.max(1));

        // Canon facts.
        if let Err(e) = self
            .canon
            .commit(project.id, chapter_number, result.candidate_facts.clone())
            .await
        {
            tracing::warn!(error = %e, "Canon commit failed");
        }
        if let Err(e) = self.canon.expire(project.id, chapter_number).await {
            tracing::warn!(error = %e, "Canon expiry failed");
        }
        if let Err(e) = self
            .consistency
            .apply_facts(project.id, chapter_number, &result.candidate_facts)
            .await
        {
            tracing::warn!(error = %e, "Character state update failed");
        }
        self.consistency.store_issues(&result.consistency_issues).await;

        // Beats.
        match self
            .beats
            .detect_and_record(project.id, chapter_number, arc_number, &result.content)
            .await
        {
            Ok((_, warnings)) => {
                for warning in warnings {
                    tracing::warn!(beat = %warning.beat, "{}", warning.message);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Beat detection failed"),
        }

        // Items: mentions of known items plus new items from canon facts.
        if let Err(e) = self
            .items
            .record_mentions(project.id, chapter_number, &result.content)
            .await
        {
            tracing::warn!(error = %e, "Item mention scan failed");
        }
        for fact in result
            .candidate_facts
            .iter()
            .filter(|f| f.category == CanonCategory::Item)
        {
            let Some(name) = fact.entities.first() else { continue };
            if self
                .items_repo
                .get_by_name(project.id, name)
                .await
                .ok()
                .flatten()
                .is_some()
            {
                continue;
            }
            let item = TrackedItem::new(
                project.id,
                name.clone(),
                "vật phẩm",
                grade_from_statement(&fact.statement),
                world.protagonist.name.clone(),
                chapter_number,
            );
            match self.items.register(item, project.target_chapters).await {
                Ok(registration) => {
                    if let crate::application::services::trackers::ItemRegistration::Registered {
                        warning: Some(warning),
                    } = registration
                    {
                        tracing::warn!("{}", warning);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Item registration failed"),
            }
        }

        // Power progression when a breakthrough was delivered.
        let delivered: Vec<DopamineType> = result
            .outline
            .dopamine_points
            .iter()
            .map(|p| p.kind)
            .collect();
        if delivered.contains(&DopamineType::Breakthrough) {
            let trigger = if delivered.contains(&DopamineType::Windfall) {
                BreakthroughTrigger::Treasure
            } else {
                BreakthroughTrigger::Cultivation
            };
            match self
                .power
                .record_breakthrough(
                    project.id,
                    world,
                    &world.protagonist.name,
                    chapter_number,
                    Some(trigger),
                    None,
                )
                .await
            {
                Ok(outcome) => tracing::debug!(?outcome, "Breakthrough processed"),
                Err(e) => tracing::warn!(error = %e, "Power tracker update failed"),
            }
        }

        // Romance moments.
        if delivered.contains(&DopamineType::RomanceSpark) {
            if let Some(interest) = world
                .npc_relationships
                .iter()
                .find(|r| r.role == NpcRole::LoveInterest)
            {
                if let Err(e) = self
                    .romance
                    .record_moment(
                        project.id,
                        &world.protagonist.name,
                        &interest.name,
                        &format!("khoảnh khắc chương {chapter_number}"),
                    )
                    .await
                {
                    tracing::warn!(error = %e, "Romance tracker update failed");
                }
            }
        }

        // Character appearances.
        let cast: Vec<String> = result
            .outline
            .scenes
            .iter()
            .flat_map(|s| s.characters.iter().cloned())
            .collect();
        if let Err(e) = self
            .depth
            .record_appearances(project.id, chapter_number, &cast)
            .await
        {
            tracing::warn!(error = %e, "Appearance tracking failed");
        }

        // Memory and retrieval index.
        if let Err(e) = self
            .memory
            .summarize_chapter(project.id, chapter_number, &result.content)
            .await
        {
            tracing::warn!(error = %e, "Chapter summary failed");
        }
        if let Ok(Some(arc)) = self.worlds.arc_for_chapter(project.id, chapter_number).await {
            if let Err(e) = self
                .memory
                .maybe_update_arc_summary(project.id, &arc, chapter_number)
                .await
            {
                tracing::warn!(error = %e, "Arc summary failed");
            }
        }
        if let Err(e) = self
            .rag
            .index_chapter(project.id, chapter_number, &result.content)
            .await
        {
            tracing::warn!(error = %e, "RAG indexing failed");
        }
    }

    // =========================================================================
    // Chapter deletion with tracker rollback
    // =========================================================================

    /// Delete a chapter and roll its tracker state back.
    pub async fn delete_chapter(
        &self,
        owner: UserId,
        chapter_id: storyforge_domain::ChapterId,
    ) -> Result<(), FactoryError> {
        let chapter = self
            .chapters
            .get(chapter_id)
            .await?
            .ok_or_else(|| FactoryError::not_found("Chapter", chapter_id))?;
        let project = self
            .projects
            .get(chapter.project_id)
            .await?
            .ok_or_else(|| FactoryError::not_found("Project", chapter.project_id))?;
        if project.owner_id != owner {
            return Err(FactoryError::PermissionDenied);
        }

        self.chapters.delete(chapter_id).await?;

        let project_id = project.id;
        let number = chapter.number;
        if let Err(e) = self.canon.rollback_chapter(project_id, number).await {
            tracing::warn!(error = %e, "Canon rollback failed");
        }
        if let Err(e) = self.beats.rollback_chapter(project_id, number).await {
            tracing::warn!(error = %e, "Beat rollback failed");
        }
        if let Err(e) = self.items.rollback_chapter(project_id, number).await {
            tracing::warn!(error = %e, "Item rollback failed");
        }
        if let Err(e) = self.consistency.rollback_chapter(project_id, number).await {
            tracing::warn!(error = %e, "Issue rollback failed");
        }
        if let Ok(Some(world)) = self.worlds.get_world_bible(project_id).await {
            if let Err(e) = self
                .power
                .rollback_chapter(project_id, &world, &world.protagonist.name, number)
                .await
            {
                tracing::warn!(error = %e, "Power rollback failed");
            }
        }
        self.memory.rollback_chapter(project_id, number).await;
        self.rag.rollback_chapter(project_id, number).await;

        tracing::info!(project = %project_id, chapter = number, "Chapter deleted and trackers rolled back");
        Ok(())
    }

    /// Crash recovery for jobs left running by a dead process.
    pub async fn recover_orphaned_jobs(&self) -> Result<u64, FactoryError> {
        let recovered = self.jobs.fail_orphaned_running().await?;
        if recovered > 0 {
            tracing::warn!(count = recovered, "Recovered orphaned running jobs");
        }
        Ok(recovered)
    }
}

/// Grade guessed from a fact statement, defaulting to mortal grade.
fn grade_from_statement(statement: &str) -> ItemGrade {
    let lowered = statement.to_lowercase();
    ItemGrade::ALL
        .iter()
        .rev()
        .find(|g| lowered.contains(g.display_name()))
        .copied()
        .unwrap_or(ItemGrade::Pham)
}

/// Persists progress updates as the pipeline reports them.
struct JobProgressSink {
    jobs: JobRepo,
    job: Mutex<Job>,
}

#[async_trait]
impl ProgressSink for JobProgressSink {
    async fn report(&self, percent: u8, step: &str) {
        let mut job = self.job.lock().await;
        job.report_progress(percent, step, Utc::now());
        if let Err(e) = self.jobs.update(&job).await {
            tracing::warn!(error = %e, "Failed to persist job progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::chapter_writer::test_support::{
        approving_critic, fixture_with_budget, no_facts, outline_json, prose,
    };
    use crate::application::services::cost::CostGovernor;
    use crate::application::services::llm::test_support::ScriptedLlm;
    use crate::application::services::llm::AgentLlm;
    use crate::infrastructure::config::{BudgetConfig, TierModels};
    use crate::infrastructure::persistence::{CostRepo, EmbeddingRepo, IssueRepo};
    use crate::infrastructure::cache::{EmbeddingMemoryCache, EMBEDDING_CACHE_TTL};
    use crate::infrastructure::persistence::{BeatRepo, CanonRepo, CharacterRepo};
    use crate::infrastructure::ports::{EmbedError, EmbeddingPort, LlmResponse};

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingPort for StubEmbedder {
        async fn embed(
            &self,
            texts: &[String],
            _model: &str,
        ) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts
                .iter()
                .map(|t| vec![t.chars().count() as f32, 1.0])
                .collect())
        }
    }

    /// Full runner over in-memory storage and a scripted LLM.
    async fn runner(responses: Vec<LlmResponse>, budget: f64) -> (Arc<Runner>, Project) {
        let f = fixture_with_budget(responses, budget).await;
        let pool = f.db.pool().clone();
        let governor = Arc::new(CostGovernor::new(
            CostRepo::new(pool.clone()),
            BudgetConfig {
                daily_usd: budget,
                session_usd: budget,
            },
            TierModels {
                small: "s".into(),
                medium: "m".into(),
                large: "l".into(),
            },
        ));
        // Small-tier helpers share the pipeline's scripted LLM through
        // separate service instances.
        let llm = AgentLlm::new(
            Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text("tóm tắt chương")])),
            governor,
        );
        let worlds = WorldRepo::new(pool.clone());
        let characters = CharacterRepo::new(pool.clone());
        let items_repo = ItemRepo::new(pool.clone());
        let registry = Arc::new(StyleRegistry::new());

        let canon = Arc::new(CanonResolver::new(CanonRepo::new(pool.clone()), llm.clone()));
        let consistency = Arc::new(ConsistencyChecker::new(
            characters.clone(),
            IssueRepo::new(pool.clone()),
            llm.clone(),
        ));
        let runner = Arc::new(Runner::new(
            ProjectRepo::new(pool.clone()),
            ChapterRepo::new(pool.clone()),
            JobRepo::new(pool.clone()),
            worlds.clone(),
            items_repo.clone(),
            Arc::new(f.writer),
            Arc::new(MemoryManager::new(worlds, llm.clone())),
            Arc::new(RagService::new(
                Arc::new(StubEmbedder),
                EmbeddingRepo::new(pool.clone()),
                Arc::new(EmbeddingMemoryCache::new(100, EMBEDDING_CACHE_TTL)),
                "test-embed",
            )),
            Arc::new(BeatLedger::new(BeatRepo::new(pool.clone()))),
            canon,
            consistency,
            Arc::new(PowerTracker::new(characters.clone())),
            Arc::new(ItemTracker::new(items_repo)),
            Arc::new(CharacterDepthTracker::new(characters.clone())),
            Arc::new(RomanceTracker::new(characters)),
            registry,
            Duration::from_secs(3600),
        ));

        let project = runner
            .create_project(
                f.project.owner_id,
                ProjectSetup {
                    title: "Kiếm Đạo Độc Tôn".to_string(),
                    genre: GenreType::TienHiep,
                    target_chapters: 10,
                    target_chapter_words: 1000,
                    chapters_per_arc: Some(5),
                    protagonist_name: "Hàn Phong".to_string(),
                    world_bible: None,
                },
            )
            .await
            .expect("project");

        (runner, project)
    }

    fn happy_responses(n: u32) -> Vec<LlmResponse> {
        let mut responses = Vec::new();
        for i in 0..n {
            responses.push(ScriptedLlm::text(&outline_json(&format!(
                "Vòng Loại Thứ {i} Rực Lửa"
            ))));
            responses.push(ScriptedLlm::text(&prose(1040)));
            responses.push(ScriptedLlm::text(&no_facts()));
            responses.push(ScriptedLlm::text(&approving_critic()));
        }
        responses
    }

    #[tokio::test]
    async fn completed_job_advances_project_pointer() {
        let (runner, project) = runner(happy_responses(1), 100.0).await;

        let job = runner.write_chapter(project.id, None).await.expect("job");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.result_chapter_id.is_some());

        let updated = runner
            .projects
            .get(project.id)
            .await
            .expect("get")
            .expect("found");
        assert_eq!(updated.current_chapter, 1);

        let chapter = runner
            .chapters
            .get_by_number(project.id, 1)
            .await
            .expect("get")
            .expect("row");
        assert_eq!(chapter.status, ChapterStatus::Approved);
        assert!(chapter.word_count >= 700);
    }

    #[tokio::test]
    async fn project_arcs_partition_chapter_space() {
        let (runner, project) = runner(vec![], 100.0).await;
        let arcs = runner.worlds.list_arcs(project.id).await.expect("arcs");
        assert_eq!(arcs.len(), 2, "10 chapters at 5 per arc");
        assert_eq!(arcs[0].start_chapter, 1);
        assert_eq!(arcs[1].end_chapter, 10);
    }

    #[tokio::test]
    async fn budget_exhaustion_pauses_project() {
        // A budget too small for even the first outline call.
        let (runner, project) = runner(happy_responses(1), 0.000001).await;

        let err = runner
            .write_chapter(project.id, None)
            .await
            .expect_err("denied");
        assert!(matches!(err, FactoryError::BudgetExceeded(_)));

        let updated = runner
            .projects
            .get(project.id)
            .await
            .expect("get")
            .expect("found");
        assert_eq!(updated.status, ProjectStatus::Paused);
    }

    #[tokio::test]
    async fn batch_runs_chapters_in_sequence() {
        let (runner, project) = runner(happy_responses(3), 100.0).await;

        let result = runner
            .write_batch(project.id, 3, false)
            .await
            .expect("batch");
        assert_eq!(result.chapters_written, 3);
        assert_eq!(result.chapters_failed, 0);

        let updated = runner
            .projects
            .get(project.id)
            .await
            .expect("get")
            .expect("found");
        assert_eq!(updated.current_chapter, 3);
    }

    #[tokio::test]
    async fn chapter_delete_rolls_back_trackers() {
        let (runner, project) = runner(happy_responses(1), 100.0).await;
        let job = runner.write_chapter(project.id, None).await.expect("job");
        let chapter_id = job.result_chapter_id.expect("chapter id");

        runner
            .delete_chapter(project.owner_id, chapter_id)
            .await
            .expect("delete");
        assert!(runner
            .chapters
            .get(chapter_id)
            .await
            .expect("get")
            .is_none());
    }

    #[tokio::test]
    async fn delete_requires_ownership() {
        let (runner, project) = runner(happy_responses(1), 100.0).await;
        let job = runner.write_chapter(project.id, None).await.expect("job");
        let chapter_id = job.result_chapter_id.expect("chapter id");

        let err = runner
            .delete_chapter(UserId::new(), chapter_id)
            .await
            .expect_err("denied");
        assert!(matches!(err, FactoryError::PermissionDenied));
    }

    #[tokio::test]
    async fn stopping_finished_job_is_noop() {
        let (runner, project) = runner(happy_responses(1), 100.0).await;
        let job = runner.write_chapter(project.id, None).await.expect("job");
        runner.stop_job(job.id).await.expect("stop");
        let reloaded = runner.jobs.get(job.id).await.expect("get").expect("found");
        assert_eq!(reloaded.status, JobStatus::Completed);
    }
}
