//! Scheduler: wakes periodically, runs due schedules through the batch
//! path with a per-tick project cap.

use std::sync::Arc;

use chrono::Utc;

use crate::application::services::runner::Runner;
use crate::infrastructure::error::FactoryError;
use crate::infrastructure::persistence::ScheduleRepo;

/// One tick's outcome, as reported by the admin command.
#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickResult {
    pub processed: u32,
    pub chapters_created: u32,
}

pub struct Scheduler {
    schedules: ScheduleRepo,
    runner: Arc<Runner>,
    tick_cap: usize,
}

impl Scheduler {
    pub fn new(schedules: ScheduleRepo, runner: Arc<Runner>, tick_cap: usize) -> Self {
        Self {
            schedules,
            runner,
            tick_cap,
        }
    }

    pub fn schedules(&self) -> &ScheduleRepo {
        &self.schedules
    }

    /// Process schedules due at or before now. A failing project does
    /// not stop the tick; its schedule still rolls forward so one broken
    /// project cannot starve the rest.
    pub async fn tick(&self) -> Result<TickResult, FactoryError> {
        let now = Utc::now();
        let due = self.schedules.due(now, self.tick_cap).await?;
        let mut result = TickResult::default();

        for mut schedule in due {
            result.processed += 1;
            match self
                .runner
                .write_batch(schedule.project_id, schedule.chapters_per_run, false)
                .await
            {
                Ok(batch) => {
                    result.chapters_created += batch.chapters_written;
                    if let Some(reason) = batch.stopped_reason {
                        tracing::warn!(
                            project = %schedule.project_id,
                            reason,
                            "Scheduled batch stopped early"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        project = %schedule.project_id,
                        error = %e,
                        "Scheduled run failed"
                    );
                }
            }

            if let Err(e) = schedule.mark_ran(now) {
                tracing::warn!(error = %e, "Failed to roll schedule forward");
                continue;
            }
            if let Err(e) = self.schedules.update(&schedule).await {
                tracing::warn!(error = %e, "Failed to persist schedule state");
            }
        }

        tracing::info!(
            processed = result.processed,
            chapters = result.chapters_created,
            "Scheduler tick finished"
        );
        Ok(result)
    }
}
