//! Cron-driven day-boundary signal. Daily risk counters only reset when this
//! fires (or when `SimulationEngine::day_boundary` is called directly).

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::error::SimError;
use crate::services::engine::SimulationEngine;

/// Midnight UTC, with the seconds field first.
pub const MIDNIGHT_UTC: &str = "0 0 0 * * *";

pub struct DayBoundaryScheduler {
    engine: SimulationEngine,
    schedule: String,
}

impl DayBoundaryScheduler {
    pub fn new(engine: SimulationEngine) -> Self {
        Self::with_schedule(engine, MIDNIGHT_UTC)
    }

    /// Custom cron expression (e.g. "*/10 * * * * *" for every 10 seconds)
    pub fn with_schedule(engine: SimulationEngine, cron_expression: &str) -> Self {
        Self {
            engine,
            schedule: cron_expression.to_string(),
        }
    }

    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    /// Start the job. The returned scheduler must be kept alive; call
    /// `shutdown()` on it to stop.
    pub async fn start(&self) -> Result<JobScheduler, SimError> {
        let scheduler = JobScheduler::new().await?;

        let engine = self.engine.clone();
        let job = Job::new_async(self.schedule.as_str(), move |_uuid, _l| {
            let engine = engine.clone();
            Box::pin(async move {
                if !engine.is_stopped() {
                    info!("🌅 [DAY-BOUNDARY] New trading day");
                    engine.day_boundary();
                }
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;

        info!("🌅 [DAY-BOUNDARY] Scheduled with cron '{}'", self.schedule);
        Ok(scheduler)
    }
}
