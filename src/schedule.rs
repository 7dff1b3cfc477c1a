//! Daily pipeline trigger.
//!
//! A single cron job fires at the configured hour and minute in the
//! configured time zone and queues a new pipeline run. The job never runs
//! pipeline work itself, so a slow scrape cannot delay the scheduler.

use crate::config::ScheduleConfig;
use crate::pipeline::TaskQueue;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info, instrument};

/// Build and start the scheduler. Keep the returned handle alive.
#[instrument(level = "info", skip(queue), fields(cron = %schedule.cron_expression(), tz = %schedule.time_zone))]
pub async fn start_daily<T: Send + 'static>(
    schedule: &ScheduleConfig,
    queue: TaskQueue<T>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    let job = Job::new_async_tz(
        schedule.cron_expression().as_str(),
        schedule.time_zone,
        move |_uuid, _lock| {
            let queue = queue.clone();
            Box::pin(async move {
                match queue.trigger() {
                    Ok(run_id) => info!(run_id, "Scheduled pipeline run queued"),
                    Err(e) => error!(error = %e, "Could not queue scheduled pipeline run"),
                }
            })
        },
    )?;
    scheduler.add(job).await?;
    scheduler.start().await?;
    info!("Daily scheduler started");
    Ok(scheduler)
}
