//! Scheduled dispatch trigger using tokio-cron-scheduler.
//!
//! The dispatch trigger is normally fired from outside (GET /new). When
//! `DISPATCH_SCHEDULE` is set the server also fires it on that cron schedule.
//! A failed run is only logged; the next tick is the retry.
//!
//! ```text
//! Scheduler (cron)
//!     │
//!     └─► dispatch_next()
//!             ├─► NoWork            → debug log
//!             ├─► Dispatched { id } → info log
//!             └─► error             → warn/error log, row untouched
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::submissions::actions::{dispatch_next, DispatchOutcome};
use crate::kernel::ServerDeps;

/// Start the periodic dispatch trigger
pub async fn start_dispatch_scheduler(deps: Arc<ServerDeps>, schedule: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let dispatch_job = Job::new_async(schedule, move |_uuid, _lock| {
        let deps = deps.clone();
        Box::pin(async move {
            run_scheduled_dispatch(&deps).await;
        })
    })
    .with_context(|| format!("invalid DISPATCH_SCHEDULE: {}", schedule))?;

    scheduler.add(dispatch_job).await?;
    scheduler.start().await?;

    tracing::info!(schedule = %schedule, "Scheduled dispatch trigger started");
    Ok(scheduler)
}

/// One scheduled tick
async fn run_scheduled_dispatch(deps: &ServerDeps) {
    match dispatch_next(deps).await {
        Ok(DispatchOutcome::Dispatched { id, .. }) => {
            tracing::info!(submission_id = %id, "Scheduled dispatch delivered submission");
        }
        Ok(DispatchOutcome::NoWork) => {
            tracing::debug!("Scheduled dispatch found no work");
        }
        Err(e) if e.is_retryable() => {
            tracing::warn!(error = %e, "Scheduled dispatch failed, will retry next tick");
        }
        Err(e) => {
            tracing::error!(error = %e, "Scheduled dispatch failed");
        }
    }
}
