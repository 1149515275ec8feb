//! Scheduled jobs using tokio-cron-scheduler.
//!
//! ```text
//! every refresh_rate minutes ──► ChannelUpdater::update_channel()
//! daily at fetch_at (local)  ──► FetchCycle::run()
//!                                   └─► LinkExtractor per site ─► DownloadRequester
//! ```
//!
//! Every run is its own task. Failures are logged and the schedule goes on.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::channel::ChannelUpdater;
use crate::fetch::FetchCycle;

/// Six-field cron expression firing once a day at `hour:minute`.
pub fn daily_cron(hour: u32, minute: u32) -> String {
    format!("0 {minute} {hour} * * *")
}

/// Register and start the refresh and fetch jobs.
pub async fn start_scheduler(
    refresh_every: Duration,
    fetch_at: (u32, u32),
    updater: Arc<ChannelUpdater>,
    fetch: Arc<FetchCycle>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let refresh_job = Job::new_repeated_async(refresh_every, move |_uuid, _lock| {
        let updater = updater.clone();
        Box::pin(async move {
            if let Err(e) = updater.update_channel().await {
                tracing::error!("scheduled channel update failed: {e:#}");
            }
        })
    })?;
    scheduler.add(refresh_job).await?;

    let (hour, minute) = fetch_at;
    let fetch_job = Job::new_async_tz(
        daily_cron(hour, minute).as_str(),
        chrono::Local,
        move |_uuid, _lock| {
            let fetch = fetch.clone();
            Box::pin(async move {
                if let Err(e) = fetch.run().await {
                    tracing::error!("scheduled fetch failed: {e:#}");
                }
            })
        },
    )?;
    scheduler.add(fetch_job).await?;

    scheduler.start().await?;

    tracing::info!(
        "scheduled tasks started (update every {} minute(s), fetch daily at {hour:02}:{minute:02})",
        refresh_every.as_secs() / 60
    );
    Ok(scheduler)
}
