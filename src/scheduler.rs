//! Periodic housekeeping: expires stale cache entries (C5) and sweeps
//! expired Job Store records (C8) on a timer, the same way the teacher's
//! `CalendarSyncService` wraps `tokio_cron_scheduler::JobScheduler` to
//! run its own periodic sync and cleanup jobs. `POST /admin/cleanup`
//! (§6) still triggers the Job Store sweep synchronously; this runs the
//! equivalent sweep (plus the cache's own TTL expiry) unattended.

use crate::orchestrator::store::JobStore;
use crate::transcription::cache::TranscriptionCache;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

pub struct CleanupScheduler {
    scheduler: JobScheduler,
}

impl CleanupScheduler {
    pub async fn new(
        cache: Arc<TranscriptionCache>,
        store: Arc<dyn JobStore>,
        job_ttl_hours: i64,
    ) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;

        let cache_job_target = cache.clone();
        let cache_job = Job::new_async("0 0 * * * *", move |_uuid, _locked| {
            let cache = cache_job_target.clone();
            Box::pin(async move {
                let expired = cache.cleanup_expired();
                if expired > 0 {
                    info!(expired, "cache sweep removed expired entries");
                }
            })
        })?;
        scheduler.add(cache_job).await?;

        let store_job_target = store.clone();
        let sweep_job = Job::new_async("0 30 * * * *", move |_uuid, _locked| {
            let store = store_job_target.clone();
            Box::pin(async move {
                match store.sweep(job_ttl_hours).await {
                    Ok(removed) if removed > 0 => info!(removed, "job store sweep removed expired jobs"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "job store sweep failed"),
                }
            })
        })?;
        scheduler.add(sweep_job).await?;

        Ok(Self { scheduler })
    }

    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.scheduler.start().await?;
        info!("cleanup scheduler started");
        Ok(())
    }

    pub async fn stop(&mut self) -> anyhow::Result<()> {
        self.scheduler.shutdown().await?;
        info!("cleanup scheduler stopped");
        Ok(())
    }
}
