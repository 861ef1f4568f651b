//! C8 Job Store: Redis-backed durable job records, namespaced
//! `pipeline_job:{id}` (§6). Grounded on the original `redis_store.py`'s
//! `RedisJobStore` (setex-with-TTL persistence, `KEYS`-based listing and
//! sweep, last-writer-wins `put`).

use crate::error::{AppError, Result};
use crate::orchestrator::job::Job;
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{info, warn};

const KEY_PREFIX: &str = "pipeline_job:";

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct JobStoreStats {
    pub total_jobs: usize,
    pub by_status: HashMap<String, usize>,
}

/// The durable-storage seam C7 depends on, so the orchestrator's stage
/// sequencing can be exercised against an in-memory fake instead of a
/// live Redis instance.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn put(&self, job: &Job) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Job>>;
    async fn list(&self, limit: usize) -> Result<Vec<Job>>;
    async fn sweep(&self, max_age_hours: i64) -> Result<usize>;
    async fn stats(&self) -> Result<JobStoreStats>;
    async fn ping(&self) -> bool;
}

pub struct RedisJobStore {
    conn: ConnectionManager,
    ttl: ChronoDuration,
}

impl RedisJobStore {
    pub async fn connect(redis_url: &str, ttl: ChronoDuration) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::config(format!("invalid REDIS_URL: {e}")))?;
        let conn = ConnectionManager::new(client).await?;
        info!(redis_url, "connected to job store");
        Ok(Self { conn, ttl })
    }

    fn key(id: &str) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    /// Last-writer-wins persistence with a TTL matching the configured
    /// cache window (§4.8 invariant: no CAS).
    pub async fn put(&self, job: &Job) -> Result<()> {
        let payload = serde_json::to_string(job)
            .map_err(|e| AppError::internal(format!("failed to serialize job: {e}")))?;
        let ttl_seconds = self.ttl.num_seconds().max(1) as u64;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::key(&job.id), payload, ttl_seconds)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Job>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(id)).await?;
        match raw {
            None => Ok(None),
            Some(data) => serde_json::from_str(&data)
                .map(Some)
                .map_err(|e| AppError::storage(format!("corrupt job record for {id}: {e}"))),
        }
    }

    /// Reverse-chronological job summaries, bounded by `limit` (§4.8).
    pub async fn list(&self, limit: usize) -> Result<Vec<Job>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(format!("{KEY_PREFIX}*")).await?;
        let mut jobs = Vec::with_capacity(keys.len());
        for key in keys {
            let raw: Option<String> = conn.get(&key).await?;
            if let Some(data) = raw {
                match serde_json::from_str::<Job>(&data) {
                    Ok(job) => jobs.push(job),
                    Err(e) => warn!(key, error = %e, "failed to deserialize job, skipping"),
                }
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    /// Remove every job older than `max_age_hours` (0 removes everything,
    /// used by the factory-reset admin endpoint). Returns the count removed.
    pub async fn sweep(&self, max_age_hours: i64) -> Result<usize> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(format!("{KEY_PREFIX}*")).await?;
        let cutoff = chrono::Utc::now() - ChronoDuration::hours(max_age_hours);
        let mut removed = 0;
        for key in keys {
            let raw: Option<String> = conn.get(&key).await?;
            let Some(data) = raw else { continue };
            let Ok(job) = serde_json::from_str::<Job>(&data) else {
                continue;
            };
            if job.created_at < cutoff {
                conn.del::<_, ()>(&key).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "swept expired jobs");
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<JobStoreStats> {
        let jobs = self.list(usize::MAX).await?;
        let mut by_status: HashMap<String, usize> = HashMap::new();
        for job in &jobs {
            let key = format!("{:?}", job.status).to_uppercase();
            *by_status.entry(key).or_insert(0) += 1;
        }
        Ok(JobStoreStats {
            total_jobs: jobs.len(),
            by_status,
        })
    }

    pub async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await.is_ok()
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn put(&self, job: &Job) -> Result<()> {
        RedisJobStore::put(self, job).await
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        RedisJobStore::get(self, id).await
    }

    async fn list(&self, limit: usize) -> Result<Vec<Job>> {
        RedisJobStore::list(self, limit).await
    }

    async fn sweep(&self, max_age_hours: i64) -> Result<usize> {
        RedisJobStore::sweep(self, max_age_hours).await
    }

    async fn stats(&self) -> Result<JobStoreStats> {
        RedisJobStore::stats(self).await
    }

    async fn ping(&self) -> bool {
        RedisJobStore::ping(self).await
    }
}
