//! C7/C8: the stage-pipeline orchestrator and its durable job store.
//! Together these compose the three remote stage services behind the
//! `/process` HTTP surface described in spec §4.7/§4.8.

pub mod job;
pub mod pipeline;
pub mod store;

pub use job::{AudioOptions, Job, JobStages, JobStatus, PipelineRequest, StageName, StageState, StageStatus};
pub use pipeline::{PipelineOrchestrator, SseEvent};
pub use store::{JobStore, JobStoreStats, RedisJobStore};

use crate::config::AppConfig;
use crate::error::Result;
use crate::external::stage_client::{HttpStageClient, StageClient};
use std::sync::Arc;

/// Assembles C7/C8 from configuration: connects the job store and wires
/// up HTTP clients for the three independently-deployed stage services.
pub struct Orchestrator {
    pub store: Arc<RedisJobStore>,
    pub pipeline: Arc<PipelineOrchestrator>,
}

impl Orchestrator {
    pub async fn start(config: &AppConfig) -> Result<Self> {
        let store = Arc::new(
            RedisJobStore::connect(
                &config.storage.redis_url,
                chrono::Duration::hours(config.jobs.ttl_hours as i64),
            )
            .await?,
        );

        let download_client: Arc<dyn StageClient> = Arc::new(HttpStageClient::new(
            config.stages.download_base_url.clone(),
            "/api/v1/download",
            "/api/v1/jobs/{id}",
        ));
        let normalize_client: Arc<dyn StageClient> = Arc::new(HttpStageClient::new(
            config.stages.normalize_base_url.clone(),
            "/api/v1/normalize",
            "/api/v1/jobs/{id}",
        ));
        let transcribe_client: Arc<dyn StageClient> = Arc::new(HttpStageClient::new(
            config.stages.transcribe_base_url.clone(),
            "/api/v1/transcribe",
            "/api/v1/jobs/{id}",
        ));

        let store_dyn: Arc<dyn crate::orchestrator::store::JobStore> = store.clone();
        let pipeline = PipelineOrchestrator::new(
            store_dyn,
            download_client,
            normalize_client,
            transcribe_client,
            config.stages.max_poll_attempts,
            chrono::Duration::hours(config.jobs.ttl_hours as i64),
        );

        Ok(Self { store, pipeline })
    }
}
