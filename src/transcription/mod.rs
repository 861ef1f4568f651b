//! Core transcription pipeline: chunk preparation (C1), the persistent
//! worker pool (C2), parallel (C3) and single-pass (C4) transcription
//! strategies, the content-addressed cache (C5), and the use-case that
//! ties them together (C6).

pub mod cache;
pub mod chunk_prep;
pub mod parallel;
pub mod session;
pub mod single_pass;
pub mod types;
pub mod use_case;
pub mod worker_pool;

pub use cache::{CacheStats, TranscriptionCache};
pub use chunk_prep::ChunkPreparer;
pub use parallel::ParallelTranscriptionService;
pub use session::{sweep_orphaned_sessions, Session};
pub use single_pass::SinglePassTranscriptionService;
pub use types::*;
pub use use_case::{TranscribeRequest, TranscriptionLimits, TranscriptionUseCase};
pub use worker_pool::{PersistentWorkerPool, PoolStats};

use crate::config::AppConfig;
use crate::error::Result;
use crate::external::asr::MockAsrBackend;
use crate::external::{AudioNormalizer, FfmpegNormalizer, FfprobeMediaProbe, HttpSourceFetcher, MediaProbe};
use std::sync::Arc;

/// Assembles the C1-C6 components from configuration into the one
/// use-case entry point the HTTP layer and the stage orchestrator call.
/// Analogous to the teacher's `TranscriptionService` construction, but
/// composing the spec's components instead of a single Whisper pipeline.
pub struct TranscriptionEngine {
    pub use_case: Arc<TranscriptionUseCase>,
    pub cache: Arc<TranscriptionCache>,
    pub pool: Arc<PersistentWorkerPool>,
}

impl TranscriptionEngine {
    pub async fn start(config: &AppConfig) -> Result<Self> {
        let model = types::WhisperModel::parse(&config.whisper.model)
            .unwrap_or_default();

        let pool = Arc::new(
            PersistentWorkerPool::start(config.parallel.workers, move || {
                Arc::new(MockAsrBackend::new(model)) as Arc<dyn crate::external::asr::AsrBackend>
            })
            .await?,
        );

        let probe: Arc<dyn MediaProbe> = Arc::new(FfprobeMediaProbe);
        let normalizer: Arc<dyn AudioNormalizer> = Arc::new(FfmpegNormalizer::default());
        let single_pass = Arc::new(SinglePassTranscriptionService::new(Arc::new(
            MockAsrBackend::new(model),
        )));

        let parallel = Arc::new(ParallelTranscriptionService::new(
            pool.clone(),
            probe.clone(),
            normalizer,
            single_pass,
            config.storage.temp_dir.clone(),
            config.parallel.chunk_duration_sec as f64,
            config.parallel.audio_limit_single_core_sec as f64,
        ));

        let cache = Arc::new(TranscriptionCache::new(
            config.cache.max_size,
            std::time::Duration::from_secs(config.cache.ttl_hours * 3600),
        ));

        let use_case = Arc::new(TranscriptionUseCase::new(
            Arc::new(HttpSourceFetcher::default()),
            probe,
            cache.clone(),
            parallel,
            TranscriptionLimits {
                max_duration_seconds: config.limits.max_video_duration_seconds,
                max_size_mb: config.limits.max_video_size_mb,
            },
            config.storage.temp_dir.clone(),
        ));

        Ok(Self {
            use_case,
            cache,
            pool,
        })
    }

    /// Drain the worker pool's channels and join its worker threads.
    /// Requires every other `Arc<PersistentWorkerPool>` clone (held by
    /// in-flight `ParallelTranscriptionService` calls) to have already
    /// been dropped, which holds once the HTTP server has stopped
    /// accepting new requests and in-flight ones have drained.
    pub async fn shutdown(self, grace: std::time::Duration) {
        match Arc::try_unwrap(self.pool) {
            Ok(pool) => pool.stop(grace).await,
            Err(pool) => {
                tracing::warn!(
                    refs = Arc::strong_count(&pool),
                    "worker pool still has outstanding references at shutdown; skipping graceful stop"
                );
            }
        }
    }
}
