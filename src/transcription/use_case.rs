//! C6 Transcription Use-Case (§4.6): the single entry point the HTTP
//! layer and the stage-pipeline orchestrator both call. Resolves the
//! source, validates it against the configured limits, consults the
//! cache (C5), and on a miss routes to C3 (which itself decides between
//! chunked and single-pass execution). Grounded on the teacher's
//! `transcription/mod.rs` orchestration and the original
//! `transcribe_video.py` use case.

use crate::error::{AppError, Result};
use crate::external::{MediaProbe, SourceFetcher, SourceRef};
use crate::transcription::cache::TranscriptionCache;
use crate::transcription::parallel::ParallelTranscriptionService;
use crate::transcription::session::Session;
use crate::transcription::types::{Transcript, WhisperModel};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub struct TranscribeRequest {
    pub source_ref: SourceRef,
    pub model: WhisperModel,
    pub language: Option<String>,
}

pub struct TranscriptionLimits {
    pub max_duration_seconds: u64,
    pub max_size_mb: u64,
}

pub struct TranscriptionUseCase {
    fetcher: Arc<dyn SourceFetcher>,
    probe: Arc<dyn MediaProbe>,
    cache: Arc<TranscriptionCache>,
    parallel: Arc<ParallelTranscriptionService>,
    limits: TranscriptionLimits,
    session_base_dir: PathBuf,
}

impl TranscriptionUseCase {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        probe: Arc<dyn MediaProbe>,
        cache: Arc<TranscriptionCache>,
        parallel: Arc<ParallelTranscriptionService>,
        limits: TranscriptionLimits,
        session_base_dir: PathBuf,
    ) -> Self {
        Self {
            fetcher,
            probe,
            cache,
            parallel,
            limits,
            session_base_dir,
        }
    }

    /// `execute(request) -> Transcript` per §4.6.
    pub async fn execute(&self, request: TranscribeRequest) -> Result<Transcript> {
        let session = Session::create(&self.session_base_dir).await?;
        let fetched_path = match self.fetcher.fetch(&request.source_ref, session.root()).await {
            Ok(path) => path,
            Err(e) => {
                let _ = session.teardown().await;
                return Err(e);
            }
        };

        if let Err(e) = self.validate(&fetched_path).await {
            let _ = session.teardown().await;
            return Err(e);
        }

        let file_size = tokio::fs::metadata(&fetched_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        let fetched_path_for_hash = fetched_path.clone();
        let file_hash = match tokio::task::spawn_blocking(move || {
            TranscriptionCache::compute_hash(&fetched_path_for_hash)
        })
        .await
        {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => {
                let _ = session.teardown().await;
                return Err(AppError::storage(format!("failed to hash source file: {e}")));
            }
            Err(e) => {
                let _ = session.teardown().await;
                return Err(AppError::internal(format!("hash task panicked: {e}")));
            }
        };

        let language_key = request.language.clone().unwrap_or_else(|| "auto".to_string());

        if let Some(transcript) = self.cache.get(&file_hash, request.model.as_str(), &language_key) {
            info!(hash = %file_hash, "transcription cache hit");
            let _ = session.teardown().await;
            return Ok(transcript);
        }

        let transcript = self
            .parallel
            .transcribe(&fetched_path, request.language.as_deref())
            .await;

        let _ = session.teardown().await;
        let transcript = transcript?;

        self.cache.put(
            &file_hash,
            transcript.clone(),
            request.model.as_str(),
            &language_key,
            file_size,
        );

        Ok(transcript)
    }

    async fn validate(&self, path: &std::path::Path) -> Result<()> {
        let metadata = tokio::fs::metadata(path).await?;
        let size_mb = metadata.len() / (1024 * 1024);
        if size_mb > self.limits.max_size_mb {
            return Err(AppError::validation(
                "FILE_TOO_LARGE",
                format!(
                    "source file is {size_mb}MB, exceeding the {}MB limit",
                    self.limits.max_size_mb
                ),
            ));
        }

        if !self.probe.has_audio_stream(path).await? {
            return Err(AppError::validation(
                "NO_AUDIO_STREAM",
                "source media carries no decodable audio stream",
            ));
        }

        let duration = self.probe.duration_sec(path).await?;
        if duration <= 0.0 {
            return Err(AppError::validation(
                "ZERO_DURATION",
                "source reports a duration of zero seconds",
            ));
        }
        if duration > self.limits.max_duration_seconds as f64 {
            return Err(AppError::validation(
                "DURATION_EXCEEDED",
                format!(
                    "source is {duration:.1}s, exceeding the {}s limit",
                    self.limits.max_duration_seconds
                ),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
