//! C3 Parallel Transcription Service (§4.3): chunk a long recording,
//! farm chunks out to the persistent worker pool (C2), and stitch the
//! results back into one ordered Transcript. Falls back to the
//! single-pass service (C4) for short input, a saturated pool, or a
//! pool already marked degraded (Open Question decision, DESIGN.md: no
//! per-chunk retry — a chunk-level ASR error fails the whole call
//! rather than silently dropping a chunk).
//!
//! Grounded on the original `parallel_transcription_service.py`'s
//! submit-then-collect-then-merge algorithm and the teacher's
//! `pipeline.rs` session/sequence bookkeeping.

use crate::error::{AppError, Result};
use crate::external::{AudioNormalizer, MediaProbe};
use crate::transcription::chunk_prep::ChunkPreparer;
use crate::transcription::session::Session;
use crate::transcription::single_pass::SinglePassTranscriptionService;
use crate::transcription::types::{ChunkOutcome, ChunkResult, ChunkTask, Segment, Transcript};
use crate::transcription::worker_pool::PersistentWorkerPool;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct ParallelTranscriptionService {
    pool: Arc<PersistentWorkerPool>,
    chunk_preparer: ChunkPreparer,
    normalizer: Arc<dyn AudioNormalizer>,
    single_pass: Arc<SinglePassTranscriptionService>,
    probe: Arc<dyn MediaProbe>,
    session_base_dir: std::path::PathBuf,
    chunk_duration_sec: f64,
    audio_limit_single_core_sec: f64,
    submit_timeout: Duration,
    recv_timeout: Duration,
}

impl ParallelTranscriptionService {
    pub fn new(
        pool: Arc<PersistentWorkerPool>,
        probe: Arc<dyn MediaProbe>,
        normalizer: Arc<dyn AudioNormalizer>,
        single_pass: Arc<SinglePassTranscriptionService>,
        session_base_dir: std::path::PathBuf,
        chunk_duration_sec: f64,
        audio_limit_single_core_sec: f64,
    ) -> Self {
        Self {
            chunk_preparer: ChunkPreparer::new(probe.clone(), normalizer.clone()),
            pool,
            normalizer,
            single_pass,
            probe,
            session_base_dir,
            chunk_duration_sec,
            audio_limit_single_core_sec,
            submit_timeout: Duration::from_secs(30),
            recv_timeout: Duration::from_secs(120),
        }
    }

    /// `transcribe(audio_path, language) -> Transcript` per §4.3.
    pub async fn transcribe(&self, audio_path: &Path, language: Option<&str>) -> Result<Transcript> {
        let start = Instant::now();
        let total_duration = self.probe.duration_sec(audio_path).await?;

        if total_duration < self.audio_limit_single_core_sec {
            info!(total_duration, "audio under single-core limit, bypassing pool");
            return self.single_pass_bypass(audio_path, language, start).await;
        }

        if self.pool.stats().is_degraded() {
            warn!("worker pool degraded, falling back to single-pass for this call");
            return self.single_pass_bypass(audio_path, language, start).await;
        }

        let session = Session::create(&self.session_base_dir).await?;
        let chunk_paths = match self.chunk_preparer.prepare(audio_path, &session, self.chunk_duration_sec).await {
            Ok(paths) => paths,
            Err(e) => {
                let _ = session.teardown().await;
                return Err(e);
            }
        };
        let chunk_count = chunk_paths.len();

        // Each call gets its own routed result channel, so two concurrent
        // transcribe calls sharing this pool (both starting chunk_index
        // at 0) never consume one another's `ChunkResult`s (spec.md §5:
        // "one consumer per transcription call").
        let mut result_rx = self.pool.register_session(session.id().to_string()).await;

        let mut submitted = 0usize;
        let mut submit_err = None;
        for (index, chunk_path) in chunk_paths.iter().enumerate() {
            let task = ChunkTask {
                session_id: session.id().to_string(),
                chunk_index: index,
                chunk_path: chunk_path.clone(),
                language_hint: language.map(str::to_string),
                start_offset_sec: index as f64 * self.chunk_duration_sec,
            };
            if let Err(e) = self.pool.submit(task, self.submit_timeout).await {
                submit_err = Some(e);
                break;
            }
            submitted += 1;
        }

        if let Some(e) = submit_err {
            warn!(error = %e, submitted, "pool saturated mid-submit, falling back to single-pass");
            let _ = self.drain_unused_results(&mut result_rx, submitted).await;
            self.pool.unregister_session(session.id()).await;
            let _ = session.teardown().await;
            return self.single_pass_bypass(audio_path, language, start).await;
        }

        let mut results_by_index: HashMap<usize, Result<Vec<Segment>>> = HashMap::new();
        let mut languages: Vec<String> = Vec::with_capacity(chunk_count);

        for _ in 0..chunk_count {
            let result = match PersistentWorkerPool::recv_from(&mut result_rx, self.recv_timeout).await {
                Ok(r) => r,
                Err(e) => {
                    self.pool.unregister_session(session.id()).await;
                    let _ = session.teardown().await;
                    return Err(AppError::transcription(format!(
                        "timed out waiting for chunk result: {e}"
                    )));
                }
            };

            match result.outcome {
                ChunkOutcome::Success { segments, detected_language } => {
                    if detected_language != "unknown" {
                        languages.push(detected_language);
                    }
                    results_by_index.insert(result.chunk_index, Ok(segments));
                }
                ChunkOutcome::Error { message } => {
                    results_by_index.insert(
                        result.chunk_index,
                        Err(AppError::transcription(format!(
                            "chunk {} failed: {message}",
                            result.chunk_index
                        ))),
                    );
                }
            }
        }

        self.pool.unregister_session(session.id()).await;
        let _ = session.teardown().await;

        let mut all_segments = Vec::new();
        for index in 0..chunk_count {
            match results_by_index.remove(&index) {
                Some(Ok(segments)) => all_segments.extend(segments),
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(AppError::internal(format!(
                        "missing result for chunk {index}"
                    )))
                }
            }
        }

        Ok(Transcript {
            segments: all_segments,
            detected_language: plurality_language(&languages),
            duration_sec: total_duration,
            processing_time_sec: start.elapsed().as_secs_f64(),
        })
    }

    /// Drain results for tasks already accepted onto the channel before a
    /// submit failure, so a later chunk's result doesn't leak into the
    /// next call's result stream.
    async fn drain_unused_results(&self, rx: &mut mpsc::UnboundedReceiver<ChunkResult>, submitted: usize) -> usize {
        let mut drained = 0;
        for _ in 0..submitted {
            if PersistentWorkerPool::recv_from(rx, self.recv_timeout).await.is_err() {
                break;
            }
            drained += 1;
        }
        drained
    }

    async fn single_pass_bypass(
        &self,
        audio_path: &Path,
        language: Option<&str>,
        start: Instant,
    ) -> Result<Transcript> {
        let session = Session::create(&self.session_base_dir).await?;
        let normalized_path = session.root().join("full.wav");
        if let Err(e) = self.normalizer.normalize_whole(audio_path, &normalized_path).await {
            let _ = session.teardown().await;
            return Err(AppError::preparation(format!("normalization failed: {e}")));
        }

        let result = self.single_pass.transcribe(&normalized_path, language).await;
        let _ = session.teardown().await;
        let mut transcript = result?;
        transcript.processing_time_sec = start.elapsed().as_secs_f64();
        Ok(transcript)
    }
}

/// Majority vote over per-chunk detected languages, ignoring "unknown"
/// (Open Question decision, DESIGN.md). Ties resolve to the first
/// language encountered; an all-"unknown" vote resolves to "unknown".
fn plurality_language(languages: &[String]) -> String {
    if languages.is_empty() {
        return "unknown".to_string();
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for lang in languages {
        *counts.entry(lang.as_str()).or_insert(0) += 1;
    }
    let mut best = (languages[0].as_str(), 0usize);
    for lang in languages {
        let count = counts[lang.as_str()];
        if count > best.1 {
            best = (lang.as_str(), count);
        }
    }
    best.0.to_string()
}
