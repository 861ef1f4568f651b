//! C7 Stage-Pipeline Orchestrator (§4.7): drives a Job through the three
//! remote stage services in sequence, persisting progress into the Job
//! Store after every transition and exposing `submit`/`get`/`wait`/
//! `stream`. Grounded on `orchestrator/main.py`'s
//! `execute_pipeline_background`/`/wait`/`/stream` handlers.

use crate::error::{AppError, Result};
use crate::external::fetcher::SourceRef;
use crate::external::resilience::{CircuitBreaker, CircuitBreakerConfig, RateLimiter};
use crate::external::stage_client::{PollBackoff, RemoteState, StageClient};
use crate::orchestrator::job::{AudioOptions, Job, PipelineRequest, StageName};
use crate::orchestrator::store::JobStore;
use crate::transcription::types::Segment;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct SseEvent {
    pub event: &'static str,
    pub data: serde_json::Value,
}

pub struct PipelineOrchestrator {
    store: Arc<dyn JobStore>,
    download_client: Arc<dyn StageClient>,
    normalize_client: Arc<dyn StageClient>,
    transcribe_client: Arc<dyn StageClient>,
    breaker: CircuitBreaker,
    rate_limiter: Arc<RateLimiter>,
    max_poll_attempts: u32,
    job_ttl: chrono::Duration,
    wait_poll_interval: Duration,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        download_client: Arc<dyn StageClient>,
        normalize_client: Arc<dyn StageClient>,
        transcribe_client: Arc<dyn StageClient>,
        max_poll_attempts: u32,
        job_ttl: chrono::Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            download_client,
            normalize_client,
            transcribe_client,
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            rate_limiter: Arc::new(RateLimiter::default()),
            max_poll_attempts,
            job_ttl,
            wait_poll_interval: Duration::from_secs(5),
        })
    }

    fn client_for(&self, stage: StageName) -> &Arc<dyn StageClient> {
        match stage {
            StageName::Download => &self.download_client,
            StageName::Normalize => &self.normalize_client,
            StageName::Transcribe => &self.transcribe_client,
        }
    }

    /// `submit(PipelineRequest) -> job_id` (non-blocking): persists a
    /// fresh Job and hands the stage sequence to a background task.
    pub async fn submit(self: &Arc<Self>, request: PipelineRequest) -> Result<String> {
        let audio_options = AudioOptions {
            remove_noise: request.remove_noise.unwrap_or(false),
            convert_to_mono: request.convert_to_mono.unwrap_or(false),
            apply_highpass_filter: request.apply_highpass_filter.unwrap_or(false),
            set_sample_rate_16k: request.set_sample_rate_16k.unwrap_or(true),
            isolate_vocals: request.isolate_vocals.unwrap_or(false),
        };
        let job = Job::create_new(
            SourceRef::Url(request.youtube_url.clone()),
            request.language.clone(),
            request.language_out.clone(),
            audio_options,
            self.job_ttl,
        );
        let job_id = job.id.clone();
        self.store.put(&job).await?;

        let this = self.clone();
        let req_snapshot = request;
        tokio::spawn(async move {
            this.execute_pipeline_background(job_id, req_snapshot).await;
        });

        Ok(job.id)
    }

    pub async fn get(&self, job_id: &str) -> Result<Job> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| AppError::validation("JOB_NOT_FOUND", format!("job {job_id} not found")))
    }

    /// `wait(job_id, timeout) -> Job`: poll the store every `w_poll`
    /// seconds; return immediately on a terminal state (§4.7).
    pub async fn wait(&self, job_id: &str, timeout: Duration) -> Result<Job> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.get(job_id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::timeout(format!(
                    "job {job_id} did not reach a terminal state within {timeout:?}"
                )));
            }
            let sleep_for = self.wait_poll_interval.min(deadline.saturating_duration_since(tokio::time::Instant::now()));
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// `stream(job_id, timeout) -> event-sequence`: emits `connected`,
    /// debounced `progress` events, then a terminal `completed`/`error`/
    /// `timeout` event and closes (§4.7).
    pub fn stream(self: &Arc<Self>, job_id: String, timeout: Duration) -> mpsc::Receiver<SseEvent> {
        let (tx, rx) = mpsc::channel(32);
        let this = self.clone();
        tokio::spawn(async move {
            this.stream_loop(job_id, timeout, tx).await;
        });
        rx
    }

    async fn stream_loop(&self, job_id: String, timeout: Duration, tx: mpsc::Sender<SseEvent>) {
        let _ = tx
            .send(SseEvent {
                event: "connected",
                data: serde_json::json!({ "message": "connected to stream", "job_id": job_id }),
            })
            .await;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut last_progress: Option<f64> = None;

        loop {
            let job = match self.store.get(&job_id).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    let _ = tx
                        .send(SseEvent {
                            event: "error",
                            data: serde_json::json!({ "error": "job not found", "job_id": job_id }),
                        })
                        .await;
                    return;
                }
                Err(e) => {
                    let _ = tx
                        .send(SseEvent {
                            event: "error",
                            data: serde_json::json!({ "error": e.to_string(), "job_id": job_id }),
                        })
                        .await;
                    return;
                }
            };

            if last_progress != Some(job.overall_progress) {
                let stage = job.current_stage_name().map(|s| s.as_str()).unwrap_or("waiting");
                let _ = tx
                    .send(SseEvent {
                        event: "progress",
                        data: serde_json::json!({
                            "job_id": job.id,
                            "status": job.status,
                            "progress": job.overall_progress,
                            "stage": stage,
                        }),
                    })
                    .await;
                last_progress = Some(job.overall_progress);
            }

            if job.status == crate::orchestrator::job::JobStatus::Completed {
                let _ = tx
                    .send(SseEvent {
                        event: "completed",
                        data: serde_json::json!({
                            "job_id": job.id,
                            "status": "completed",
                            "progress": 100.0,
                            "transcript_text": job.transcript_text,
                        }),
                    })
                    .await;
                return;
            }

            if matches!(
                job.status,
                crate::orchestrator::job::JobStatus::Failed | crate::orchestrator::job::JobStatus::Cancelled
            ) {
                let _ = tx
                    .send(SseEvent {
                        event: "error",
                        data: serde_json::json!({
                            "job_id": job.id,
                            "status": job.status,
                            "error": job.error_message,
                        }),
                    })
                    .await;
                return;
            }

            if tokio::time::Instant::now() >= deadline {
                let _ = tx
                    .send(SseEvent {
                        event: "timeout",
                        data: serde_json::json!({ "job_id": job_id, "error": format!("timeout after {timeout:?}") }),
                    })
                    .await;
                return;
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn execute_pipeline_background(self: Arc<Self>, job_id: String, request: PipelineRequest) {
        let mut job = match self.store.get(&job_id).await {
            Ok(Some(job)) => job,
            _ => {
                warn!(job_id, "job vanished before background execution started");
                return;
            }
        };

        let stages = [StageName::Download, StageName::Normalize, StageName::Transcribe];
        let mut last_artifact: Option<serde_json::Value> = None;

        for stage in stages {
            job.start_stage(stage);
            if let Err(e) = self.store.put(&job).await {
                warn!(job_id, error = %e, "failed to persist job before stage start");
                return;
            }

            let stage_request = self.build_stage_request(stage, &request, &last_artifact);

            if let Err(e) = self.rate_limiter.check(stage.as_str()).await {
                job.fail_stage(stage, e.to_string());
                let _ = self.store.put(&job).await;
                return;
            }

            let client = self.client_for(stage).clone();
            let remote_job_id = match self
                .breaker
                .execute(|| async move { client.submit(stage_request).await })
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    job.fail_stage(stage, e.to_string());
                    let _ = self.store.put(&job).await;
                    return;
                }
            };

            let poll_result = self.poll_stage(&job_id, stage, &remote_job_id).await;

            // `poll_stage` persists its own intra-stage progress updates
            // under `job_id` on every tick; re-fetch before mutating so
            // those updates survive the transition write below instead
            // of being clobbered by this function's now-stale copy.
            if let Ok(Some(latest)) = self.store.get(&job_id).await {
                job = latest;
            }

            match poll_result {
                Ok(artifact) => {
                    last_artifact = Some(artifact);
                    job.complete_stage(stage);
                    if let Err(e) = self.store.put(&job).await {
                        warn!(job_id, error = %e, "failed to persist job after stage completion");
                        return;
                    }
                }
                Err(e) => {
                    job.fail_stage(stage, e.to_string());
                    let _ = self.store.put(&job).await;
                    return;
                }
            }
        }

        let (text, segments) = extract_transcript(last_artifact);
        match job.mark_completed(text, segments) {
            Ok(()) => {
                if let Err(e) = self.store.put(&job).await {
                    warn!(job_id, error = %e, "failed to persist completed job");
                } else {
                    info!(job_id, "pipeline completed");
                }
            }
            Err(e) => {
                warn!(job_id, error = %e, "transcribe stage artifact had no segments, failing job");
                job.fail_stage(StageName::Transcribe, e.to_string());
                let _ = self.store.put(&job).await;
            }
        }
    }

    fn build_stage_request(
        &self,
        stage: StageName,
        request: &PipelineRequest,
        last_artifact: &Option<serde_json::Value>,
    ) -> serde_json::Value {
        match stage {
            StageName::Download => serde_json::json!({
                "youtube_url": request.youtube_url,
            }),
            StageName::Normalize => serde_json::json!({
                "input_ref": last_artifact,
                "remove_noise": request.remove_noise.unwrap_or(false),
                "convert_to_mono": request.convert_to_mono.unwrap_or(false),
                "apply_highpass_filter": request.apply_highpass_filter.unwrap_or(false),
                "set_sample_rate_16k": request.set_sample_rate_16k.unwrap_or(true),
                "isolate_vocals": request.isolate_vocals.unwrap_or(false),
            }),
            StageName::Transcribe => serde_json::json!({
                "source": last_artifact,
                "language": request.language,
            }),
        }
    }

    /// Poll-until-terminal for one stage, applying the exponential
    /// backoff and attempt budget from §4.7. Every poll updates and
    /// persists the stage's `progress` so `get`/`wait`/`stream` observe
    /// live progress between start and completion of the stage.
    async fn poll_stage(&self, job_id: &str, stage: StageName, remote_job_id: &str) -> Result<serde_json::Value> {
        let client = self.client_for(stage).clone();
        let mut backoff = PollBackoff::new();

        for _attempt in 0..self.max_poll_attempts {
            tokio::time::sleep(backoff.current()).await;
            let poll = client.poll(remote_job_id).await?;

            if let Ok(Some(mut job)) = self.store.get(job_id).await {
                job.update_stage_progress(stage, poll.progress as f64);
                let _ = self.store.put(&job).await;
            }

            match poll.state {
                RemoteState::Succeeded => {
                    return Ok(poll.artifact.unwrap_or(serde_json::Value::Null));
                }
                RemoteState::Failed => {
                    return Err(AppError::fetch(
                        poll.error_message.unwrap_or_else(|| format!("{} stage failed", stage.as_str())),
                    ));
                }
                RemoteState::Running => {
                    backoff.advance();
                }
            }
        }

        Err(AppError::timeout(format!(
            "{} stage exceeded its poll-attempt budget",
            stage.as_str()
        )))
    }
}

fn extract_transcript(artifact: Option<serde_json::Value>) -> (String, Vec<Segment>) {
    let Some(value) = artifact else {
        return (String::new(), Vec::new());
    };
    let text = value
        .get("full_text")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let segments = value
        .get("segments")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|s| {
                    Some(Segment {
                        start_sec: s.get("start")?.as_f64()?,
                        end_sec: s.get("end")?.as_f64()?,
                        text: s.get("text")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    (text, segments)
}

#[cfg(test)]
mod tests;
