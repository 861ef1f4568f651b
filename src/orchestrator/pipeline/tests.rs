use super::*;
use crate::external::stage_client::RemotePoll;
use crate::orchestrator::job::StageState;
use crate::orchestrator::JobStatus;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex as AsyncMutex;

struct InMemoryJobStore {
    jobs: AsyncMutex<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    fn new() -> Self {
        Self {
            jobs: AsyncMutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn put(&self, job: &Job) -> Result<()> {
        self.jobs.lock().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.jobs.lock().await.get(id).cloned())
    }

    async fn list(&self, limit: usize) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.lock().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn sweep(&self, _max_age_hours: i64) -> Result<usize> {
        Ok(0)
    }

    async fn stats(&self) -> Result<crate::orchestrator::store::JobStoreStats> {
        Ok(crate::orchestrator::store::JobStoreStats::default())
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// A `StageClient` whose `poll` follows a scripted sequence: `Running`
/// with climbing progress for a few ticks, then either `Succeeded` with
/// a fixed artifact or `Failed`.
struct ScriptedStageClient {
    polls_seen: AtomicU32,
    terminal_at: u32,
    outcome: ScriptedOutcome,
}

enum ScriptedOutcome {
    Succeed(serde_json::Value),
    Fail,
}

impl ScriptedStageClient {
    fn succeeding(terminal_at: u32, artifact: serde_json::Value) -> Self {
        Self {
            polls_seen: AtomicU32::new(0),
            terminal_at,
            outcome: ScriptedOutcome::Succeed(artifact),
        }
    }

    fn failing(terminal_at: u32) -> Self {
        Self {
            polls_seen: AtomicU32::new(0),
            terminal_at,
            outcome: ScriptedOutcome::Fail,
        }
    }
}

#[async_trait]
impl StageClient for ScriptedStageClient {
    async fn submit(&self, _request: serde_json::Value) -> Result<String> {
        Ok("remote-job-1".to_string())
    }

    async fn poll(&self, _remote_job_id: &str) -> Result<RemotePoll> {
        let tick = self.polls_seen.fetch_add(1, Ordering::SeqCst) + 1;
        if tick < self.terminal_at {
            return Ok(RemotePoll {
                state: RemoteState::Running,
                progress: ((tick * 100 / self.terminal_at.max(1)) as u8).min(90),
                error_message: None,
                artifact: None,
            });
        }
        match &self.outcome {
            ScriptedOutcome::Succeed(artifact) => Ok(RemotePoll {
                state: RemoteState::Succeeded,
                progress: 100,
                error_message: None,
                artifact: Some(artifact.clone()),
            }),
            ScriptedOutcome::Fail => Ok(RemotePoll {
                state: RemoteState::Failed,
                progress: 50,
                error_message: Some("stage reported a failure".to_string()),
                artifact: None,
            }),
        }
    }
}

fn sample_request() -> PipelineRequest {
    PipelineRequest {
        youtube_url: "https://example.com/video".to_string(),
        language: Some("en".to_string()),
        language_out: None,
        remove_noise: None,
        convert_to_mono: None,
        apply_highpass_filter: None,
        set_sample_rate_16k: None,
        isolate_vocals: None,
    }
}

#[tokio::test(start_paused = true)]
async fn happy_path_completes_through_all_three_stages() {
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let download: Arc<dyn StageClient> = Arc::new(ScriptedStageClient::succeeding(2, serde_json::json!({"file_ref": "dl-1"})));
    let normalize: Arc<dyn StageClient> = Arc::new(ScriptedStageClient::succeeding(2, serde_json::json!({"file_ref": "norm-1"})));
    let transcribe: Arc<dyn StageClient> = Arc::new(ScriptedStageClient::succeeding(
        2,
        serde_json::json!({
            "full_text": "hello world",
            "segments": [
                {"start": 0.0, "end": 1.0, "text": "hello"},
                {"start": 1.0, "end": 2.0, "text": "world"},
            ],
        }),
    ));

    let orchestrator = PipelineOrchestrator::new(store, download, normalize, transcribe, 10, chrono::Duration::hours(1));

    let job_id = orchestrator.submit(sample_request()).await.unwrap();
    let job = orchestrator.wait(&job_id, Duration::from_secs(60)).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.overall_progress, 100.0);
    assert_eq!(job.transcript_text.as_deref(), Some("hello world"));
    assert_eq!(job.transcript_segments.as_ref().map(Vec::len), Some(2));
    assert_eq!(job.stages.download.state, StageState::Completed);
    assert_eq!(job.stages.normalize.state, StageState::Completed);
    assert_eq!(job.stages.transcribe.state, StageState::Completed);
}

#[tokio::test(start_paused = true)]
async fn stage_failure_surfaces_and_leaves_later_stages_pending() {
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let download: Arc<dyn StageClient> = Arc::new(ScriptedStageClient::failing(3));
    let normalize: Arc<dyn StageClient> = Arc::new(ScriptedStageClient::succeeding(1, serde_json::json!({})));
    let transcribe: Arc<dyn StageClient> = Arc::new(ScriptedStageClient::succeeding(1, serde_json::json!({})));

    let orchestrator = PipelineOrchestrator::new(store, download, normalize, transcribe, 10, chrono::Duration::hours(1));

    let job_id = orchestrator.submit(sample_request()).await.unwrap();
    let job = orchestrator.wait(&job_id, Duration::from_secs(60)).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.stages.download.state, StageState::Failed);
    assert_eq!(job.stages.normalize.state, StageState::Pending);
    assert_eq!(job.stages.transcribe.state, StageState::Pending);
    assert!(job.error_message.is_some());
    // Download never reported more than ~66% before failing; the failed
    // stage never contributes more than its own share of the total.
    assert!(job.overall_progress < 100.0 / 3.0);
}

#[tokio::test(start_paused = true)]
async fn stream_emits_connected_then_a_terminal_completed_event() {
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let download: Arc<dyn StageClient> = Arc::new(ScriptedStageClient::succeeding(1, serde_json::json!({})));
    let normalize: Arc<dyn StageClient> = Arc::new(ScriptedStageClient::succeeding(1, serde_json::json!({})));
    let transcribe: Arc<dyn StageClient> = Arc::new(ScriptedStageClient::succeeding(
        1,
        serde_json::json!({"full_text": "done", "segments": []}),
    ));

    let orchestrator = PipelineOrchestrator::new(store, download, normalize, transcribe, 10, chrono::Duration::hours(1));

    let job_id = orchestrator.submit(sample_request()).await.unwrap();
    let mut rx = orchestrator.stream(job_id, Duration::from_secs(60));

    let first = rx.recv().await.expect("stream should open with a connected event");
    assert_eq!(first.event, "connected");

    let mut saw_progress = false;
    let mut terminal_event = None;
    while let Some(event) = rx.recv().await {
        match event.event {
            "progress" => saw_progress = true,
            "completed" | "error" | "timeout" => {
                terminal_event = Some(event.event);
                break;
            }
            other => panic!("unexpected SSE event name: {other}"),
        }
    }

    assert!(saw_progress, "expected at least one progress event before completion");
    assert_eq!(terminal_event, Some("completed"));
}
