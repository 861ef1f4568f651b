//! Job/StageStatus/PipelineRequest types (§3.1, §4.7), grounded on the
//! original `orchestrator/main.py`'s `PipelineJob` and `PipelineStatus`.

use crate::error::{AppError, Result};
use crate::external::fetcher::SourceRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Queued,
    Downloading,
    Normalizing,
    Transcribing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Download,
    Normalize,
    Transcribe,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Normalize => "normalize",
            Self::Transcribe => "transcribe",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Submitting,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    pub state: StageState,
    pub remote_job_id: Option<String>,
    pub progress: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self {
            state: StageState::Pending,
            remote_job_id: None,
            progress: 0.0,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioOptions {
    pub remove_noise: bool,
    pub convert_to_mono: bool,
    pub apply_highpass_filter: bool,
    pub set_sample_rate_16k: bool,
    pub isolate_vocals: bool,
}

/// `POST /process` request body (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineRequest {
    pub youtube_url: String,
    pub language: Option<String>,
    pub language_out: Option<String>,
    pub remove_noise: Option<bool>,
    pub convert_to_mono: Option<bool>,
    pub apply_highpass_filter: Option<bool>,
    pub set_sample_rate_16k: Option<bool>,
    pub isolate_vocals: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStages {
    pub download: StageStatus,
    pub normalize: StageStatus,
    pub transcribe: StageStatus,
}

impl Default for JobStages {
    fn default() -> Self {
        Self {
            download: StageStatus::default(),
            normalize: StageStatus::default(),
            transcribe: StageStatus::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub source_ref: SerializableSourceRef,
    pub language_in: Option<String>,
    pub language_out: Option<String>,
    pub audio_options: AudioOptions,
    pub status: JobStatus,
    pub overall_progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stages: JobStages,
    pub transcript_text: Option<String>,
    pub transcript_segments: Option<Vec<crate::transcription::types::Segment>>,
    pub audio_file_ref: Option<String>,
    pub error_message: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// `SourceRef` doesn't derive `Serialize`/`Deserialize` (it's an
/// in-process trait-boundary type); this mirrors its two variants for
/// the job record's wire/storage format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerializableSourceRef {
    Url(String),
    UploadedFile(String),
}

impl From<&SourceRef> for SerializableSourceRef {
    fn from(value: &SourceRef) -> Self {
        match value {
            SourceRef::Url(url) => Self::Url(url.clone()),
            SourceRef::UploadedFile(path) => Self::UploadedFile(path.to_string_lossy().into_owned()),
        }
    }
}

impl Job {
    pub fn create_new(
        source_ref: SourceRef,
        language_in: Option<String>,
        language_out: Option<String>,
        audio_options: AudioOptions,
        ttl: chrono::Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            source_ref: SerializableSourceRef::from(&source_ref),
            language_in,
            language_out,
            audio_options,
            status: JobStatus::Queued,
            overall_progress: 0.0,
            created_at: now,
            updated_at: now,
            completed_at: None,
            stages: JobStages::default(),
            transcript_text: None,
            transcript_segments: None,
            audio_file_ref: None,
            error_message: None,
            expires_at: now + ttl,
        }
    }

    pub fn current_stage_name(&self) -> Option<StageName> {
        match self.status {
            JobStatus::Downloading => Some(StageName::Download),
            JobStatus::Normalizing => Some(StageName::Normalize),
            JobStatus::Transcribing => Some(StageName::Transcribe),
            _ => None,
        }
    }

    fn stage_mut(&mut self, name: StageName) -> &mut StageStatus {
        match name {
            StageName::Download => &mut self.stages.download,
            StageName::Normalize => &mut self.stages.normalize,
            StageName::Transcribe => &mut self.stages.transcribe,
        }
    }

    /// Transition into a stage: set job status, mark the stage `running`,
    /// stamp `started_at`. Progress aggregation (§9) treats all
    /// already-finished stages as worth 100 and the active stage as its
    /// own `progress`, divided by the stage count.
    pub fn start_stage(&mut self, name: StageName) {
        self.status = match name {
            StageName::Download => JobStatus::Downloading,
            StageName::Normalize => JobStatus::Normalizing,
            StageName::Transcribe => JobStatus::Transcribing,
        };
        let stage = self.stage_mut(name);
        stage.state = StageState::Running;
        stage.started_at = Some(Utc::now());
        self.recompute_overall_progress();
        self.updated_at = Utc::now();
    }

    /// Record a poll update for the currently active stage's progress.
    /// Never decreases `overall_progress` (§8 monotonicity invariant).
    pub fn update_stage_progress(&mut self, name: StageName, progress: f64) {
        let stage = self.stage_mut(name);
        stage.progress = stage.progress.max(progress.clamp(0.0, 100.0));
        self.recompute_overall_progress();
        self.updated_at = Utc::now();
    }

    pub fn complete_stage(&mut self, name: StageName) {
        let stage = self.stage_mut(name);
        stage.state = StageState::Completed;
        stage.progress = 100.0;
        stage.completed_at = Some(Utc::now());
        self.recompute_overall_progress();
        self.updated_at = Utc::now();
    }

    pub fn fail_stage(&mut self, name: StageName, error_message: impl Into<String>) {
        let message = error_message.into();
        let stage = self.stage_mut(name);
        stage.state = StageState::Failed;
        stage.error_message = Some(message.clone());
        stage.completed_at = Some(Utc::now());
        self.status = JobStatus::Failed;
        self.error_message = Some(message);
        self.completed_at = Some(Utc::now());
        self.recompute_overall_progress();
        self.updated_at = Utc::now();
    }

    /// Rejects an empty `segments` list instead of completing (§3.1
    /// invariant: `status == COMPLETED` implies `transcript_segments` is
    /// non-empty) — the caller should fail the job's last stage instead.
    pub fn mark_completed(&mut self, transcript_text: String, segments: Vec<crate::transcription::types::Segment>) -> Result<()> {
        if segments.is_empty() {
            return Err(AppError::transcription(
                "refusing to complete a job with no transcript segments",
            ));
        }
        self.transcript_text = Some(transcript_text);
        self.transcript_segments = Some(segments);
        self.status = JobStatus::Completed;
        self.overall_progress = 100.0;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_cancelled(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// `(finished_stages * 100 + current_stage_progress) / 3` (§9).
    fn recompute_overall_progress(&mut self) {
        const STAGES: [StageName; 3] = [StageName::Download, StageName::Normalize, StageName::Transcribe];
        let mut finished = 0u32;
        let mut current = 0.0;
        for name in STAGES {
            let stage = match name {
                StageName::Download => &self.stages.download,
                StageName::Normalize => &self.stages.normalize,
                StageName::Transcribe => &self.stages.transcribe,
            };
            match stage.state {
                StageState::Completed => finished += 1,
                StageState::Running | StageState::Submitting => current = stage.progress,
                _ => {}
            }
        }
        let computed = (finished as f64 * 100.0 + current) / 3.0;
        self.overall_progress = self.overall_progress.max(computed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_job() -> Job {
        Job::create_new(
            SourceRef::Url("https://example.com/video".to_string()),
            Some("en".to_string()),
            None,
            AudioOptions::default(),
            chrono::Duration::hours(24),
        )
    }

    #[test]
    fn overall_progress_is_monotone_across_stage_transitions() {
        let mut job = fresh_job();
        let mut last = job.overall_progress;

        job.start_stage(StageName::Download);
        assert!(job.overall_progress >= last);
        last = job.overall_progress;

        for p in [10.0, 10.0, 10.0, 25.0, 50.0, 100.0] {
            job.update_stage_progress(StageName::Download, p);
            assert!(job.overall_progress >= last);
            last = job.overall_progress;
        }

        job.complete_stage(StageName::Download);
        assert!(job.overall_progress >= last);
        last = job.overall_progress;

        job.start_stage(StageName::Normalize);
        assert!(job.overall_progress >= last);
        assert!((job.overall_progress - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn failing_a_stage_sets_terminal_fields() {
        let mut job = fresh_job();
        job.start_stage(StageName::Download);
        job.fail_stage(StageName::Download, "boom");

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.completed_at.is_some());
        assert_eq!(job.stages.normalize.state, StageState::Pending);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn completion_requires_explicit_transcript() {
        let mut job = fresh_job();
        job.start_stage(StageName::Download);
        job.complete_stage(StageName::Download);
        job.start_stage(StageName::Normalize);
        job.complete_stage(StageName::Normalize);
        job.start_stage(StageName::Transcribe);
        job.complete_stage(StageName::Transcribe);
        job.mark_completed(
            "hello world".to_string(),
            vec![crate::transcription::types::Segment {
                start_sec: 0.0,
                end_sec: 1.0,
                text: "hello world".to_string(),
            }],
        )
        .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.overall_progress, 100.0);
        assert!(job.completed_at.unwrap() >= job.created_at);
    }

    #[test]
    fn completion_rejects_empty_segments() {
        let mut job = fresh_job();
        job.start_stage(StageName::Download);
        job.complete_stage(StageName::Download);
        job.start_stage(StageName::Normalize);
        job.complete_stage(StageName::Normalize);
        job.start_stage(StageName::Transcribe);
        job.complete_stage(StageName::Transcribe);

        let err = job.mark_completed("hello world".to_string(), vec![]).unwrap_err();
        assert!(matches!(err, AppError::Transcription { .. }));
        assert_eq!(job.status, JobStatus::Transcribing);
        assert!(job.transcript_text.is_none());
    }

    #[test]
    fn cancel_is_a_no_op_once_terminal() {
        let mut job = fresh_job();
        job.start_stage(StageName::Download);
        job.fail_stage(StageName::Download, "boom");
        let completed_at = job.completed_at;

        job.mark_cancelled();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.completed_at, completed_at);
    }
}
