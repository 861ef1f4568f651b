//! Core transcription data types: §3.1 Segment/Transcript/ChunkTask/ChunkResult.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opaque per-transcription-call scratch-directory identifier.
pub type SessionId = String;

/// ASR model identifier, recognized by `WHISPER_MODEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhisperModel {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
    Turbo,
}

impl Default for WhisperModel {
    fn default() -> Self {
        Self::Base
    }
}

impl WhisperModel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "tiny" => Some(Self::Tiny),
            "base" => Some(Self::Base),
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            "turbo" => Some(Self::Turbo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tiny => "tiny",
            Self::Base => "base",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Turbo => "turbo",
        }
    }
}

impl std::fmt::Display for WhisperModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Device the ASR backend runs on, recognized by `WHISPER_DEVICE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

/// `{start_sec, end_sec, text}` — §3.1 Segment. Merged sequences within a
/// Transcript are ordered strictly by `start_sec` ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_sec: f64,
    pub end_sec: f64,
    pub text: String,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end_sec - self.start_sec
    }

    /// Shift this segment's timestamps so they're absolute with respect to
    /// the original (un-chunked) audio.
    pub fn offset_by(mut self, offset_sec: f64) -> Self {
        self.start_sec += offset_sec;
        self.end_sec += offset_sec;
        self
    }
}

/// `{segments[], detected_language, duration_sec, processing_time_sec}` —
/// §3.1 Transcript. Derived, not persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<Segment>,
    pub detected_language: String,
    pub duration_sec: f64,
    pub processing_time_sec: f64,
}

impl Transcript {
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// §8: segments ordered strictly non-decreasing by `start_sec`, and
    /// each segment's own start ≤ end.
    pub fn is_well_ordered(&self) -> bool {
        self.segments
            .iter()
            .all(|s| s.start_sec <= s.end_sec)
            && self
                .segments
                .windows(2)
                .all(|w| w[0].start_sec <= w[1].start_sec)
    }
}

/// `{session_id, chunk_index, chunk_path, language_hint}` — §3.1 ChunkTask.
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct ChunkTask {
    pub session_id: SessionId,
    pub chunk_index: usize,
    pub chunk_path: std::path::PathBuf,
    pub language_hint: Option<String>,
    /// This chunk's start offset within the original audio, so the
    /// worker can translate its locally-timestamped segments into
    /// absolute coordinates before publishing the ChunkResult (§3.1).
    pub start_offset_sec: f64,
}

/// `{session_id, chunk_index, segments[], detected_language, processing_time, error?}`
/// — §3.1 ChunkResult. Carries at most one of `segments` or `error`.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub session_id: SessionId,
    pub chunk_index: usize,
    pub outcome: ChunkOutcome,
    pub processing_time: Duration,
}

#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    Success {
        segments: Vec<Segment>,
        detected_language: String,
    },
    Error {
        message: String,
    },
}

impl ChunkResult {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ChunkOutcome::Error { .. })
    }
}

/// Errors specific to transcription operations, wrapped into
/// `crate::error::AppError` at the C6/HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("chunk {chunk_index} failed: {message}")]
    ChunkFailed { chunk_index: usize, message: String },

    #[error("worker pool saturated: submit timed out after {0:?}")]
    PoolSaturated(Duration),

    #[error("worker pool degraded: {0}")]
    PoolDegraded(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
}

pub type Result<T> = std::result::Result<T, TranscriptionError>;
