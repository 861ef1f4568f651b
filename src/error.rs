//! Global error taxonomy and HTTP-facing error schema.
//!
//! The teacher crate carried two parallel error enums — `AppError`
//! (serializable, for Tauri's IPC boundary) and `Error` (carries a
//! `source` for in-process propagation) — because Tauri commands must
//! return a serializable error while internal code wants a real
//! `std::error::Error` chain. This service has no IPC boundary, only
//! an HTTP one, so a single enum serves both purposes: it implements
//! `std::error::Error` via `thiserror` for `?`-propagation and
//! `Serialize` for the error response schema.

use serde::{Deserialize, Serialize};

/// Application-wide error, tagged by the taxonomy in spec §7.
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Bad input: unsupported format, oversized file, no audio stream, bad URL.
    #[error("validation failed [{code}]: {message}")]
    Validation { code: String, message: String },

    /// Could not retrieve the source media.
    #[error("fetch failed: {message}")]
    Fetch { message: String },

    /// Chunking or normalization subprocess failed.
    #[error("preparation failed: {message}")]
    Preparation { message: String },

    /// Chunk-level worker error, pool-submit timeout, or model failure.
    #[error("transcription failed: {message}")]
    Transcription { message: String },

    /// Local disk or job store unreachable.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Long-poll expiry, stage poll-budget exhausted, submit-channel full past deadline.
    #[error("timed out: {message}")]
    Timeout { message: String },

    /// Composed upstream reported repeated errors; breaker is open.
    #[error("circuit open: {message}")]
    CircuitOpen { message: String, retry_after_secs: u64 },

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Anything else.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    pub fn preparation(message: impl Into<String>) -> Self {
        Self::Preparation {
            message: message.into(),
        }
    }

    pub fn transcription(message: impl Into<String>) -> Self {
        Self::Transcription {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn circuit_open(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::CircuitOpen {
            message: message.into(),
            retry_after_secs,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable error kind, used in the HTTP error schema.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION",
            Self::Fetch { .. } => "FETCH",
            Self::Preparation { .. } => "PREPARATION",
            Self::Transcription { .. } => "TRANSCRIPTION",
            Self::Storage { .. } => "STORAGE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Config { .. } => "CONFIG",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    /// HTTP status code per spec §7.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Fetch { .. } => 502,
            Self::Preparation { .. } => 500,
            Self::Transcription { .. } => 500,
            Self::Storage { .. } => 500,
            Self::Timeout { .. } => 408,
            Self::CircuitOpen { .. } => 503,
            Self::Config { .. } => 500,
            Self::Internal { .. } => 500,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        Self::Storage {
            message: format!("redis: {err}"),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                message: err.to_string(),
            }
        } else {
            Self::Fetch {
                message: err.to_string(),
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;
