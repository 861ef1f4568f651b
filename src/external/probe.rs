//! The media metadata oracle: §1 treats the probe tool as "an opaque
//! metadata oracle." `MediaProbe` is that boundary; `FfprobeMediaProbe`
//! shells out to `ffprobe` the way the ai-scribe transcription service
//! shells out to `ffmpeg`, translated to `tokio::process::Command` so the
//! subprocess I/O runs off the cooperative scheduler's blocking path.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Total duration of the media's audio track, in seconds.
    async fn duration_sec(&self, path: &Path) -> Result<f64>;

    /// Whether the file carries at least one decodable audio stream.
    async fn has_audio_stream(&self, path: &Path) -> Result<bool>;
}

pub struct FfprobeMediaProbe;

#[async_trait]
impl MediaProbe for FfprobeMediaProbe {
    async fn duration_sec(&self, path: &Path) -> Result<f64> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| AppError::preparation(format!("ffprobe not available: {e}")))?;

        if !output.status.success() {
            return Err(AppError::preparation(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse::<f64>()
            .map_err(|_| AppError::preparation("ffprobe returned an unparseable duration"))
    }

    async fn has_audio_stream(&self, path: &Path) -> Result<bool> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "a",
                "-show_entries",
                "stream=index",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| AppError::preparation(format!("ffprobe not available: {e}")))?;

        if !output.status.success() {
            return Err(AppError::preparation(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }
}
