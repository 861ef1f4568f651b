//! The audio-normalize subprocess boundary used by C1 (§4.1). Extracts an
//! exact `[start, end)` slice of the source media as 16 kHz mono
//! signed-16-bit PCM in a WAVE container, shelling out to `ffmpeg` the way
//! the ai-scribe transcription service does.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const TARGET_CHANNELS: u16 = 1;

#[async_trait]
pub trait AudioNormalizer: Send + Sync {
    /// Extract `[start_sec, end_sec)` of `input` into `out_path` as
    /// 16 kHz/mono/PCM-S16LE WAVE. `end_sec` may exceed the true duration;
    /// ffmpeg clamps to EOF, which is how the final short chunk is produced.
    async fn extract_slice(
        &self,
        input: &Path,
        start_sec: f64,
        end_sec: f64,
        out_path: &Path,
    ) -> Result<()>;

    /// Normalize the whole file in one pass (used by C4's single-pass path).
    async fn normalize_whole(&self, input: &Path, out_path: &Path) -> Result<()>;
}

pub struct FfmpegNormalizer {
    pub extract_timeout: Duration,
}

impl Default for FfmpegNormalizer {
    fn default() -> Self {
        Self {
            extract_timeout: Duration::from_secs(300),
        }
    }
}

impl FfmpegNormalizer {
    async fn run(&self, args: Vec<String>) -> Result<()> {
        let run = Command::new("ffmpeg").args(&args).output();
        let output = timeout(self.extract_timeout, run)
            .await
            .map_err(|_| AppError::timeout("ffmpeg extraction exceeded the configured ceiling"))?
            .map_err(|e| AppError::preparation(format!("ffmpeg not available: {e}")))?;

        if !output.status.success() {
            return Err(AppError::preparation(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AudioNormalizer for FfmpegNormalizer {
    async fn extract_slice(
        &self,
        input: &Path,
        start_sec: f64,
        end_sec: f64,
        out_path: &Path,
    ) -> Result<()> {
        let duration = (end_sec - start_sec).max(0.0);
        self.run(vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-ss".into(),
            format!("{start_sec:.3}"),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-t".into(),
            format!("{duration:.3}"),
            "-vn".into(),
            "-ar".into(),
            TARGET_SAMPLE_RATE.to_string(),
            "-ac".into(),
            TARGET_CHANNELS.to_string(),
            "-c:a".into(),
            "pcm_s16le".into(),
            "-f".into(),
            "wav".into(),
            out_path.to_string_lossy().into_owned(),
        ])
        .await
    }

    async fn normalize_whole(&self, input: &Path, out_path: &Path) -> Result<()> {
        self.run(vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-vn".into(),
            "-ar".into(),
            TARGET_SAMPLE_RATE.to_string(),
            "-ac".into(),
            TARGET_CHANNELS.to_string(),
            "-c:a".into(),
            "pcm_s16le".into(),
            "-f".into(),
            "wav".into(),
            out_path.to_string_lossy().into_owned(),
        ])
        .await
    }
}

/// Read an entire PCM-S16LE mono WAVE file into normalized `f32` samples,
/// via `hound`. Used by C2/C4 before handing samples to the ASR backend.
pub fn read_wav_samples(path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| AppError::storage(format!("failed to open chunk {path:?}: {e}")))?;
    let spec = reader.spec();
    if spec.channels != TARGET_CHANNELS || spec.sample_rate != TARGET_SAMPLE_RATE {
        return Err(AppError::preparation(format!(
            "chunk {path:?} is not {TARGET_SAMPLE_RATE}Hz/{TARGET_CHANNELS}ch PCM"
        )));
    }
    reader
        .samples::<i16>()
        .map(|s| {
            s.map(|v| v as f32 / i16::MAX as f32)
                .map_err(|e| AppError::storage(format!("corrupt sample in {path:?}: {e}")))
        })
        .collect()
}

pub fn chunk_file_name(index: usize) -> PathBuf {
    PathBuf::from(format!("chunk_{index:03}.wav"))
}
