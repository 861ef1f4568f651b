//! C1 Chunk Preparer (§4.1): split a normalized audio file on disk into
//! fixed-duration 16 kHz mono PCM chunks, grounded on the original
//! `chunk_preparation_service.py`'s duration-then-split-then-extract
//! algorithm.

use crate::error::{AppError, Result};
use crate::external::{AudioNormalizer, MediaProbe};
use crate::transcription::session::Session;
use futures::future::try_join_all;
use std::path::PathBuf;
use std::sync::Arc;

pub struct ChunkPreparer {
    probe: Arc<dyn MediaProbe>,
    normalizer: Arc<dyn AudioNormalizer>,
}

impl ChunkPreparer {
    pub fn new(probe: Arc<dyn MediaProbe>, normalizer: Arc<dyn AudioNormalizer>) -> Self {
        Self { probe, normalizer }
    }

    /// `prepare(audio_path, session, chunk_duration_sec) -> ordered chunk paths`.
    /// Interval extractions run concurrently; all must complete before
    /// returning, and any per-chunk failure fails the whole call (§4.1).
    pub async fn prepare(
        &self,
        audio_path: &std::path::Path,
        session: &Session,
        chunk_duration_sec: f64,
    ) -> Result<Vec<PathBuf>> {
        let total = self.probe.duration_sec(audio_path).await?;
        if total <= 0.0 {
            return Err(AppError::validation(
                "PREP_DURATION_UNKNOWN",
                "probe returned a non-positive duration",
            ));
        }

        let chunk_count = (total / chunk_duration_sec).ceil() as usize;
        let intervals: Vec<(f64, f64)> = (0..chunk_count)
            .map(|k| {
                let start = k as f64 * chunk_duration_sec;
                let end = ((k + 1) as f64 * chunk_duration_sec).min(total);
                (start, end)
            })
            .collect();

        let extractions = intervals.iter().enumerate().map(|(index, (start, end))| {
            let out_path = session.chunk_path(index);
            let start = *start;
            let end = *end;
            async move {
                self.normalizer
                    .extract_slice(audio_path, start, end, &out_path)
                    .await
                    .map_err(|e| {
                        AppError::preparation(format!("chunk {index} extraction failed: {e}"))
                    })?;
                Ok::<PathBuf, AppError>(out_path)
            }
        });

        try_join_all(extractions).await
    }
}

#[cfg(test)]
mod tests;
