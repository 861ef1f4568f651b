//! The ASR backend boundary: §1 treats the speech-recognition model as an
//! "opaque decoder operating on 16 kHz mono PCM." `AsrBackend` is that
//! boundary; `MockAsrBackend` is the one concrete, workable implementation
//! so the rest of the crate runs end-to-end without a real model file.

use crate::transcription::types::{Segment, WhisperModel};
use async_trait::async_trait;
use std::time::Duration;

/// One pass of ASR over a slice of mono PCM samples, already resampled to
/// 16 kHz by the caller (C1's chunk files or C4's full-file read).
#[async_trait]
pub trait AsrBackend: Send + Sync {
    /// Transcribe `samples` (16 kHz mono f32, normalized to [-1, 1]).
    /// `language_hint` steers decoding when the caller already knows the
    /// language; returns segments with timestamps relative to the start
    /// of `samples`, plus the backend's own language guess.
    async fn transcribe(
        &self,
        samples: &[f32],
        language_hint: Option<&str>,
    ) -> anyhow::Result<AsrOutput>;
}

pub struct AsrOutput {
    pub segments: Vec<Segment>,
    pub detected_language: String,
}

/// Deterministic, audio-characteristic-driven mock decoder. Grounded on the
/// teacher's `ModelSession::run_realistic_mock_inference`: processing cost
/// scales with model size and audio duration, and the produced text is
/// selected by simple signal features (RMS level, zero-crossing rate) so
/// repeated calls on the same audio chunk are reproducible.
pub struct MockAsrBackend {
    model: WhisperModel,
    sample_rate: u32,
}

impl MockAsrBackend {
    pub fn new(model: WhisperModel) -> Self {
        Self {
            model,
            sample_rate: 16_000,
        }
    }

    fn per_second_cost_ms(&self) -> f32 {
        match self.model {
            WhisperModel::Tiny => 80.0,
            WhisperModel::Base => 120.0,
            WhisperModel::Small => 180.0,
            WhisperModel::Medium => 260.0,
            WhisperModel::Large => 340.0,
            WhisperModel::Turbo => 100.0,
        }
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn zero_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count()
    }

    fn mock_phrase(rms: f32, crossings: usize) -> &'static str {
        const PHRASES: &[&str] = &[
            "the source audio has been normalized and is ready for analysis",
            "speakers are exchanging turns over a moderately noisy channel",
            "a single voice is narrating over a quiet background",
            "overlapping speech detected across the sampled interval",
            "silence dominates this segment with brief vocal bursts",
        ];
        if rms < 0.02 {
            PHRASES[4]
        } else {
            PHRASES[(crossings / 500) % (PHRASES.len() - 1)]
        }
    }
}

#[async_trait]
impl AsrBackend for MockAsrBackend {
    async fn transcribe(
        &self,
        samples: &[f32],
        language_hint: Option<&str>,
    ) -> anyhow::Result<AsrOutput> {
        let duration_sec = samples.len() as f64 / self.sample_rate as f64;
        let rms = Self::rms(samples);
        let crossings = Self::zero_crossings(samples);

        let base_cost_ms = duration_sec as f32 * self.per_second_cost_ms();
        let jitter = (fastrand::f32() - 0.5) * base_cost_ms * 0.2;
        let simulated_delay = ((base_cost_ms + jitter).max(5.0) / 10.0).min(250.0);
        tokio::time::sleep(Duration::from_millis(simulated_delay as u64)).await;

        let detected_language = language_hint.map(str::to_string).unwrap_or_else(|| {
            if rms < 0.01 {
                "unknown".to_string()
            } else {
                "en".to_string()
            }
        });

        if duration_sec <= 0.0 {
            return Ok(AsrOutput {
                segments: Vec::new(),
                detected_language,
            });
        }

        let phrase = Self::mock_phrase(rms, crossings);
        let words: Vec<&str> = phrase.split_whitespace().collect();
        let segment_count = (duration_sec / 5.0).ceil().max(1.0) as usize;
        let segment_len = duration_sec / segment_count as f64;

        let mut segments = Vec::with_capacity(segment_count);
        for i in 0..segment_count {
            let start = i as f64 * segment_len;
            let end = if i + 1 == segment_count {
                duration_sec
            } else {
                start + segment_len
            };
            let word_start = (i * words.len()) / segment_count;
            let word_end = ((i + 1) * words.len()) / segment_count;
            let text = words[word_start..word_end.max(word_start + 1).min(words.len())].join(" ");
            segments.push(Segment {
                start_sec: start,
                end_sec: end,
                text: if text.is_empty() {
                    phrase.to_string()
                } else {
                    text
                },
            });
        }

        Ok(AsrOutput {
            segments,
            detected_language,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn produces_non_decreasing_segments() {
        let backend = MockAsrBackend::new(WhisperModel::Tiny);
        let samples: Vec<f32> = (0..16_000 * 12)
            .map(|i| (i as f32 * 0.01).sin() * 0.3)
            .collect();
        let out = backend.transcribe(&samples, Some("en")).await.unwrap();
        assert!(!out.segments.is_empty());
        for pair in out.segments.windows(2) {
            assert!(pair[0].start_sec <= pair[1].start_sec);
        }
        assert_eq!(out.detected_language, "en");
    }

    #[tokio::test]
    async fn empty_audio_yields_no_segments() {
        let backend = MockAsrBackend::new(WhisperModel::Base);
        let out = backend.transcribe(&[], None).await.unwrap();
        assert!(out.segments.is_empty());
    }
}
