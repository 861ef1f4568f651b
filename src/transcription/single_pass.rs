//! C4 Single-Pass Transcription Service (§4.4): no chunking, one ASR call
//! over the whole normalized file. Used directly for audio shorter than
//! `AUDIO_LIMIT_SINGLE_CORE` and as C3's fallback when the worker pool is
//! saturated or degraded. Grounded on the teacher's `WhisperProcessor::
//! process_audio_chunk`, with the confidence-gate/partial-result behavior
//! dropped since this crate always returns full transcripts (DESIGN.md).

use crate::error::{AppError, Result};
use crate::external::asr::AsrBackend;
use crate::external::normalizer::read_wav_samples;
use crate::transcription::types::Transcript;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub struct SinglePassTranscriptionService {
    backend: Arc<dyn AsrBackend>,
}

impl SinglePassTranscriptionService {
    pub fn new(backend: Arc<dyn AsrBackend>) -> Self {
        Self { backend }
    }

    /// `transcribe(normalized_audio_path, language) -> Transcript`. The
    /// input must already be 16 kHz mono PCM (C6 normalizes before
    /// calling either C3 or C4).
    pub async fn transcribe(&self, audio_path: &Path, language: Option<&str>) -> Result<Transcript> {
        let start = Instant::now();
        let samples = read_wav_samples(audio_path)
            .map_err(|e| AppError::transcription(format!("failed to read normalized audio: {e}")))?;
        let duration_sec = samples.len() as f64 / 16_000.0;

        let output = self
            .backend
            .transcribe(&samples, language)
            .await
            .map_err(|e| AppError::transcription(e.to_string()))?;

        Ok(Transcript {
            segments: output.segments,
            detected_language: output.detected_language,
            duration_sec,
            processing_time_sec: start.elapsed().as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::types::WhisperModel;
    use crate::external::asr::MockAsrBackend;

    fn write_sine_wav(path: &Path, seconds: f64) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let sample_count = (seconds * 16_000.0) as usize;
        for i in 0..sample_count {
            let value = ((i as f32 * 0.03).sin() * 6000.0) as i16;
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[tokio::test]
    async fn transcribes_whole_file_in_one_pass() {
        let dir = std::env::temp_dir().join(format!("te-singlepass-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("full.wav");
        write_sine_wav(&path, 3.0);

        let service = SinglePassTranscriptionService::new(Arc::new(MockAsrBackend::new(WhisperModel::Tiny)));
        let transcript = service.transcribe(&path, Some("en")).await.unwrap();

        assert!(transcript.is_well_ordered());
        assert!((transcript.duration_sec - 3.0).abs() < 0.01);
        assert!(!transcript.segments.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_file_is_a_transcription_error() {
        let service = SinglePassTranscriptionService::new(Arc::new(MockAsrBackend::new(WhisperModel::Tiny)));
        let result = service
            .transcribe(Path::new("/nonexistent/audio.wav"), None)
            .await;
        assert!(result.is_err());
    }
}
