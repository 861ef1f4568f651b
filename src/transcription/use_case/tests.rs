use super::*;
use crate::external::asr::MockAsrBackend;
use crate::transcription::single_pass::SinglePassTranscriptionService;
use crate::transcription::worker_pool::PersistentWorkerPool;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct PassthroughFetcher;

#[async_trait]
impl SourceFetcher for PassthroughFetcher {
    async fn fetch(&self, source_ref: &SourceRef, _dest_dir: &Path) -> Result<PathBuf> {
        match source_ref {
            SourceRef::UploadedFile(path) => Ok(path.clone()),
            SourceRef::Url(_) => Err(AppError::fetch("url fetch not supported in test fixture")),
        }
    }
}

struct FixedProbe {
    duration: f64,
    has_audio: bool,
}

#[async_trait]
impl MediaProbe for FixedProbe {
    async fn duration_sec(&self, _path: &Path) -> Result<f64> {
        Ok(self.duration)
    }

    async fn has_audio_stream(&self, _path: &Path) -> Result<bool> {
        Ok(self.has_audio)
    }
}

struct CountingNormalizer {
    calls: Arc<AtomicUsize>,
    seconds: f64,
}

#[async_trait]
impl crate::external::AudioNormalizer for CountingNormalizer {
    async fn extract_slice(
        &self,
        _input: &Path,
        start_sec: f64,
        end_sec: f64,
        out_path: &Path,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        write_sine_wav(out_path, (end_sec - start_sec).max(0.1));
        Ok(())
    }

    async fn normalize_whole(&self, _input: &Path, out_path: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        write_sine_wav(out_path, self.seconds);
        Ok(())
    }
}

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
        let value = ((i as f32 * 0.04).sin() * 5000.0) as i16;
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
}

async fn build_use_case(
    duration: f64,
    has_audio: bool,
    max_size_mb: u64,
) -> (TranscriptionUseCase, std::path::PathBuf) {
    let base = std::env::temp_dir().join(format!("te-usecase-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&base).unwrap();
    let source_path = base.join("source.wav");
    write_sine_wav(&source_path, 2.0);

    let pool = Arc::new(
        PersistentWorkerPool::start(1, || {
            Arc::new(MockAsrBackend::new(WhisperModel::Tiny)) as Arc<dyn crate::external::asr::AsrBackend>
        })
        .await
        .unwrap(),
    );
    let probe = Arc::new(FixedProbe { duration, has_audio });
    let normalizer = Arc::new(CountingNormalizer {
        calls: Arc::new(AtomicUsize::new(0)),
        seconds: duration,
    });
    let single_pass = Arc::new(SinglePassTranscriptionService::new(Arc::new(
        MockAsrBackend::new(WhisperModel::Tiny),
    )));
    let parallel = Arc::new(ParallelTranscriptionService::new(
        pool,
        probe.clone(),
        normalizer,
        single_pass,
        base.clone(),
        10.0,
        300.0,
    ));
    let cache = Arc::new(TranscriptionCache::new(10, Duration::from_secs(3600)));

    let use_case = TranscriptionUseCase::new(
        Arc::new(PassthroughFetcher),
        probe,
        cache,
        parallel,
        TranscriptionLimits {
            max_duration_seconds: 3600,
            max_size_mb,
        },
        base.clone(),
    );

    (use_case, source_path)
}

#[tokio::test]
async fn happy_path_transcribes_and_populates_cache() {
    let (use_case, source_path) = build_use_case(2.0, true, 1_000).await;
    let request = TranscribeRequest {
        source_ref: SourceRef::UploadedFile(source_path),
        model: WhisperModel::Tiny,
        language: Some("en".to_string()),
    };

    let transcript = use_case.execute(request).await.unwrap();
    assert!(transcript.is_well_ordered());
}

#[tokio::test]
async fn rejects_media_with_no_audio_stream() {
    let (use_case, source_path) = build_use_case(2.0, false, 1_000).await;
    let request = TranscribeRequest {
        source_ref: SourceRef::UploadedFile(source_path),
        model: WhisperModel::Tiny,
        language: None,
    };

    let err = use_case.execute(request).await.unwrap_err();
    match err {
        AppError::Validation { code, .. } => assert_eq!(code, "NO_AUDIO_STREAM"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn rejects_zero_duration_source() {
    let (use_case, source_path) = build_use_case(0.0, true, 1_000).await;
    let request = TranscribeRequest {
        source_ref: SourceRef::UploadedFile(source_path),
        model: WhisperModel::Tiny,
        language: None,
    };

    let err = use_case.execute(request).await.unwrap_err();
    match err {
        AppError::Validation { code, .. } => assert_eq!(code, "ZERO_DURATION"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn rejects_duration_beyond_the_configured_limit() {
    let (use_case, source_path) = build_use_case(10_000.0, true, 1_000).await;
    let request = TranscribeRequest {
        source_ref: SourceRef::UploadedFile(source_path),
        model: WhisperModel::Tiny,
        language: None,
    };

    let err = use_case.execute(request).await.unwrap_err();
    match err {
        AppError::Validation { code, .. } => assert_eq!(code, "DURATION_EXCEEDED"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn cache_hit_skips_reprocessing() {
    let (use_case, source_path) = build_use_case(2.0, true, 1_000).await;
    let request1 = TranscribeRequest {
        source_ref: SourceRef::UploadedFile(source_path.clone()),
        model: WhisperModel::Tiny,
        language: Some("en".to_string()),
    };
    let first = use_case.execute(request1).await.unwrap();

    let request2 = TranscribeRequest {
        source_ref: SourceRef::UploadedFile(source_path),
        model: WhisperModel::Tiny,
        language: Some("en".to_string()),
    };
    let second = use_case.execute(request2).await.unwrap();

    assert_eq!(first.full_text(), second.full_text());
}
