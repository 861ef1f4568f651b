use super::*;
use crate::external::asr::{AsrOutput, MockAsrBackend};
use crate::transcription::types::{Segment, WhisperModel};
use async_trait::async_trait;
use std::path::Path;

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
        let value = ((i as f32 * 0.05).sin() * 8000.0) as i16;
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
}

struct InstantAsr;

#[async_trait]
impl AsrBackend for InstantAsr {
    async fn transcribe(
        &self,
        _samples: &[f32],
        _language_hint: Option<&str>,
    ) -> anyhow::Result<AsrOutput> {
        Ok(AsrOutput {
            segments: vec![Segment {
                start_sec: 0.0,
                end_sec: 1.0,
                text: "hi".to_string(),
            }],
            detected_language: "en".to_string(),
        })
    }
}

#[tokio::test]
async fn submits_and_collects_results() {
    let pool = PersistentWorkerPool::start(2, || Arc::new(InstantAsr) as Arc<dyn AsrBackend>)
        .await
        .unwrap();

    let dir = std::env::temp_dir().join(format!("te-pool-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let chunk_path = dir.join("chunk_000.wav");
    write_sine_wav(&chunk_path, 1.0);

    let task = ChunkTask {
        session_id: "session-1".to_string(),
        chunk_index: 0,
        chunk_path: chunk_path.clone(),
        language_hint: Some("en".to_string()),
        start_offset_sec: 0.0,
    };

    pool.submit(task, Duration::from_secs(1)).await.unwrap();
    let result = pool.recv_result(Duration::from_secs(2)).await.unwrap();

    assert_eq!(result.session_id, "session-1");
    assert!(!result.is_error());
    assert_eq!(pool.stats().tasks_completed.load(Ordering::SeqCst), 1);

    pool.stop(Duration::from_secs(1)).await;
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn offsets_segments_by_chunk_start() {
    let pool = PersistentWorkerPool::start(1, || Arc::new(InstantAsr) as Arc<dyn AsrBackend>)
        .await
        .unwrap();

    let dir = std::env::temp_dir().join(format!("te-pool-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let chunk_path = dir.join("chunk_001.wav");
    write_sine_wav(&chunk_path, 1.0);

    let task = ChunkTask {
        session_id: "session-2".to_string(),
        chunk_index: 1,
        chunk_path,
        language_hint: None,
        start_offset_sec: 120.0,
    };

    pool.submit(task, Duration::from_secs(1)).await.unwrap();
    let result = pool.recv_result(Duration::from_secs(2)).await.unwrap();

    match result.outcome {
        ChunkOutcome::Success { segments, .. } => {
            assert_eq!(segments[0].start_sec, 120.0);
        }
        ChunkOutcome::Error { message } => panic!("unexpected error: {message}"),
    }

    pool.stop(Duration::from_secs(1)).await;
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn real_asr_backend_errors_become_error_outcomes() {
    let pool = PersistentWorkerPool::start(1, || {
        Arc::new(MockAsrBackend::new(WhisperModel::Tiny)) as Arc<dyn AsrBackend>
    })
    .await
    .unwrap();

    let task = ChunkTask {
        session_id: "session-3".to_string(),
        chunk_index: 0,
        chunk_path: std::path::PathBuf::from("/nonexistent/chunk.wav"),
        language_hint: None,
        start_offset_sec: 0.0,
    };

    pool.submit(task, Duration::from_secs(1)).await.unwrap();
    let result = pool.recv_result(Duration::from_secs(2)).await.unwrap();
    assert!(result.is_error());
    assert_eq!(pool.stats().tasks_errored.load(Ordering::SeqCst), 1);

    pool.stop(Duration::from_secs(1)).await;
}
