use super::*;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

struct FakeProbe {
    duration: f64,
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn duration_sec(&self, _path: &Path) -> Result<f64> {
        Ok(self.duration)
    }

    async fn has_audio_stream(&self, _path: &Path) -> Result<bool> {
        Ok(true)
    }
}

struct FakeNormalizer {
    extractions: AtomicUsize,
}

#[async_trait]
impl AudioNormalizer for FakeNormalizer {
    async fn extract_slice(
        &self,
        _input: &Path,
        _start_sec: f64,
        _end_sec: f64,
        out_path: &Path,
    ) -> Result<()> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(out_path, b"RIFF....WAVEfmt ").await?;
        Ok(())
    }

    async fn normalize_whole(&self, _input: &Path, out_path: &Path) -> Result<()> {
        tokio::fs::write(out_path, b"RIFF....WAVEfmt ").await?;
        Ok(())
    }
}

#[tokio::test]
async fn exact_multiple_of_chunk_duration_yields_k_chunks() {
    let probe = Arc::new(FakeProbe { duration: 360.0 });
    let normalizer = Arc::new(FakeNormalizer {
        extractions: AtomicUsize::new(0),
    });
    let preparer = ChunkPreparer::new(probe, normalizer.clone());

    let base = std::env::temp_dir().join(format!("te-chunkprep-{}", uuid::Uuid::new_v4()));
    let session = Session::create(&base).await.unwrap();

    let chunks = preparer
        .prepare(Path::new("/tmp/in.wav"), &session, 120.0)
        .await
        .unwrap();

    assert_eq!(chunks.len(), 3);
    assert_eq!(normalizer.extractions.load(Ordering::SeqCst), 3);
    for (i, path) in chunks.iter().enumerate() {
        assert!(path.ends_with(format!("chunk_{i:03}.wav")));
    }

    let _ = tokio::fs::remove_dir_all(&base).await;
}

#[tokio::test]
async fn short_last_chunk_is_covered() {
    let probe = Arc::new(FakeProbe { duration: 250.0 });
    let normalizer = Arc::new(FakeNormalizer {
        extractions: AtomicUsize::new(0),
    });
    let preparer = ChunkPreparer::new(probe, normalizer);

    let base = std::env::temp_dir().join(format!("te-chunkprep-{}", uuid::Uuid::new_v4()));
    let session = Session::create(&base).await.unwrap();

    let chunks = preparer
        .prepare(Path::new("/tmp/in.wav"), &session, 120.0)
        .await
        .unwrap();

    // ceil(250/120) = 3: two full 120s chunks plus a 10s remainder.
    assert_eq!(chunks.len(), 3);

    let _ = tokio::fs::remove_dir_all(&base).await;
}

#[tokio::test]
async fn zero_duration_fails_validation() {
    let probe = Arc::new(FakeProbe { duration: 0.0 });
    let normalizer = Arc::new(FakeNormalizer {
        extractions: AtomicUsize::new(0),
    });
    let preparer = ChunkPreparer::new(probe, normalizer);

    let base = std::env::temp_dir().join(format!("te-chunkprep-{}", uuid::Uuid::new_v4()));
    let session = Session::create(&base).await.unwrap();

    let result = preparer
        .prepare(Path::new("/tmp/in.wav"), &session, 120.0)
        .await;
    assert!(result.is_err());

    let _ = tokio::fs::remove_dir_all(&base).await;
}
