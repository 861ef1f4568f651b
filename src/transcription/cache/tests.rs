use super::*;
use crate::transcription::types::Segment;
use std::io::Write as _;

fn sample_transcript(text: &str) -> Transcript {
    Transcript {
        segments: vec![Segment {
            start_sec: 0.0,
            end_sec: 1.0,
            text: text.to_string(),
        }],
        detected_language: "en".to_string(),
        duration_sec: 1.0,
        processing_time_sec: 0.1,
    }
}

#[test]
fn put_then_get_round_trips() {
    let cache = TranscriptionCache::new(10, Duration::from_secs(3600));
    cache.put("hash1", sample_transcript("hello"), "base", "en", 1024);

    let got = cache.get("hash1", "base", "en").unwrap();
    assert_eq!(got.full_text(), "hello");
    assert_eq!(cache.stats().hits, 1);
}

#[test]
fn miss_on_unknown_key_is_counted() {
    let cache = TranscriptionCache::new(10, Duration::from_secs(3600));
    assert!(cache.get("nope", "base", "en").is_none());
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn distinct_model_or_language_is_a_distinct_entry() {
    let cache = TranscriptionCache::new(10, Duration::from_secs(3600));
    cache.put("hash1", sample_transcript("english"), "base", "en", 10);
    cache.put("hash1", sample_transcript("french"), "base", "fr", 10);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("hash1", "base", "en").unwrap().full_text(), "english");
    assert_eq!(cache.get("hash1", "base", "fr").unwrap().full_text(), "french");
}

#[test]
fn eviction_respects_max_entries_and_lru_order() {
    let cache = TranscriptionCache::new(2, Duration::from_secs(3600));
    cache.put("a", sample_transcript("a"), "base", "en", 1);
    cache.put("b", sample_transcript("b"), "base", "en", 1);
    // Touch "a" so "b" becomes the LRU entry.
    assert!(cache.get("a", "base", "en").is_some());
    cache.put("c", sample_transcript("c"), "base", "en", 1);

    assert_eq!(cache.len(), 2);
    assert!(cache.get("b", "base", "en").is_none());
    assert!(cache.get("a", "base", "en").is_some());
    assert!(cache.get("c", "base", "en").is_some());
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn expired_entry_is_absent_and_counted_as_expiration() {
    let cache = TranscriptionCache::new(10, Duration::from_millis(0));
    cache.put("hash1", sample_transcript("hello"), "base", "en", 1);
    std::thread::sleep(Duration::from_millis(5));

    assert!(cache.get("hash1", "base", "en").is_none());
    assert_eq!(cache.stats().expirations, 1);
    assert_eq!(cache.len(), 0);
}

#[test]
fn invalidate_removes_every_entry_for_hash_regardless_of_model_or_language() {
    let cache = TranscriptionCache::new(10, Duration::from_secs(3600));
    cache.put("hash1", sample_transcript("en"), "base", "en", 1);
    cache.put("hash1", sample_transcript("fr"), "small", "fr", 1);
    cache.put("hash2", sample_transcript("other"), "base", "en", 1);

    let removed = cache.invalidate("hash1");
    assert_eq!(removed, 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.get("hash2", "base", "en").is_some());
}

#[test]
fn cleanup_expired_removes_only_stale_entries() {
    let cache = TranscriptionCache::new(10, Duration::from_secs(3600));
    cache.put("fresh", sample_transcript("fresh"), "base", "en", 1);
    // cleanup_expired with a 0-duration TTL cache would flag everything;
    // here we verify a fresh entry survives under the real TTL.
    let removed = cache.cleanup_expired();
    assert_eq!(removed, 0);
    assert!(cache.get("fresh", "base", "en").is_some());
}

#[test]
fn compute_hash_is_stable_for_identical_contents() {
    let dir = std::env::temp_dir().join(format!("te-cache-hash-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("sample.wav");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(b"identical payload bytes").unwrap();
    drop(f);

    let h1 = TranscriptionCache::compute_hash(&path).unwrap();
    let h2 = TranscriptionCache::compute_hash(&path).unwrap();
    assert_eq!(h1, h2);
    assert_eq!(h1.len(), 32);

    let _ = std::fs::remove_dir_all(&dir);
}
