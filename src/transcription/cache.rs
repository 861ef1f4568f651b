//! C5 Transcription Cache (§4.5): content-addressed LRU+TTL cache keyed
//! by `(file_hash, model_id, language)`. Grounded on the original
//! `transcription_cache.py` (`OrderedDict` LRU + per-entry access
//! bookkeeping); ported here to a `HashMap` plus an explicit recency
//! list under one `std::sync::Mutex`, matching §5's "single reentrant
//! lock protecting both the ordered-map structure and the statistics
//! counters" requirement (no `lru`/`indexmap` crate appears anywhere in
//! the corpus, so this is hand-rolled rather than borrowed).

use crate::transcription::types::Transcript;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

pub type CacheKey = (String, String, String);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub transcript: Transcript,
    pub cached_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub file_size_bytes: u64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    /// MRU at the back, LRU at the front — mirrors the Python
    /// implementation's `OrderedDict` with `move_to_end`.
    recency: Vec<CacheKey>,
    stats: CacheStats,
}

pub struct TranscriptionCache {
    inner: Mutex<Inner>,
    max_entries: usize,
    ttl: Duration,
}

impl TranscriptionCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: Vec::new(),
                stats: CacheStats::default(),
            }),
            max_entries,
            ttl,
        }
    }

    /// Streaming MD5 over the file's contents — an index key, not a
    /// security primitive (§4.5).
    pub fn compute_hash(path: &Path) -> std::io::Result<String> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Md5::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// `get(hash, model_id, language) -> Transcript | absent`. On hit,
    /// updates `last_accessed`, increments `access_count`, and promotes
    /// the entry to the MRU end. An expired entry is removed and
    /// counted as both a miss and an expiration (§4.5 invariant c).
    pub fn get(&self, hash: &str, model_id: &str, language: &str) -> Option<Transcript> {
        let key = (hash.to_string(), model_id.to_string(), language.to_string());
        let mut inner = self.inner.lock().unwrap();

        let is_expired = inner
            .entries
            .get(&key)
            .map(|e| Utc::now().signed_duration_since(e.cached_at).to_std().unwrap_or_default() > self.ttl)
            .unwrap_or(false);

        if is_expired {
            inner.entries.remove(&key);
            inner.recency.retain(|k| k != &key);
            inner.stats.misses += 1;
            inner.stats.expirations += 1;
            debug!(?key, "cache entry expired");
            return None;
        }

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.last_accessed = Utc::now();
            entry.access_count += 1;
            let transcript = entry.transcript.clone();
            inner.recency.retain(|k| k != &key);
            inner.recency.push(key);
            inner.stats.hits += 1;
            Some(transcript)
        } else {
            inner.stats.misses += 1;
            None
        }
    }

    /// `put(hash, transcript, model_id, language, file_size)`:
    /// insert-or-replace; evicts the LRU end if over `max_entries`.
    pub fn put(
        &self,
        hash: &str,
        transcript: Transcript,
        model_id: &str,
        language: &str,
        file_size_bytes: u64,
    ) {
        let key = (hash.to_string(), model_id.to_string(), language.to_string());
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        let is_new = !inner.entries.contains_key(&key);
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                transcript,
                cached_at: now,
                last_accessed: now,
                access_count: 1,
                file_size_bytes,
            },
        );
        inner.recency.retain(|k| k != &key);
        inner.recency.push(key);

        if is_new && inner.entries.len() > self.max_entries {
            if let Some(lru_key) = inner.recency.first().cloned() {
                inner.entries.remove(&lru_key);
                inner.recency.remove(0);
                inner.stats.evictions += 1;
                debug!(?lru_key, "evicted LRU cache entry");
            }
        }
    }

    /// Remove every entry whose key's `file_hash` matches `hash`.
    pub fn invalidate(&self, hash: &str) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let to_remove: Vec<CacheKey> = inner
            .entries
            .keys()
            .filter(|k| k.0 == hash)
            .cloned()
            .collect();
        for key in &to_remove {
            inner.entries.remove(key);
        }
        inner.recency.retain(|k| !to_remove.contains(k));
        to_remove.len()
    }

    /// Remove every entry with `now - cached_at > ttl`; returns the count.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let ttl = self.ttl;
        let now = Utc::now();
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, e)| {
                now.signed_duration_since(e.cached_at)
                    .to_std()
                    .unwrap_or_default()
                    > ttl
            })
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            inner.entries.remove(key);
        }
        inner.recency.retain(|k| !expired.contains(k));
        inner.stats.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests;
