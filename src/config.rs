//! Environment-driven application configuration.
//!
//! Loaded once at startup via the `config` crate (defaults layered
//! under `.env`/process environment), then validated before any
//! component is constructed. Mirrors the env var names the original
//! Python service used (`WHISPER_MODEL`, `MAX_VIDEO_SIZE_MB`, ...) so
//! existing deployment tooling needs no changes.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration, composed from the sections below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub app: AppInfo,
    pub whisper: WhisperConfig,
    pub parallel: ParallelConfig,
    pub cache: CacheConfig,
    pub limits: LimitsConfig,
    pub storage: StorageConfig,
    pub polling: PollingConfig,
    pub jobs: JobsConfig,
    pub stages: StagesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub bind_addr: String,
}

/// ASR backend selection (§4.4, §6 "Environment configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperConfig {
    pub model: String,
    pub device: String,
    pub language: Option<String>,
}

const ALLOWED_MODELS: &[&str] = &["tiny", "base", "small", "medium", "large", "turbo"];

/// Persistent worker pool & chunking (C1/C2/C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    pub workers: usize,
    pub chunk_duration_sec: u64,
    pub audio_limit_single_core_sec: u64,
}

/// Transcription cache (C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl_hours: u64,
}

/// Source media constraints (§4.1 validation, §7 VALIDATION errors).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_video_duration_seconds: u64,
    pub max_video_size_mb: u64,
}

/// Local scratch storage and the Redis-backed job store (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub temp_dir: PathBuf,
    pub cleanup_on_startup: bool,
    pub max_temp_age_hours: u64,
    pub redis_url: String,
}

/// Long-poll / pipeline stage polling backoff (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval_initial_ms: u64,
    pub interval_max_ms: u64,
    pub max_attempts: u32,
}

impl PollingConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.interval_initial_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.interval_max_ms)
    }
}

/// Job Store retention (C8, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub ttl_hours: u64,
}

/// Base URLs of the three independently-deployed stage services C7
/// drives (§6 "Environment configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesConfig {
    pub download_base_url: String,
    pub normalize_base_url: String,
    pub transcribe_base_url: String,
    pub max_poll_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppInfo {
                name: "transcribe-engine".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                bind_addr: "0.0.0.0:8080".to_string(),
            },
            whisper: WhisperConfig {
                model: "base".to_string(),
                device: "cpu".to_string(),
                language: None,
            },
            parallel: ParallelConfig {
                workers: default_worker_count(),
                chunk_duration_sec: 120,
                audio_limit_single_core_sec: 300,
            },
            cache: CacheConfig {
                max_size: 100,
                ttl_hours: 24,
            },
            limits: LimitsConfig {
                max_video_duration_seconds: 10_800,
                max_video_size_mb: 1_500,
            },
            storage: StorageConfig {
                temp_dir: PathBuf::from("/tmp/transcribe-engine"),
                cleanup_on_startup: true,
                max_temp_age_hours: 24,
                redis_url: "redis://127.0.0.1:6379".to_string(),
            },
            polling: PollingConfig {
                interval_initial_ms: 500,
                interval_max_ms: 5_000,
                max_attempts: 120,
            },
            jobs: JobsConfig { ttl_hours: 24 },
            stages: StagesConfig {
                download_base_url: "http://127.0.0.1:8081".to_string(),
                normalize_base_url: "http://127.0.0.1:8082".to_string(),
                transcribe_base_url: "http://127.0.0.1:8083".to_string(),
                max_poll_attempts: 200,
            },
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .saturating_sub(1)
        .clamp(2, 4)
}

impl AppConfig {
    /// Load configuration by layering defaults, an optional config file,
    /// and process environment variables (the last wins).
    pub fn load() -> Result<Self> {
        let defaults = AppConfig::default();
        let builder = config::Config::builder()
            .set_default("app.name", defaults.app.name.clone())?
            .set_default("app.bind_addr", defaults.app.bind_addr.clone())?
            .set_default("whisper.model", defaults.whisper.model.clone())?
            .set_default("whisper.device", defaults.whisper.device.clone())?
            .set_default("parallel.workers", defaults.parallel.workers as i64)?
            .set_default(
                "parallel.chunk_duration_sec",
                defaults.parallel.chunk_duration_sec as i64,
            )?
            .set_default(
                "parallel.audio_limit_single_core_sec",
                defaults.parallel.audio_limit_single_core_sec as i64,
            )?
            .set_default("cache.max_size", defaults.cache.max_size as i64)?
            .set_default("cache.ttl_hours", defaults.cache.ttl_hours as i64)?
            .set_default(
                "limits.max_video_duration_seconds",
                defaults.limits.max_video_duration_seconds as i64,
            )?
            .set_default(
                "limits.max_video_size_mb",
                defaults.limits.max_video_size_mb as i64,
            )?
            .set_default(
                "storage.temp_dir",
                defaults.storage.temp_dir.to_string_lossy().to_string(),
            )?
            .set_default("storage.cleanup_on_startup", defaults.storage.cleanup_on_startup)?
            .set_default(
                "storage.max_temp_age_hours",
                defaults.storage.max_temp_age_hours as i64,
            )?
            .set_default("storage.redis_url", defaults.storage.redis_url.clone())?
            .set_default(
                "polling.interval_initial_ms",
                defaults.polling.interval_initial_ms as i64,
            )?
            .set_default(
                "polling.interval_max_ms",
                defaults.polling.interval_max_ms as i64,
            )?
            .set_default("polling.max_attempts", defaults.polling.max_attempts as i64)?
            .set_default("jobs.ttl_hours", defaults.jobs.ttl_hours as i64)?
            .set_default(
                "stages.download_base_url",
                defaults.stages.download_base_url.clone(),
            )?
            .set_default(
                "stages.normalize_base_url",
                defaults.stages.normalize_base_url.clone(),
            )?
            .set_default(
                "stages.transcribe_base_url",
                defaults.stages.transcribe_base_url.clone(),
            )?
            .set_default(
                "stages.max_poll_attempts",
                defaults.stages.max_poll_attempts as i64,
            )?
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .add_source(env_overrides());

        let raw = builder.build()?;
        let mut cfg: AppConfig = raw.try_deserialize().unwrap_or(defaults);
        cfg.app.version = env!("CARGO_PKG_VERSION").to_string();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration against the invariants spec.md §6/§7 assume hold.
    pub fn validate(&self) -> Result<()> {
        if !ALLOWED_MODELS.contains(&self.whisper.model.as_str()) {
            return Err(AppError::config(format!(
                "WHISPER_MODEL must be one of {ALLOWED_MODELS:?}, got '{}'",
                self.whisper.model
            )));
        }

        if self.parallel.workers == 0 {
            return Err(AppError::config("PARALLEL_WORKERS must be greater than 0"));
        }

        if self.parallel.chunk_duration_sec == 0 {
            return Err(AppError::config(
                "PARALLEL_CHUNK_DURATION_SEC must be greater than 0",
            ));
        }

        if self.cache.max_size == 0 {
            return Err(AppError::config("CACHE_MAX_SIZE must be greater than 0"));
        }

        if self.limits.max_video_duration_seconds == 0 {
            return Err(AppError::config(
                "MAX_VIDEO_DURATION_SECONDS must be greater than 0",
            ));
        }

        if self.limits.max_video_size_mb == 0 {
            return Err(AppError::config("MAX_VIDEO_SIZE_MB must be greater than 0"));
        }

        if self.storage.redis_url.is_empty() {
            return Err(AppError::config("REDIS_URL must not be empty"));
        }

        if self.polling.interval_initial_ms == 0
            || self.polling.interval_initial_ms > self.polling.interval_max_ms
        {
            return Err(AppError::config(
                "POLL_INTERVAL_INITIAL must be greater than 0 and at most POLL_INTERVAL_MAX",
            ));
        }

        Ok(())
    }
}

/// Maps the flat env var names spec.md §6 documents onto the nested
/// config shape, since `config::Environment`'s separator convention
/// would otherwise demand `APP__WHISPER__MODEL`-style names.
fn env_overrides() -> config::Environment {
    let mappings: &[(&str, &str)] = &[
        ("WHISPER_MODEL", "whisper.model"),
        ("WHISPER_DEVICE", "whisper.device"),
        ("WHISPER_LANGUAGE", "whisper.language"),
        ("PARALLEL_WORKERS", "parallel.workers"),
        ("PARALLEL_CHUNK_DURATION_SEC", "parallel.chunk_duration_sec"),
        (
            "AUDIO_LIMIT_SINGLE_CORE",
            "parallel.audio_limit_single_core_sec",
        ),
        ("CACHE_MAX_SIZE", "cache.max_size"),
        ("CACHE_TTL_HOURS", "cache.ttl_hours"),
        (
            "MAX_VIDEO_DURATION_SECONDS",
            "limits.max_video_duration_seconds",
        ),
        ("MAX_VIDEO_SIZE_MB", "limits.max_video_size_mb"),
        ("TEMP_DIR", "storage.temp_dir"),
        ("CLEANUP_ON_STARTUP", "storage.cleanup_on_startup"),
        ("MAX_TEMP_AGE_HOURS", "storage.max_temp_age_hours"),
        ("REDIS_URL", "storage.redis_url"),
        ("POLL_INTERVAL_INITIAL", "polling.interval_initial_ms"),
        ("POLL_INTERVAL_MAX", "polling.interval_max_ms"),
        ("MAX_POLL_ATTEMPTS", "polling.max_attempts"),
        ("BIND_ADDR", "app.bind_addr"),
        ("JOB_TTL_HOURS", "jobs.ttl_hours"),
        ("DOWNLOAD_SERVICE_URL", "stages.download_base_url"),
        ("NORMALIZE_SERVICE_URL", "stages.normalize_base_url"),
        ("TRANSCRIBE_SERVICE_URL", "stages.transcribe_base_url"),
        ("STAGE_MAX_POLL_ATTEMPTS", "stages.max_poll_attempts"),
    ];

    let mut overrides = std::collections::HashMap::new();
    for (env_name, key) in mappings {
        if let Ok(value) = std::env::var(env_name) {
            overrides.insert(key.to_string(), value);
        }
    }
    config::Environment::default().source(Some(overrides))
}
