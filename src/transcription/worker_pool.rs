//! C2 Persistent Worker Pool (§4.2): a fixed set of long-lived workers,
//! each holding one preloaded ASR model, consuming chunk-tasks from a
//! bounded task channel and publishing results on an unbounded result
//! channel. Amortizes model-load cost over the process lifetime.
//!
//! Grounded on the original `persistent_worker_pool.py`'s queue-based
//! design (bounded task queue, unbounded result queue, sentinel-based
//! shutdown, per-task error isolation), translated per SPEC_FULL §9 to
//! `tokio::sync::mpsc` channels and one `tokio::task` per worker — the
//! crate's stand-in for "dedicated OS threads or child processes," since
//! the ASR backend here is the in-process mock rather than a real model
//! that must live outside the scheduler's cooperative loop.

use crate::external::asr::AsrBackend;
use crate::external::normalizer::read_wav_samples;
use crate::transcription::types::{ChunkOutcome, ChunkResult, ChunkTask};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

enum TaskMessage {
    Task(ChunkTask),
    Stop,
}

/// Degradation and lifecycle counters the orchestrator (C6) watches to
/// decide whether to fall back to C4 for the remainder of a transcription.
#[derive(Default)]
pub struct PoolStats {
    pub tasks_submitted: AtomicUsize,
    pub tasks_completed: AtomicUsize,
    pub tasks_errored: AtomicUsize,
    pub workers_alive: AtomicUsize,
    degraded: AtomicBool,
}

impl PoolStats {
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// A worker dying outright (as opposed to a caught per-task error)
    /// marks the whole pool degraded; C3 then falls back to C4 for the
    /// remainder of the call (§4.2).
    pub(crate) fn mark_degraded(&self) {
        self.degraded.store(true, Ordering::SeqCst);
    }
}

/// Per-call result routing: `ParallelTranscriptionService::transcribe`
/// registers its session before submitting any chunk, so each call
/// drains only the `ChunkResult`s workers tag with its own session id
/// instead of racing other concurrent calls for the one shared channel
/// (spec's "one consumer per transcription call" result-channel model).
type SessionRoutes = Arc<tokio::sync::Mutex<HashMap<String, mpsc::UnboundedSender<ChunkResult>>>>;

pub struct PersistentWorkerPool {
    task_tx: mpsc::Sender<TaskMessage>,
    result_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ChunkResult>>,
    session_routes: SessionRoutes,
    worker_handles: Vec<JoinHandle<()>>,
    abort_handles: Vec<tokio::task::AbortHandle>,
    stats: Arc<PoolStats>,
    worker_count: usize,
}

impl PersistentWorkerPool {
    /// `start()`: spawn `W` workers, each loading the ASR model before
    /// reaching `Idle`. Pool start fails atomically if any worker fails
    /// to load — here the mock backend never fails to load, so this is a
    /// straight-line spawn, but the `Result` stays in the signature for
    /// the real-backend case.
    pub async fn start(
        worker_count: usize,
        backend_factory: impl Fn() -> Arc<dyn AsrBackend> + Send + Sync + 'static,
    ) -> anyhow::Result<Self> {
        let task_capacity = worker_count * 10;
        let (task_tx, task_rx) = mpsc::channel::<TaskMessage>(task_capacity);
        let task_rx = Arc::new(tokio::sync::Mutex::new(task_rx));
        let (result_tx, result_rx) = mpsc::unbounded_channel::<ChunkResult>();
        let stats = Arc::new(PoolStats::default());
        let backend_factory = Arc::new(backend_factory);
        let session_routes: SessionRoutes = Arc::new(tokio::sync::Mutex::new(HashMap::new()));

        let mut worker_handles = Vec::with_capacity(worker_count);
        let mut abort_handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let routes = session_routes.clone();
            let stats = stats.clone();
            let backend = (backend_factory)();

            stats.workers_alive.fetch_add(1, Ordering::SeqCst);
            let handle = tokio::spawn(worker_loop(worker_id, backend, task_rx, result_tx, routes, stats.clone()));
            abort_handles.push(handle.abort_handle());

            // An uncaught panic inside `worker_loop` — the nearest this
            // runtime gets to a worker process dying outright — skips
            // the loop's own clean-exit tail, so nothing else decrements
            // `workers_alive` or flips the pool degraded for it.
            let monitor = tokio::spawn(async move {
                match handle.await {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => {
                        error!(worker_id, error = %e, "worker task exited abnormally");
                        stats.mark_degraded();
                        stats.workers_alive.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            });
            worker_handles.push(monitor);
        }

        info!(worker_count, task_capacity, "worker pool started");

        Ok(Self {
            task_tx,
            result_rx: tokio::sync::Mutex::new(result_rx),
            session_routes,
            worker_handles,
            abort_handles,
            stats,
            worker_count,
        })
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Register a dedicated result route for one transcription call's
    /// session, so its chunk results can't be consumed by a concurrent
    /// call sharing this pool. Call `unregister_session` when the call
    /// finishes (success, error, or timeout) to stop routing to it.
    pub async fn register_session(&self, session_id: impl Into<String>) -> mpsc::UnboundedReceiver<ChunkResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.session_routes.lock().await.insert(session_id.into(), tx);
        rx
    }

    pub async fn unregister_session(&self, session_id: &str) {
        self.session_routes.lock().await.remove(session_id);
    }

    /// Receive the next result for a session-scoped channel obtained
    /// from `register_session`, applying the same wait-timeout
    /// semantics as `recv_result`.
    pub async fn recv_from(rx: &mut mpsc::UnboundedReceiver<ChunkResult>, wait_timeout: Duration) -> anyhow::Result<ChunkResult> {
        match tokio::time::timeout(wait_timeout, rx.recv()).await {
            Ok(Some(result)) => Ok(result),
            Ok(None) => anyhow::bail!("worker pool result channel closed"),
            Err(_) => anyhow::bail!(crate::transcription::types::TranscriptionError::PoolSaturated(
                wait_timeout
            )),
        }
    }

    /// `submit(ChunkTask, submit_timeout)`: enqueues with bounded
    /// back-off retry on a full channel until `submit_timeout` elapses.
    pub async fn submit(&self, task: ChunkTask, submit_timeout: Duration) -> anyhow::Result<()> {
        let deadline = Instant::now() + submit_timeout;
        let mut backoff = Duration::from_millis(10);

        loop {
            match self.task_tx.try_send(TaskMessage::Task(task.clone())) {
                Ok(()) => {
                    self.stats.tasks_submitted.fetch_add(1, Ordering::SeqCst);
                    return Ok(());
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if Instant::now() >= deadline {
                        anyhow::bail!(crate::transcription::types::TranscriptionError::PoolSaturated(
                            submit_timeout
                        ));
                    }
                    tokio::time::sleep(backoff.min(deadline.saturating_duration_since(Instant::now())))
                        .await;
                    backoff = (backoff * 2).min(Duration::from_millis(200));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    anyhow::bail!("worker pool task channel is closed");
                }
            }
        }
    }

    /// `recv_result(wait_timeout) -> ChunkResult`: blocks up to
    /// `wait_timeout`; errors on timeout.
    pub async fn recv_result(&self, wait_timeout: Duration) -> anyhow::Result<ChunkResult> {
        let mut rx = self.result_rx.lock().await;
        match tokio::time::timeout(wait_timeout, rx.recv()).await {
            Ok(Some(result)) => Ok(result),
            Ok(None) => anyhow::bail!("worker pool result channel closed"),
            Err(_) => anyhow::bail!(crate::transcription::types::TranscriptionError::PoolSaturated(
                wait_timeout
            )),
        }
    }

    /// `stop()`: inject `W` sentinel tasks, wait up to `grace` for
    /// workers to exit, then forcibly terminate any laggards.
    pub async fn stop(mut self, grace: Duration) {
        for _ in 0..self.worker_count {
            let _ = self.task_tx.send(TaskMessage::Stop).await;
        }

        let deadline = tokio::time::sleep(grace);
        tokio::pin!(deadline);
        let mut remaining = std::mem::take(&mut self.worker_handles);
        let abort_handles = std::mem::take(&mut self.abort_handles);

        loop {
            if remaining.is_empty() {
                break;
            }
            tokio::select! {
                _ = &mut deadline => {
                    warn!(stragglers = remaining.len(), "forcibly aborting workers past grace period");
                    for abort_handle in abort_handles {
                        abort_handle.abort();
                    }
                    for handle in remaining {
                        handle.abort();
                    }
                    break;
                }
                result = futures::future::select_all(remaining.iter_mut().map(Box::pin)) => {
                    let (_, index, _) = result;
                    remaining.remove(index);
                }
            }
        }

        info!("worker pool drained");
    }
}

async fn worker_loop(
    worker_id: usize,
    backend: Arc<dyn AsrBackend>,
    task_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<TaskMessage>>>,
    result_tx: mpsc::UnboundedSender<ChunkResult>,
    session_routes: SessionRoutes,
    stats: Arc<PoolStats>,
) {
    info!(worker_id, "worker loading model");
    // Model load happens inside `backend` construction; reaching here is "Idle".
    info!(worker_id, "worker idle");

    loop {
        let message = {
            let mut rx = task_rx.lock().await;
            rx.recv().await
        };

        let task = match message {
            Some(TaskMessage::Task(task)) => task,
            Some(TaskMessage::Stop) | None => {
                info!(worker_id, "worker draining");
                break;
            }
        };

        let start = Instant::now();
        let outcome = process_task(&backend, &task).await;
        let processing_time = start.elapsed();

        match &outcome {
            ChunkOutcome::Success { .. } => {
                stats.tasks_completed.fetch_add(1, Ordering::SeqCst);
            }
            ChunkOutcome::Error { message } => {
                stats.tasks_errored.fetch_add(1, Ordering::SeqCst);
                error!(worker_id, chunk_index = task.chunk_index, %message, "chunk task failed");
            }
        }

        let result = ChunkResult {
            session_id: task.session_id,
            chunk_index: task.chunk_index,
            outcome,
            processing_time,
        };

        // Route to the call that registered this session, if any; falls
        // back to the pool-wide channel for callers that never register
        // (e.g. direct `submit`/`recv_result` use in tests).
        let route = session_routes.lock().await.get(&result.session_id).cloned();
        let sent = match route {
            Some(tx) => tx.send(result).is_ok(),
            None => result_tx.send(result).is_ok(),
        };
        if !sent {
            warn!(worker_id, "result channel closed, dropping result");
        }
    }

    stats.workers_alive.fetch_sub(1, Ordering::SeqCst);
    info!(worker_id, "worker exited");
}

async fn process_task(backend: &Arc<dyn AsrBackend>, task: &ChunkTask) -> ChunkOutcome {
    let samples = match read_wav_samples(&task.chunk_path) {
        Ok(samples) => samples,
        Err(e) => {
            return ChunkOutcome::Error {
                message: e.to_string(),
            }
        }
    };

    match backend
        .transcribe(&samples, task.language_hint.as_deref())
        .await
    {
        Ok(output) => {
            let segments = output
                .segments
                .into_iter()
                .map(|s| s.offset_by(task.start_offset_sec))
                .collect();
            ChunkOutcome::Success {
                segments,
                detected_language: output.detected_language,
            }
        }
        Err(e) => ChunkOutcome::Error {
            message: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests;
