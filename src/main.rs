//! Binary entry point: loads configuration, brings up the job store, the
//! transcription engine's worker pool, then the HTTP server, in the
//! startup order described in spec §9 — shutdown runs in reverse.

use std::sync::Arc;
use std::time::Duration;
use transcribe_engine::api::{build_router, AppState};
use transcribe_engine::config::AppConfig;
use transcribe_engine::orchestrator::{JobStore, Orchestrator};
use transcribe_engine::scheduler::CleanupScheduler;
use transcribe_engine::transcription::TranscriptionEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        bind_addr = %config.app.bind_addr,
        whisper_model = %config.whisper.model,
        "starting transcribe-engine"
    );

    if config.storage.cleanup_on_startup {
        if let Err(e) = tokio::fs::remove_dir_all(&config.storage.temp_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "failed to clear temp dir on startup");
            }
        }
    }
    tokio::fs::create_dir_all(&config.storage.temp_dir).await?;

    let max_temp_age = Duration::from_secs(config.storage.max_temp_age_hours * 3600);
    match transcribe_engine::transcription::sweep_orphaned_sessions(&config.storage.temp_dir, max_temp_age).await {
        Ok(removed) if removed > 0 => tracing::info!(removed, "swept orphaned session directories"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "failed to sweep orphaned session directories"),
    }

    // Job store first: the orchestrator must be able to persist jobs
    // before it accepts any `/process` request.
    let orchestrator = Arc::new(Orchestrator::start(&config).await?);

    // Cache and worker pool next: the transcription engine is the
    // heavier of the two to bring up (spawns C2's worker threads).
    let engine = Arc::new(TranscriptionEngine::start(&config).await?);

    let store_dyn: Arc<dyn JobStore> = orchestrator.store.clone();
    let mut cleanup_scheduler =
        CleanupScheduler::new(engine.cache.clone(), store_dyn, config.jobs.ttl_hours as i64).await?;
    cleanup_scheduler.start().await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        engine: engine.clone(),
        orchestrator,
    };
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.app.bind_addr).await?;
    tracing::info!(addr = %config.app.bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("http server stopped, shutting down worker pool");
    if let Err(e) = cleanup_scheduler.stop().await {
        tracing::warn!(error = %e, "failed to stop cleanup scheduler cleanly");
    }
    match Arc::try_unwrap(engine) {
        Ok(engine) => engine.shutdown(Duration::from_secs(10)).await,
        Err(_) => tracing::warn!("transcription engine still referenced at shutdown"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
