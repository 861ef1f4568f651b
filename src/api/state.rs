//! Shared application state threaded through both route groups, mirroring
//! `other_examples/...porua__server-src-server.rs`'s `AppState` (a plain
//! `Clone` struct of `Arc`-wrapped components).

use crate::config::AppConfig;
use crate::orchestrator::Orchestrator;
use crate::transcription::TranscriptionEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: Arc<TranscriptionEngine>,
    pub orchestrator: Arc<Orchestrator>,
}
