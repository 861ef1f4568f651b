//! HTTP client for the three independently-deployed stage services
//! (download, normalize, transcribe) that C7 drives in sequence.
//! Grounded on `orchestrator/main.py`'s stage dispatch — it POSTs a
//! stage-specific request, gets back a `remote_job_id`, then polls a
//! status endpoint until the remote job reaches a terminal state.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteState {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePoll {
    pub state: RemoteState,
    pub progress: u8,
    pub error_message: Option<String>,
    /// Stage artifact reference, present once `state == Succeeded`
    /// (a downloaded-file ref, a normalized-file ref, or transcript JSON).
    pub artifact: Option<serde_json::Value>,
}

/// One of the three remote collaborators C7 sequences through.
#[async_trait]
pub trait StageClient: Send + Sync {
    /// Submit the stage-specific request; returns the remote job id.
    async fn submit(&self, request: serde_json::Value) -> Result<String>;

    /// One poll of the remote job's status.
    async fn poll(&self, remote_job_id: &str) -> Result<RemotePoll>;
}

pub struct HttpStageClient {
    client: reqwest::Client,
    base_url: String,
    submit_path: String,
    poll_path_template: String,
}

impl HttpStageClient {
    pub fn new(base_url: impl Into<String>, submit_path: impl Into<String>, poll_path_template: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
            submit_path: submit_path.into(),
            poll_path_template: poll_path_template.into(),
        }
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    remote_job_id: String,
}

#[async_trait]
impl StageClient for HttpStageClient {
    async fn submit(&self, request: serde_json::Value) -> Result<String> {
        let url = format!("{}{}", self.base_url, self.submit_path);
        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(AppError::fetch(format!(
                "stage submit to {url} returned HTTP {}",
                response.status()
            )));
        }
        let parsed: SubmitResponse = response.json().await?;
        Ok(parsed.remote_job_id)
    }

    async fn poll(&self, remote_job_id: &str) -> Result<RemotePoll> {
        let url = format!(
            "{}{}",
            self.base_url,
            self.poll_path_template.replace("{id}", remote_job_id)
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::fetch(format!(
                "stage poll to {url} returned HTTP {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

/// Exponential-then-capped backoff for stage polling: `p0 = 1s`,
/// multiplier 1.5, cap 10s (§4.7).
pub struct PollBackoff {
    next: Duration,
    cap: Duration,
    multiplier: f64,
}

impl PollBackoff {
    pub fn new() -> Self {
        Self {
            next: Duration::from_secs(1),
            cap: Duration::from_secs(10),
            multiplier: 1.5,
        }
    }

    pub fn current(&self) -> Duration {
        self.next
    }

    pub fn advance(&mut self) {
        let scaled = self.next.as_secs_f64() * self.multiplier;
        self.next = Duration::from_secs_f64(scaled).min(self.cap);
    }
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_at_ten_seconds() {
        let mut backoff = PollBackoff::new();
        assert_eq!(backoff.current(), Duration::from_secs(1));
        for _ in 0..20 {
            backoff.advance();
        }
        assert!(backoff.current() <= Duration::from_secs(10));
    }

    #[test]
    fn backoff_grows_monotonically_until_cap() {
        let mut backoff = PollBackoff::new();
        let mut previous = backoff.current();
        for _ in 0..5 {
            backoff.advance();
            assert!(backoff.current() >= previous);
            previous = backoff.current();
        }
    }
}
