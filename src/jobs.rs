//! Background job client
//!
//! Publishes events to a background-job service over HTTP. Delivery failures
//! are retried with exponential backoff and never reach the scan response.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::config::JobsConfig;
use crate::error::truncate;

/// Event emitted after a successful scan
pub const RECEIPT_SCANNED: &str = "receipt/scanned";

/// Retry policy for event delivery
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (0-indexed): 1s, 2s, 4s, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Failed to send event: {0}")]
    Transport(String),

    #[error("Event rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Serialize)]
pub struct JobEvent<T: Serialize> {
    pub id: String,
    pub name: String,
    pub data: T,
    /// Milliseconds since the Unix epoch
    pub ts: i64,
}

#[derive(Clone)]
pub struct JobClient {
    client: reqwest::Client,
    app_id: String,
    event_url: String,
    signing_key: Option<String>,
    retry: RetryPolicy,
}

impl JobClient {
    pub fn new(config: &JobsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            app_id: config.app_id.clone(),
            event_url: config.event_url.clone(),
            signing_key: config.signing_key.clone(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Send one event, retrying per the policy. Returns the event id.
    pub async fn send<T: Serialize>(&self, name: &str, data: T) -> Result<String, JobError> {
        let event = JobEvent {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            data,
            ts: Utc::now().timestamp_millis(),
        };

        let mut attempt = 0;
        loop {
            match self.post(&event).await {
                Ok(()) => {
                    tracing::debug!(event_id = %event.id, name, app_id = %self.app_id, "Event sent");
                    return Ok(event.id);
                }
                Err(e) if attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        event_id = %event.id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Event delivery failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post<T: Serialize>(&self, event: &JobEvent<T>) -> Result<(), JobError> {
        let mut request = self
            .client
            .post(&self.event_url)
            .header("x-app-id", &self.app_id)
            .json(event);

        if let Some(key) = &self.signing_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| JobError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(JobError::Rejected {
            status: status.as_u16(),
            body: truncate(&body, 200).to_string(),
        })
    }
}
