//! Polite HTTP fetching shared by all source adapters.
//!
//! One [`HttpFetcher`] is built per run and handed to every adapter. It
//! enforces three things: a global cap on in-flight requests (semaphore), a
//! minimum delay between consecutive requests (sources are third-party sites
//! we do not want to hammer), and bounded retry with jittered backoff on
//! transient failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use defiguard_common::IngestError;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; DefiGuardBot/1.0)";

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a URL and return the response body as text.
    async fn fetch(&self, url: &str) -> Result<String, IngestError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    min_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpFetcher {
    pub fn new(
        permits: Arc<Semaphore>,
        min_delay: Duration,
        timeout: Duration,
    ) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            permits,
            min_delay,
            last_request: Mutex::new(None),
        })
    }

    /// Wait until at least `min_delay` has passed since the previous request.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch_once(&self, url: &str) -> Result<String, IngestError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::SourceUnavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::SourceUnavailable(format!(
                "{url}: HTTP {status}"
            )));
        }

        response
            .text()
            .await
            .map_err(|e| IngestError::SourceUnavailable(format!("{url}: body read: {e}")))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, IngestError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| IngestError::SourceUnavailable("fetch pool closed".to_string()))?;

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let backoff = BACKOFF_BASE_MS * 2u64.pow(attempt - 1);
                let jitter = rand::rng().random_range(0..backoff / 2 + 1);
                tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
            }

            self.pace().await;
            match self.fetch_once(url).await {
                Ok(body) => {
                    debug!(url, bytes = body.len(), "Fetched");
                    return Ok(body);
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "Fetch attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| IngestError::SourceUnavailable(format!("{url}: no attempts"))))
    }
}
