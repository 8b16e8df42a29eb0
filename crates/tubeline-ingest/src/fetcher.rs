//! Feed fetcher
//!
//! One HTTP GET per attempt with a fixed delay between attempts. The payload
//! is staged only after a successful attempt, so an exhausted fetch leaves
//! no artifact behind.

use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::{info, instrument, warn};
use tubeline_common::types::{ArtifactKey, CycleTimestamp};

use crate::config::PipelineConfig;
use crate::error::{AttemptError, FetchError, Result};
use crate::storage::ArtifactStore;

const USER_AGENT: &str = concat!("tubeline/", env!("CARGO_PKG_VERSION"));

/// Fetcher configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub url: String,
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub backoff: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

impl FetchConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            url: config.feed_url.clone(),
            max_attempts: config.fetch_attempts,
            backoff: config.fetch_backoff(),
            timeout: config.fetch_timeout(),
        }
    }
}

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> std::result::Result<Self, FetchError> {
        if config.max_attempts == 0 {
            return Err(FetchError::NoAttempts);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client, config })
    }

    /// Fetch the feed, retrying up to `max_attempts` times.
    #[instrument(skip(self), fields(url = %self.config.url, max_attempts = self.config.max_attempts))]
    pub async fn fetch(&self) -> std::result::Result<Vec<u8>, FetchError> {
        match retry_fixed(self.config.max_attempts, self.config.backoff, || self.attempt()).await {
            Ok((attempt, payload)) => {
                info!(attempt, bytes = payload.len(), "Feed fetched");
                Ok(payload)
            }
            Err((attempts, last)) => Err(FetchError::Exhausted {
                url: self.config.url.clone(),
                attempts,
                last,
            }),
        }
    }

    /// Fetch the feed and write it to `<staging_dir>/input_<cycle>.json`.
    #[instrument(skip(self, store), fields(cycle = %cycle))]
    pub async fn fetch_to_staging(
        &self,
        store: &dyn ArtifactStore,
        staging_dir: &str,
        cycle: CycleTimestamp,
    ) -> Result<ArtifactKey> {
        let key = ArtifactKey::join(staging_dir, &cycle.staging_name())?;
        let payload = self.fetch().await?;

        store.write(&key, payload).await?;

        info!(artifact = %key, "Payload staged");
        Ok(key)
    }

    async fn attempt(&self) -> std::result::Result<Vec<u8>, AttemptError> {
        let response = self.client.get(&self.config.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Run `op` until it succeeds or `max_attempts` attempts have failed.
///
/// Sleeps `backoff` between attempts, never after the last one. Returns the
/// number of the successful attempt, or the attempt count and last error.
async fn retry_fixed<T, F, Fut>(
    max_attempts: u32,
    backoff: Duration,
    mut op: F,
) -> std::result::Result<(u32, T), (u32, AttemptError)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        let last = match op().await {
            Ok(value) => return Ok((attempt, value)),
            Err(e) => e,
        };

        warn!(attempt, max_attempts, error = %last, "Fetch attempt failed");

        if attempt >= max_attempts {
            return Err((attempt, last));
        }

        if !backoff.is_zero() {
            info!(backoff_secs = backoff.as_secs_f64(), "Retrying fetch");
            tokio::time::sleep(backoff).await;
        }
    }
}
