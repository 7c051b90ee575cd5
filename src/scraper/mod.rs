pub mod http_client;
pub mod parsers;

use crate::error::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::warn;

pub use self::http_client::{HttpTransport, Transport};

// ── Fetcher ───────────────────────────────────────────────────────────────────

/// Retrieves leaderboard documents with bounded, immediate retry.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    max_retries: u32,
}

impl Fetcher {
    /// `max_retries` is the total number of attempts; at least one is always made.
    pub fn new(transport: Arc<dyn Transport>, max_retries: u32) -> Self {
        Self { transport, max_retries: max_retries.max(1) }
    }

    /// Download `url` and decode it as JSON.
    ///
    /// Transport failures are retried back to back; a body that is not JSON
    /// is returned as `Error::Parse` straight away. When every attempt fails
    /// the error of the last attempt is returned.
    pub async fn fetch(&self, url: &str) -> Result<Value> {
        let strategy = FixedInterval::from_millis(0).take(self.max_retries as usize - 1);
        let mut attempt = 0u32;

        let body = RetryIf::spawn(
            strategy,
            || self.transport.get(url),
            |e: &Error| {
                attempt += 1;
                if !e.is_retryable() {
                    return false;
                }
                if attempt < self.max_retries {
                    warn!("{} (attempt {}/{}), retrying", e, attempt, self.max_retries);
                }
                true
            },
        )
        .await?;

        serde_json::from_slice(&body).map_err(|e| Error::parse(format!("{url}: {e}")))
    }
}
