use crate::config::ScraperConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// One network round-trip. No retries here; that is the `Fetcher`'s job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpTransport {
    inner: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()
            .map_err(|e| Error::Transport {
                url: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { inner })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        debug!("GET {}", url);

        let transport_err = |e: reqwest::Error| Error::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let resp = self.inner.get(url).send().await.map_err(transport_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http { url: url.to_string(), status: status.as_u16() });
        }

        // the response (and its connection) is released when `resp` is consumed or dropped
        let body = resp.bytes().await.map_err(transport_err)?;
        Ok(body.to_vec())
    }
}
