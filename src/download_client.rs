use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AirspaceError;

/// Country datasets are large and some mirrors are slow; allow two minutes.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);
const RETRY_ATTEMPTS: u32 = 3;

/// Render-side progress callback, called with `downloaded / content_length`.
pub type ProgressFn = dyn Fn(f32) + Send + Sync;

/// A complete country dataset as fetched, with its caching validators.
pub struct CountryDownload {
    pub bytes: Vec<u8>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// HTTP client for per-country airspace datasets.
pub struct AirspaceDataClient {
    client: Client,
    base_url: String,
    offline: AtomicBool,
}

impl AirspaceDataClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            offline: AtomicBool::new(false),
        }
    }

    fn country_url(&self, code: &str) -> String {
        format!("{}/{}_asp.geojson", self.base_url, code.to_lowercase())
    }

    /// True after a download failed on transport errors through all retries.
    /// Cleared by the next successful request; callers use it to show a
    /// degraded-connectivity UI.
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Relaxed)
    }

    /// Download one country dataset with streaming progress, retrying
    /// transient network failures with exponential backoff.
    pub async fn fetch_country(
        &self,
        code: &str,
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<CountryDownload> {
        let url = self.country_url(code);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(&url, progress, cancel).await {
                Ok(download) => {
                    self.offline.store(false, Ordering::Relaxed);
                    return Ok(download);
                }
                Err(err) if AirspaceError::is_cancellation(&err) => return Err(err),
                Err(err) if AirspaceError::is_network(&err) && attempt < RETRY_ATTEMPTS => {
                    let delay = Duration::from_secs(1u64 << (attempt - 1));
                    warn!(
                        %url,
                        attempt,
                        delay_s = delay.as_secs(),
                        error = %err,
                        "download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if AirspaceError::is_network(&err) {
                        self.offline.store(true, Ordering::Relaxed);
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn fetch_once(
        &self,
        url: &str,
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<CountryDownload> {
        if cancel.is_cancelled() {
            return Err(AirspaceError::Cancelled.into());
        }
        let response = self
            .client
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|err| AirspaceError::Network(format!("GET {url}: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let err = if status.is_server_error() {
                AirspaceError::Network(format!("GET {url}: status {status}"))
            } else {
                AirspaceError::Protocol(format!("GET {url}: status {status}"))
            };
            return Err(err.into());
        }

        let etag = header_string(&response, reqwest::header::ETAG);
        let last_modified = header_string(&response, reqwest::header::LAST_MODIFIED);
        let total = response.content_length();

        let mut bytes: Vec<u8> = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(AirspaceError::Cancelled.into());
            }
            let chunk =
                chunk.map_err(|err| AirspaceError::Network(format!("read body {url}: {err}")))?;
            bytes.extend_from_slice(&chunk);
            if let (Some(cb), Some(total)) = (progress, total) {
                if total > 0 {
                    cb((bytes.len() as f64 / total as f64) as f32);
                }
            }
        }

        debug!(%url, bytes = bytes.len(), "download complete");
        Ok(CountryDownload {
            bytes,
            etag,
            last_modified,
        })
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_urls_are_lowercased() {
        let client = AirspaceDataClient::new("https://example.com/data/");
        assert_eq!(
            client.country_url("CH"),
            "https://example.com/data/ch_asp.geojson"
        );
    }

    #[test]
    fn offline_flag_starts_clear() {
        let client = AirspaceDataClient::new("https://example.com");
        assert!(!client.is_offline());
    }
}
