//! Artifact downloading and extraction
//!
//! Downloads the archive published by the source controller, checks it
//! against the advertised digest and unpacks it into a caller-owned
//! directory.

use std::borrow::Cow;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::digest::Digest;
use super::retry::{BackoffPolicy, RetryPolicy};
use super::untar::{UntarSummary, untar};
use crate::config::{FetchConfig, SizeLimit};
use crate::error::FetchError;

/// Downloads, verifies and extracts artifact archives
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
    max_download_size: SizeLimit,
    max_untar_size: SizeLimit,
    hostname_override: Option<String>,
}

impl ArchiveFetcher {
    /// Create a fetcher from the `[fetch]` configuration section
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("revwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            retry: RetryPolicy {
                max_retries: config.retries,
                base_backoff: Duration::from_millis(config.retry_backoff_ms),
            },
            max_download_size: config.max_download_size,
            max_untar_size: config.max_untar_size,
            hostname_override: config.hostname_override.clone(),
        })
    }

    /// Download `url`, verify it against `digest` and extract it into `dest`.
    ///
    /// Nothing is written to `dest` unless the digest matches and every
    /// archive entry passes validation. Only transport failures are retried.
    pub async fn fetch(
        &self,
        url: &str,
        digest: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<UntarSummary, FetchError> {
        let expected: Digest = digest.parse()?;
        let url = self.resolve_url(url)?;

        let payload = self.download_with_retry(&url, cancel).await?;
        expected.verify(&payload)?;
        debug!(url = %url, digest = %expected, bytes = payload.len(), "artifact digest verified");

        let dest_owned = dest.to_path_buf();
        let limit = self.max_untar_size;
        let untar_cancel = cancel.clone();
        let summary = tokio::task::spawn_blocking(move || {
            untar(&payload, &dest_owned, limit, &untar_cancel)
        })
        .await
        .map_err(|e| FetchError::Archive(std::io::Error::other(e)))??;

        info!(
            url = %url,
            files = summary.files,
            bytes = summary.bytes,
            dest = %dest.display(),
            "artifact extracted"
        );
        Ok(summary)
    }

    /// Apply the hostname override, if any.
    pub fn resolve_url(&self, raw: &str) -> Result<Url, FetchError> {
        let invalid = |reason: String| FetchError::InvalidUrl {
            url: raw.to_string(),
            reason,
        };

        let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }

        if let Some(host_override) = &self.hostname_override {
            let (host, port) = split_override(host_override);
            let port = port
                .map(str::parse::<u16>)
                .transpose()
                .map_err(|_| invalid(format!("invalid override port in '{}'", host_override)))?;
            url.set_host(Some(host.as_ref()))
                .map_err(|e| invalid(format!("invalid override host '{}': {}", host, e)))?;
            url.set_port(port)
                .map_err(|_| invalid(format!("cannot set port on '{}'", raw)))?;
        }

        Ok(url)
    }

    async fn download_with_retry(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = self.download(url) => result,
            };

            match result {
                Ok(payload) => return Ok(payload),
                Err(err) if err.is_transient() && self.retry.allows_retry(attempt + 1) => {
                    attempt += 1;
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        url = %url,
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "artifact download failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One download attempt, bounded by the download size limit
    async fn download(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let transport = |source: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let too_large = |limit: u64| FetchError::TooLarge {
            url: url.to_string(),
            limit,
        };

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let (Some(length), Some(limit)) =
            (response.content_length(), self.max_download_size.bytes())
            && length > limit
        {
            return Err(too_large(limit));
        }

        let mut payload = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            payload.extend_from_slice(&chunk);
            if !self.max_download_size.allows(payload.len() as u64) {
                return Err(too_large(self.max_download_size.bytes().unwrap_or(u64::MAX)));
            }
        }

        Ok(payload)
    }
}

/// Split an override into host and optional port.
///
/// Accepts `host`, `host:port`, `[v6]`, `[v6]:port` and a bare IPv6 address,
/// which is bracketed for `Url::set_host`.
fn split_override(value: &str) -> (Cow<'_, str>, Option<&str>) {
    if value.starts_with('[') {
        match value.rsplit_once("]:") {
            Some((host, port)) => (Cow::Owned(format!("{}]", host)), Some(port)),
            None => (Cow::Borrowed(value), None),
        }
    } else if value.matches(':').count() > 1 {
        (Cow::Owned(format!("[{}]", value)), None)
    } else {
        match value.rsplit_once(':') {
            Some((host, port)) => (Cow::Borrowed(host), Some(port)),
            None => (Cow::Borrowed(value), None),
        }
    }
}
