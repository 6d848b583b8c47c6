//! Tile downloading with retry, timeout and format fallback.
//!
//! [`TileFetcher`] turns a [`TileAddress`] into an [`EncodedImage`] by
//! asking the [`ProviderRegistry`] for a URL and downloading it through an
//! injected [`AsyncHttpClient`]. It never touches the cache; that is the
//! loader's job.
//!
//! # Error classification
//!
//! | Outcome | Error | Retried |
//! |---|---|---|
//! | timeout, connect failure, 5xx | [`FetchError::Transient`] | yes |
//! | 403, 429 | [`FetchError::RateLimited`] | no |
//! | other 4xx/3xx | [`FetchError::Http`] | no |
//! | empty or unrecognised body | [`FetchError::Decode`] | no |

mod error;
mod format;
mod policy;

pub use error::FetchError;
pub use format::{transcode, FormatSupport};
pub use policy::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY_SECS,
};

#[cfg(test)]
pub(crate) use format::tests::{sample_jpeg, sample_png};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::provider::{AsyncHttpClient, ProviderRegistry};
use crate::tile::{EncodedImage, SourceKind, TileAddress, TileEncoding};

/// Boxed future type for dyn-compatible async methods.
pub use futures::future::BoxFuture;

/// Default per-attempt timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default JPEG quality when transcoding.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Anything that can produce full-resolution tiles.
///
/// The loader depends on this rather than on [`TileFetcher`] directly so the
/// HTTP stack can be swapped out in tests. Uses boxed futures so it can be
/// held as `Arc<dyn TileFetch>`.
pub trait TileFetch: Send + Sync {
    /// Downloads one tile.
    fn fetch(&self, address: TileAddress) -> BoxFuture<'_, Result<EncodedImage, FetchError>>;

    /// Lowest zoom level the source for `kind` serves.
    fn min_zoom(&self, _kind: SourceKind) -> u8 {
        0
    }
}

/// Fetcher configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FetcherConfig {
    pub retry: RetryPolicy,
    pub attempt_timeout: Duration,
    /// Encodings the consumer can display, probed once at startup
    pub format_support: FormatSupport,
    /// Encoding unsupported bodies are converted to
    pub fallback_encoding: TileEncoding,
    pub jpeg_quality: u8,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            format_support: FormatSupport::probe(),
            fallback_encoding: TileEncoding::Png,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl FetcherConfig {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_format_support(mut self, support: FormatSupport) -> Self {
        self.format_support = support;
        self
    }

    pub fn with_fallback_encoding(mut self, encoding: TileEncoding) -> Self {
        self.fallback_encoding = encoding;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }
}

/// Snapshot of fetcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetcherStats {
    /// HTTP attempts made, retries included
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    /// Bodies converted to the fallback encoding
    pub transcoded: u64,
}

#[derive(Debug, Default)]
struct FetcherCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    transcoded: AtomicU64,
}

/// Downloads tiles through an HTTP transport.
pub struct TileFetcher<C: AsyncHttpClient> {
    client: C,
    registry: Arc<ProviderRegistry>,
    config: FetcherConfig,
    counters: FetcherCounters,
}

impl<C: AsyncHttpClient> TileFetcher<C> {
    pub fn new(client: C, registry: Arc<ProviderRegistry>, config: FetcherConfig) -> Self {
        Self {
            client,
            registry,
            config,
            counters: FetcherCounters::default(),
        }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub fn stats(&self) -> FetcherStats {
        FetcherStats {
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            successes: self.counters.successes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            transcoded: self.counters.transcoded.load(Ordering::Relaxed),
        }
    }

    /// Downloads `address`, retrying transient failures per the retry policy.
    pub async fn fetch_tile(&self, address: TileAddress) -> Result<EncodedImage, FetchError> {
        let result = self.download(address).await;
        match &result {
            Ok(_) => {
                self.counters.successes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                if e.is_rate_limited() {
                    warn!(tile = %address, error = %e, "Tile source rate limited");
                } else {
                    debug!(tile = %address, error = %e, "Tile fetch failed");
                }
            }
        }
        result
    }

    async fn download(&self, address: TileAddress) -> Result<EncodedImage, FetchError> {
        let url = self
            .registry
            .get(address.source())
            .and_then(|provider| provider.url_for(&address))
            .map_err(|e| FetchError::InvalidAddress(format!("{}: {}", address, e)))?;

        let mut attempt = 1;
        loop {
            match self.attempt(&url, address.source()).await {
                Ok(body) => return self.finish(address, body).await,
                Err(e) if e.is_retryable() => match self.config.retry.delay_for_attempt(attempt) {
                    Some(delay) => {
                        debug!(
                            tile = %address,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying tile download"
                        );
                        self.counters.retries.fetch_add(1, Ordering::Relaxed);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// One HTTP round trip, bounded by the attempt timeout.
    async fn attempt(&self, url: &str, kind: SourceKind) -> Result<Bytes, FetchError> {
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);

        let response = tokio::time::timeout(self.config.attempt_timeout, self.client.get(url))
            .await
            .map_err(|_| {
                FetchError::Transient(format!(
                    "no response within {}ms",
                    self.config.attempt_timeout.as_millis()
                ))
            })?
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        match FetchError::from_status(kind, response.status) {
            Some(err) => Err(err),
            None => Ok(response.body),
        }
    }

    /// Validates the body and converts it if the consumer can't display it.
    async fn finish(&self, address: TileAddress, body: Bytes) -> Result<EncodedImage, FetchError> {
        if body.is_empty() {
            return Err(FetchError::Decode("empty body".to_string()));
        }
        let image = EncodedImage::sniffed(body)
            .ok_or_else(|| FetchError::Decode("unrecognised image format".to_string()))?;

        if self.config.format_support.supports(image.encoding()) {
            return Ok(image);
        }

        let target = self.config.fallback_encoding;
        let quality = self.config.jpeg_quality;
        debug!(
            tile = %address,
            from = %image.encoding(),
            to = %target,
            "Transcoding unsupported tile encoding"
        );
        let converted = tokio::task::spawn_blocking(move || transcode(&image, target, quality))
            .await
            .map_err(|e| FetchError::Decode(format!("transcode task failed: {}", e)))??;
        self.counters.transcoded.fetch_add(1, Ordering::Relaxed);
        Ok(converted)
    }
}

impl<C: AsyncHttpClient> TileFetch for TileFetcher<C> {
    fn fetch(&self, address: TileAddress) -> BoxFuture<'_, Result<EncodedImage, FetchError>> {
        Box::pin(self.fetch_tile(address))
    }

    fn min_zoom(&self, kind: SourceKind) -> u8 {
        self.registry.min_zoom(kind)
    }
}
