//! HTTP client abstraction for testability
//!
//! The transport does not interpret status codes: it hands back the status
//! and body, and the fetcher decides what is retryable, rate-limited or
//! terminal. Only failures to get any response at all are errors here.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::types::ProviderError;

/// User agent sent with every tile request.
pub const DEFAULT_USER_AGENT: &str = concat!("tilelayer/", env!("CARGO_PKG_VERSION"));

/// A complete HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to obtain a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request or body read timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// No connection could be established
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Any other request or body error
    #[error("Request failed: {0}")]
    Other(String),
}

/// Trait for asynchronous HTTP client operations.
///
/// Uses non-blocking I/O via async/await. Allows the fetcher to be tested
/// against a scripted client.
pub trait AsyncHttpClient: Send + Sync + 'static {
    /// Performs an async HTTP GET request.
    fn get(&self, url: &str) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// Async HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct AsyncReqwestClient {
    client: reqwest::Client,
}

impl AsyncReqwestClient {
    /// Creates a new AsyncReqwestClient with default configuration.
    ///
    /// The per-attempt deadline is enforced by the fetcher; the client
    /// timeout here is only a backstop.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Creates a new AsyncReqwestClient with custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            // Many small parallel requests to the same few hosts
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ProviderError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl AsyncHttpClient for AsyncReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        trace!(url = url, "HTTP GET request starting");

        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(
                url = url,
                error = %e,
                is_connect = e.is_connect(),
                is_timeout = e.is_timeout(),
                "HTTP request failed"
            );
            classify(e)
        })?;

        let status = response.status().as_u16();
        debug!(url = url, status = status, "HTTP response received");

        let body = response.bytes().await.map_err(classify)?;
        Ok(HttpResponse { status, body })
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    /// Mock HTTP client that replays scripted responses in order.
    ///
    /// Once the script is exhausted the last response repeats. Clones share
    /// the script and counters.
    #[derive(Clone)]
    pub struct MockAsyncHttpClient {
        script: Arc<Mutex<VecDeque<Result<HttpResponse, TransportError>>>>,
        last: Arc<Mutex<Result<HttpResponse, TransportError>>>,
        calls: Arc<AtomicUsize>,
        urls: Arc<Mutex<Vec<String>>>,
        delay: Option<Duration>,
    }

    impl MockAsyncHttpClient {
        pub fn new(script: Vec<Result<HttpResponse, TransportError>>) -> Self {
            let last = script
                .last()
                .cloned()
                .unwrap_or_else(|| Err(TransportError::Other("empty script".into())));
            Self {
                script: Arc::new(Mutex::new(script.into())),
                last: Arc::new(Mutex::new(last)),
                calls: Arc::new(AtomicUsize::new(0)),
                urls: Arc::new(Mutex::new(Vec::new())),
                delay: None,
            }
        }

        /// Always answers 200 with `body`.
        pub fn ok(body: impl Into<Bytes>) -> Self {
            Self::new(vec![Ok(HttpResponse::new(200, body))])
        }

        /// Always answers with `status` and an empty body.
        pub fn status(status: u16) -> Self {
            Self::new(vec![Ok(HttpResponse::new(status, Bytes::new()))])
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn urls(&self) -> Vec<String> {
            self.urls.lock().clone()
        }
    }

    impl AsyncHttpClient for MockAsyncHttpClient {
        async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().push(url.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.script.lock().pop_front();
            match next {
                Some(response) => {
                    *self.last.lock() = response.clone();
                    response
                }
                None => self.last.lock().clone(),
            }
        }
    }

    #[tokio::test]
    async fn test_mock_replays_script_then_repeats() {
        let mock = MockAsyncHttpClient::new(vec![
            Ok(HttpResponse::new(503, Bytes::new())),
            Ok(HttpResponse::new(200, vec![1, 2, 3])),
        ]);

        assert_eq!(mock.get("a").await.unwrap().status, 503);
        assert_eq!(mock.get("b").await.unwrap().status, 200);
        assert_eq!(mock.get("c").await.unwrap().body.as_ref(), &[1, 2, 3]);
        assert_eq!(mock.calls(), 3);
        assert_eq!(mock.urls(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_response_success_range() {
        assert!(HttpResponse::new(200, Bytes::new()).is_success());
        assert!(HttpResponse::new(204, Bytes::new()).is_success());
        assert!(!HttpResponse::new(304, Bytes::new()).is_success());
        assert!(!HttpResponse::new(429, Bytes::new()).is_success());
    }

    #[test]
    fn test_reqwest_client_builds() {
        assert!(AsyncReqwestClient::new().is_ok());
    }
}
