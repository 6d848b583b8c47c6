//! Shared doubles for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use tilelayer::fetch::{BoxFuture, FetchError, TileFetch};
use tilelayer::provider::{AsyncHttpClient, HttpResponse, TransportError};
use tilelayer::{EncodedImage, SourceKind, TileAddress, TileEncoding};

/// PNG signature followed by a payload; enough for format sniffing.
pub fn png_bytes(payload: &[u8]) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(payload);
    bytes
}

/// Distinct image per address.
pub fn image_for(address: &TileAddress) -> EncodedImage {
    EncodedImage::new(png_bytes(address.key().as_bytes()), TileEncoding::Png)
}

/// Tile source double with per-source failures, an optional gate and a call log.
#[derive(Clone, Default)]
pub struct ScriptedFetch {
    failures: Arc<Mutex<HashMap<SourceKind, FetchError>>>,
    calls: Arc<Mutex<Vec<TileAddress>>>,
    held: Arc<Mutex<HashSet<TileAddress>>>,
    gate: Option<Arc<Semaphore>>,
    delay: Option<Duration>,
}

impl ScriptedFetch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch waits for a permit on the returned semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let fetch = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (fetch, gate)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_source(&self, kind: SourceKind, error: FetchError) {
        self.failures.lock().insert(kind, error);
    }

    /// Fetches of `address` never complete.
    pub fn hold(&self, address: TileAddress) {
        self.held.lock().insert(address);
    }

    pub fn calls(&self) -> Vec<TileAddress> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, address: &TileAddress) -> usize {
        self.calls.lock().iter().filter(|a| *a == address).count()
    }
}

impl TileFetch for ScriptedFetch {
    fn fetch(&self, address: TileAddress) -> BoxFuture<'_, Result<EncodedImage, FetchError>> {
        Box::pin(async move {
            self.calls.lock().push(address);
            let held = self.held.lock().contains(&address);
            if held {
                std::future::pending::<()>().await;
            }
            if let Some(gate) = &self.gate {
                gate.acquire()
                    .await
                    .map_err(|_| FetchError::Cancelled)?
                    .forget();
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let failure = self.failures.lock().get(&address.source()).cloned();
            match failure {
                Some(error) => Err(error),
                None => Ok(image_for(&address)),
            }
        })
    }
}

/// HTTP transport answering by URL substring; unmatched URLs get 404.
#[derive(Clone, Default)]
pub struct RoutedHttp {
    routes: Arc<Mutex<Vec<(String, u16)>>>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl RoutedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, needle: &str, status: u16) -> Self {
        self.routes.lock().push((needle.to_string(), status));
        self
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.urls.lock().iter().filter(|url| url.contains(needle)).count()
    }
}

impl AsyncHttpClient for RoutedHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        self.urls.lock().push(url.to_string());
        let status = self
            .routes
            .lock()
            .iter()
            .find(|(needle, _)| url.contains(needle.as_str()))
            .map_or(404, |(_, status)| *status);
        let body = if status == 200 {
            png_bytes(url.as_bytes())
        } else {
            Vec::new()
        };
        Ok(HttpResponse::new(status, body))
    }
}

/// Polls `check` until it holds, panicking after five seconds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}
