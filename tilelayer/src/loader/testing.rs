//! Scripted [`TileFetch`] for loader and scheduler tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::fetch::{BoxFuture, FetchError, TileFetch};
use crate::tile::{EncodedImage, SourceKind, TileAddress, TileEncoding};

/// Deterministic image for an address, so tests can tell tiles apart.
pub(crate) fn image_for(address: &TileAddress) -> EncodedImage {
    EncodedImage::new(address.key().into_bytes(), TileEncoding::Png)
}

/// Mock fetcher: succeeds with [`image_for`] unless a source is scripted to fail.
///
/// With a gate, every fetch waits for one permit first, which lets a test
/// hold fetches open while it observes intermediate states.
#[derive(Clone, Default)]
pub(crate) struct MockTileFetch {
    failures: Arc<Mutex<HashMap<SourceKind, FetchError>>>,
    min_zoom: Arc<Mutex<HashMap<SourceKind, u8>>>,
    calls: Arc<Mutex<Vec<TileAddress>>>,
    held: Arc<Mutex<HashSet<TileAddress>>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockTileFetch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Holds every fetch until the returned semaphore gets a permit.
    pub(crate) fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let fetch = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (fetch, gate)
    }

    pub(crate) fn fail_source(&self, kind: SourceKind, error: FetchError) {
        self.failures.lock().insert(kind, error);
    }

    /// Fetches of `address` never complete.
    pub(crate) fn hold(&self, address: TileAddress) {
        self.held.lock().insert(address);
    }

    pub(crate) fn set_min_zoom(&self, kind: SourceKind, zoom: u8) {
        self.min_zoom.lock().insert(kind, zoom);
    }

    pub(crate) fn calls(&self) -> Vec<TileAddress> {
        self.calls.lock().clone()
    }

    pub(crate) fn calls_for(&self, address: &TileAddress) -> usize {
        self.calls.lock().iter().filter(|a| *a == address).count()
    }
}

impl TileFetch for MockTileFetch {
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
            let failure = self.failures.lock().get(&address.source()).cloned();
            match failure {
                Some(error) => Err(error),
                None => Ok(image_for(&address)),
            }
        })
    }

    fn min_zoom(&self, kind: SourceKind) -> u8 {
        self.min_zoom.lock().get(&kind).copied().unwrap_or(0)
    }
}
