//! Progressive tile loading.
//!
//! [`ProgressiveTileLoader::request`] starts a per-request pump task and
//! hands back a [`TileLoadHandle`] whose channel yields the request's
//! [`TileLoadState`]s:
//!
//! ```text
//!            ┌─► full resolution: cache ─miss─► fetch ─► cache put ─► HighRes / Failed
//! Loading ───┤        (coalesced per address, bounded by a semaphore)
//!            └─► ancestor at zoom - k, cache only ─hit─► LowRes
//! ```
//!
//! Both branches run concurrently. The low-resolution branch only counts
//! while the full fetch is still pending; once the full result is in, the
//! request is finished.
//!
//! # Failure reporting
//!
//! | Full fetch result | LowRes shown | Emitted |
//! |---|---|---|
//! | success | either | `HighRes` |
//! | rate limited | either | `Failed(RateLimited)` |
//! | other error | no | `Failed(error)` |
//! | other error | yes | nothing; the low-resolution tile stays |
//! | cancelled | either | nothing |

mod coalesce;
mod state;
#[cfg(test)]
pub(crate) mod testing;

pub use coalesce::{CoalescerStats, FetchOutcome, Registration, RequestCoalescer};
pub use state::{StateSequence, TileLoadState};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, trace};

use crate::cache::TileCache;
use crate::fetch::{FetchError, TileFetch};
use crate::tile::{AncestorRegion, EncodedImage, TileAddress};

/// Default number of zoom levels between a tile and its placeholder.
pub const DEFAULT_LOW_RES_ZOOM_OFFSET: u8 = 2;

/// Default cap on concurrent network fetches.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// A request emits at most three states.
const UPDATE_CAPACITY: usize = 4;

/// Loader configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Zoom levels to walk up for the placeholder tile (0 disables it)
    pub low_res_zoom_offset: u8,
    pub max_concurrent_fetches: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            low_res_zoom_offset: DEFAULT_LOW_RES_ZOOM_OFFSET,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

impl LoaderConfig {
    pub fn with_low_res_zoom_offset(mut self, offset: u8) -> Self {
        self.low_res_zoom_offset = offset;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }
}

/// Loader counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    pub requests: u64,
    /// Requests that joined an already running fetch
    pub coalesced: u64,
    /// Requests that ran the full-resolution path themselves
    pub fetches_started: u64,
    pub cancelled: u64,
    pub low_res_served: u64,
    pub in_flight: usize,
}

/// Receiving end of one tile request.
pub struct TileLoadHandle {
    pub address: TileAddress,
    pub updates: mpsc::Receiver<TileLoadState>,
}

impl TileLoadHandle {
    /// Next state, or `None` once the request is over.
    pub async fn next(&mut self) -> Option<TileLoadState> {
        self.updates.recv().await
    }

    /// Drains the request and returns every state it emitted.
    pub async fn collect(mut self) -> Vec<TileLoadState> {
        let mut states = Vec::new();
        while let Some(state) = self.updates.recv().await {
            states.push(state);
        }
        states
    }
}

/// Emits states for one request through its [`StateSequence`].
struct Emitter {
    address: TileAddress,
    updates: mpsc::Sender<TileLoadState>,
    sequence: StateSequence,
    showed_low_res: bool,
}

impl Emitter {
    async fn emit(&mut self, state: TileLoadState) {
        if !self.sequence.advance(&state) {
            trace!(tile = %self.address, state = state.label(), "Dropping out-of-order state");
            return;
        }
        if matches!(state, TileLoadState::LowRes { .. }) {
            self.showed_low_res = true;
        }
        debug!(tile = %self.address, state = state.label(), "Tile state");
        // Keep going if nobody listens: the fetch still fills the cache
        let _ = self.updates.send(state).await;
    }
}

struct LoaderInner {
    cache: Arc<TileCache>,
    fetcher: Arc<dyn TileFetch>,
    coalescer: RequestCoalescer,
    permits: Semaphore,
    config: LoaderConfig,
    requests: AtomicU64,
    low_res_served: AtomicU64,
}

/// Loads tiles cache-first, showing a magnified ancestor while it waits.
///
/// Cheap to clone; clones share the coalescer and the fetch semaphore.
#[derive(Clone)]
pub struct ProgressiveTileLoader {
    inner: Arc<LoaderInner>,
}

impl ProgressiveTileLoader {
    pub fn new(cache: Arc<TileCache>, fetcher: Arc<dyn TileFetch>, config: LoaderConfig) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                cache,
                fetcher,
                coalescer: RequestCoalescer::new(),
                permits: Semaphore::new(config.max_concurrent_fetches.max(1)),
                config,
                requests: AtomicU64::new(0),
                low_res_served: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> LoaderConfig {
        self.inner.config
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.inner.cache
    }

    /// Starts loading `address`.
    ///
    /// Must be called from within a Tokio runtime. The first state on the
    /// handle is always [`TileLoadState::Loading`].
    pub fn request(&self, address: TileAddress) -> TileLoadHandle {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(UPDATE_CAPACITY);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(inner.pump(address, tx));
        TileLoadHandle {
            address,
            updates: rx,
        }
    }

    /// Cancels the in-flight fetch for `address`.
    ///
    /// Every request waiting on it ends without a terminal state. Returns
    /// `false` when nothing was in flight.
    pub fn cancel(&self, address: &TileAddress) -> bool {
        self.inner.coalescer.cancel(address)
    }

    pub fn cancel_all(&self) {
        self.inner.coalescer.cancel_all();
    }

    pub fn is_in_flight(&self, address: &TileAddress) -> bool {
        self.inner.coalescer.is_in_flight(address)
    }

    pub fn stats(&self) -> LoaderStats {
        let coalescer = self.inner.coalescer.stats();
        LoaderStats {
            requests: self.inner.requests.load(Ordering::Relaxed),
            coalesced: coalescer.coalesced_requests,
            fetches_started: coalescer.new_requests,
            cancelled: coalescer.cancelled,
            low_res_served: self.inner.low_res_served.load(Ordering::Relaxed),
            in_flight: self.inner.coalescer.in_flight_count(),
        }
    }
}

impl LoaderInner {
    async fn pump(self: Arc<Self>, address: TileAddress, updates: mpsc::Sender<TileLoadState>) {
        let mut emitter = Emitter {
            address,
            updates,
            sequence: StateSequence::new(),
            showed_low_res: false,
        };
        // Registered before `Loading` so observers of `Loading` can rely on it
        let registration = self.coalescer.register(address);
        let token = registration.token().clone();
        emitter.emit(TileLoadState::Loading).await;

        let full = self.full_resolution(address, registration);
        tokio::pin!(full);
        let ancestor = self.cached_ancestor(address);
        tokio::pin!(ancestor);
        let mut ancestor_pending = true;

        // Biased so a full result that is ready wins over the placeholder
        let outcome = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break Err(FetchError::Cancelled),
                outcome = &mut full => break outcome,
                found = &mut ancestor, if ancestor_pending => {
                    ancestor_pending = false;
                    if let Some((ancestor, region, image)) = found {
                        self.low_res_served.fetch_add(1, Ordering::Relaxed);
                        emitter
                            .emit(TileLoadState::LowRes { image, region, ancestor })
                            .await;
                    }
                }
            }
        };

        match outcome {
            Ok(image) => emitter.emit(TileLoadState::HighRes(image)).await,
            Err(FetchError::Cancelled) => {
                debug!(tile = %address, "Tile request cancelled");
            }
            Err(e) if e.is_rate_limited() || !emitter.showed_low_res => {
                emitter.emit(TileLoadState::Failed(e)).await;
            }
            Err(e) => {
                debug!(tile = %address, error = %e, "Full tile failed, keeping low-res placeholder");
            }
        }
    }

    /// Full-resolution result, either produced here or shared by the leader.
    async fn full_resolution(&self, address: TileAddress, registration: Registration) -> FetchOutcome {
        match registration {
            Registration::Leader { id, .. } => {
                let outcome = self.load(address).await;
                self.coalescer.complete(address, id, outcome.clone());
                outcome
            }
            // A closed channel means the leader was cancelled
            Registration::Follower { mut receiver, .. } => receiver
                .recv()
                .await
                .unwrap_or(Err(FetchError::Cancelled)),
        }
    }

    /// Cache, then network. Only complete downloads are written back.
    async fn load(&self, address: TileAddress) -> FetchOutcome {
        if let Some(image) = self.cache.get(&address).await {
            debug!(tile = %address, "Tile cache hit");
            return Ok(image);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Cancelled)?;
        let image = self.fetcher.fetch(address).await?;
        self.cache.put(&address, image.clone()).await;
        Ok(image)
    }

    /// Cached ancestor `low_res_zoom_offset` levels up, never above the
    /// source's minimum zoom. Never fetches.
    async fn cached_ancestor(
        &self,
        address: TileAddress,
    ) -> Option<(TileAddress, AncestorRegion, EncodedImage)> {
        let min_zoom = self.fetcher.min_zoom(address.source());
        let (ancestor, region) = address.ancestor(self.config.low_res_zoom_offset, min_zoom)?;
        let image = self.cache.get(&ancestor).await?;
        Some((ancestor, region, image))
    }
}
