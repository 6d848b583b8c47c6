//! Viewport-driven tile scheduling.
//!
//! [`ViewportScheduler::set_viewport`] turns a viewport into a [`TilePlan`],
//! starts a new generation of the [`TileStateMap`], cancels loads for tiles
//! that left the plan, and hands the rest to a background dispatch task:
//!
//! ```text
//! set_viewport ──► plan_tiles ──► begin_generation ──► cancel dropped tiles
//!                                        │
//!                                        ▼
//!                          dispatch task (one per generation)
//!                 visible: batches of 3 ──► buffer: batches of 5
//!                                        │
//!                                        ▼
//!                    per-tile forwarder: loader states ──► TileStateMap
//! ```
//!
//! Batches only order the requests: each batch is handed to the loader and
//! the next follows without waiting for any tile to finish. The loader's
//! fetch permits bound how many downloads run at once, so a tile that never
//! answers holds one permit and nothing else.
//!
//! The caller never waits for tiles. A newer viewport cancels the previous
//! dispatch task; forwarders of dropped tiles find their slot gone and
//! publish nothing.
//!
//! While digital zoom is engaged the scheduler neither requests nor cancels
//! anything; only [`placements`](ViewportScheduler::placements) change.

mod plan;
mod state_map;

pub use plan::{plan_tiles, ConnectionClass, TilePlan, Viewport};
pub use state_map::{GenerationChange, LoadTicket, PublishedTile, TileStateMap, TileUpdate};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coord::{
    geo_to_tile, screen_position_of, CoordinateTransformer, DigitalZoomRange, TilePlacement,
    TilePoint, TILE_SIZE,
};
use crate::fetch::FetchError;
use crate::loader::{ProgressiveTileLoader, TileLoadHandle, TileLoadState};
use crate::tile::{tiles_per_side, AddressError, SourceKind, TileAddress, MAX_ZOOM};

/// Default visible tiles requested per batch.
pub const DEFAULT_VISIBLE_BATCH: usize = 3;

/// Default buffer tiles requested per batch.
pub const DEFAULT_BUFFER_BATCH: usize = 5;

/// Default capacity of the update broadcast.
pub const DEFAULT_UPDATE_CAPACITY: usize = 1024;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub visible_batch: usize,
    pub buffer_batch: usize,
    pub connection: ConnectionClass,
    pub update_capacity: usize,
    pub digital_zoom_range: DigitalZoomRange,
    pub default_source: SourceKind,
    /// Source to switch to when one is rate limited
    pub fallbacks: HashMap<SourceKind, SourceKind>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            visible_batch: DEFAULT_VISIBLE_BATCH,
            buffer_batch: DEFAULT_BUFFER_BATCH,
            connection: ConnectionClass::default(),
            update_capacity: DEFAULT_UPDATE_CAPACITY,
            digital_zoom_range: DigitalZoomRange::default(),
            default_source: SourceKind::Street,
            fallbacks: HashMap::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_batches(mut self, visible: usize, buffer: usize) -> Self {
        self.visible_batch = visible.max(1);
        self.buffer_batch = buffer.max(1);
        self
    }

    pub fn with_connection(mut self, connection: ConnectionClass) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_digital_zoom_range(mut self, range: DigitalZoomRange) -> Self {
        self.digital_zoom_range = range;
        self
    }

    pub fn with_default_source(mut self, source: SourceKind) -> Self {
        self.default_source = source;
        self
    }

    pub fn with_fallback(mut self, from: SourceKind, to: SourceKind) -> Self {
        self.fallbacks.insert(from, to);
        self
    }
}

/// What [`ViewportScheduler::set_viewport`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewportOutcome {
    pub generation: u64,
    /// Digital zoom engaged: nothing requested, nothing cancelled
    pub paused: bool,
    pub visible: usize,
    pub buffer: usize,
    /// Tiles handed to the dispatch task
    pub dispatched: usize,
    pub cancelled: usize,
}

/// Scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub generation: u64,
    pub tracked_tiles: usize,
    pub requests: u64,
    pub fallbacks: u64,
    pub stale_dropped: u64,
}

/// A published tile and where to draw it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedTile {
    pub placement: TilePlacement,
    pub state: TileLoadState,
}

struct SchedulerInner {
    loader: ProgressiveTileLoader,
    map: TileStateMap,
    transformer: CoordinateTransformer,
    config: SchedulerConfig,
    runtime: Handle,
    viewport: Mutex<Option<Viewport>>,
    active_source: Mutex<SourceKind>,
    connection: Mutex<ConnectionClass>,
    /// Token of the running dispatch task. Held across a whole
    /// `set_viewport` so generations and dispatch tasks stay in step.
    dispatch: Mutex<Option<CancellationToken>>,
    requests: AtomicU64,
    fallbacks: AtomicU64,
}

/// Keeps the published tile set in line with the viewport.
///
/// Cheap to clone; clones drive the same state map.
#[derive(Clone)]
pub struct ViewportScheduler {
    inner: Arc<SchedulerInner>,
}

impl ViewportScheduler {
    /// Creates a scheduler on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(loader: ProgressiveTileLoader, config: SchedulerConfig) -> Self {
        Self::with_runtime(loader, config, Handle::current())
    }

    /// Creates a scheduler that spawns its tasks on `runtime`, so
    /// [`set_viewport`](Self::set_viewport) can be called from any thread.
    pub fn with_runtime(
        loader: ProgressiveTileLoader,
        config: SchedulerConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                loader,
                map: TileStateMap::new(config.update_capacity),
                transformer: CoordinateTransformer::new(config.digital_zoom_range),
                runtime,
                viewport: Mutex::new(None),
                active_source: Mutex::new(config.default_source),
                connection: Mutex::new(config.connection),
                dispatch: Mutex::new(None),
                requests: AtomicU64::new(0),
                fallbacks: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// Applies a new viewport. Never waits for tiles.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::InvalidZoom`] for a zoom above [`MAX_ZOOM`];
    /// the previous viewport and its tiles are left untouched.
    pub fn set_viewport(&self, viewport: Viewport) -> Result<ViewportOutcome, AddressError> {
        if viewport.zoom > MAX_ZOOM {
            warn!(zoom = viewport.zoom, "Viewport zoom out of range, ignored");
            return Err(AddressError::InvalidZoom(viewport.zoom));
        }

        let inner = &self.inner;
        let viewport = Viewport {
            digital_zoom: inner.transformer.clamp_digital_zoom(viewport.digital_zoom),
            ..viewport
        };
        *inner.viewport.lock() = Some(viewport);

        if viewport.is_digital_zoom_engaged() {
            debug!(
                digital_zoom = viewport.digital_zoom,
                "Digital zoom engaged, tile loading paused"
            );
            return Ok(ViewportOutcome {
                generation: inner.map.generation(),
                paused: true,
                ..Default::default()
            });
        }

        let mut dispatch = inner.dispatch.lock();

        let plan = plan_tiles(&viewport, self.connection_class().buffer_fraction());
        let change = inner.map.begin_generation(&plan.addresses());
        for address in &change.cancelled {
            inner.loader.cancel(address);
        }

        let tickets = |addresses: &[TileAddress]| -> Vec<LoadTicket> {
            addresses
                .iter()
                .filter_map(|address| change.pending.get(address).copied())
                .collect()
        };
        let visible = tickets(plan.visible.as_slice());
        let buffer = tickets(plan.buffer.as_slice());

        let outcome = ViewportOutcome {
            generation: change.generation,
            paused: false,
            visible: plan.visible.len(),
            buffer: plan.buffer.len(),
            dispatched: visible.len() + buffer.len(),
            cancelled: change.cancelled.len(),
        };

        let token = CancellationToken::new();
        if let Some(previous) = dispatch.replace(token.clone()) {
            previous.cancel();
        }
        inner
            .runtime
            .spawn(Arc::clone(inner).dispatch(change.generation, visible, buffer, token));

        debug!(
            generation = outcome.generation,
            zoom = viewport.zoom,
            source = %viewport.source,
            visible = outcome.visible,
            buffer = outcome.buffer,
            dispatched = outcome.dispatched,
            cancelled = outcome.cancelled,
            "Viewport applied"
        );
        Ok(outcome)
    }

    /// Last viewport passed to [`set_viewport`](Self::set_viewport).
    pub fn viewport(&self) -> Option<Viewport> {
        *self.inner.viewport.lock()
    }

    /// Screen rectangles of every published tile for the current viewport.
    pub fn placements(&self) -> Vec<PlacedTile> {
        let Some(viewport) = self.viewport() else {
            return Vec::new();
        };
        self.inner
            .map
            .published()
            .into_iter()
            .map(|(address, published)| PlacedTile {
                placement: place(&viewport, address),
                state: published.state,
            })
            .collect()
    }

    /// Source new viewports should use. Moves to the fallback after a rate limit.
    pub fn active_source(&self) -> SourceKind {
        *self.inner.active_source.lock()
    }

    pub fn set_source(&self, source: SourceKind) {
        let mut active = self.inner.active_source.lock();
        if *active != source {
            info!(from = %*active, to = %source, "Active tile source changed");
            *active = source;
        }
    }

    pub fn connection_class(&self) -> ConnectionClass {
        *self.inner.connection.lock()
    }

    /// Takes effect from the next viewport.
    pub fn set_connection_class(&self, connection: ConnectionClass) {
        *self.inner.connection.lock() = connection;
    }

    pub fn updates(&self) -> broadcast::Receiver<TileUpdate> {
        self.inner.map.subscribe()
    }

    pub fn state_of(&self, address: &TileAddress) -> Option<PublishedTile> {
        self.inner.map.get(address)
    }

    pub fn generation(&self) -> u64 {
        self.inner.map.generation()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            generation: self.inner.map.generation(),
            tracked_tiles: self.inner.map.len(),
            requests: self.inner.requests.load(Ordering::Relaxed),
            fallbacks: self.inner.fallbacks.load(Ordering::Relaxed),
            stale_dropped: self.inner.map.stale_dropped(),
        }
    }

    /// Stops dispatching, cancels every load and forgets all published tiles.
    pub fn shutdown(&self) {
        if let Some(token) = self.inner.dispatch.lock().take() {
            token.cancel();
        }
        for address in self.inner.map.clear() {
            self.inner.loader.cancel(&address);
        }
        info!("Viewport scheduler stopped");
    }
}

impl SchedulerInner {
    async fn dispatch(
        self: Arc<Self>,
        generation: u64,
        visible: Vec<LoadTicket>,
        buffer: Vec<LoadTicket>,
        token: CancellationToken,
    ) {
        let phases = [
            (visible, self.config.visible_batch.max(1)),
            (buffer, self.config.buffer_batch.max(1)),
        ];
        for (tickets, batch_size) in phases {
            for batch in tickets.chunks(batch_size) {
                if token.is_cancelled() {
                    debug!(generation, "Dispatch superseded");
                    return;
                }
                for ticket in batch.iter().filter(|ticket| self.map.claim(ticket)) {
                    let handle = self.request(ticket.address);
                    self.runtime.spawn(Arc::clone(&self).forward(*ticket, handle));
                }
                // Let this batch reach the loader queue before the next one
                tokio::task::yield_now().await;
            }
        }
        debug!(generation, "Dispatch complete");
    }

    /// Copies one request's states into the map, falling back once on a
    /// rate limit.
    async fn forward(self: Arc<Self>, ticket: LoadTicket, handle: TileLoadHandle) {
        let mut ticket = ticket;
        let mut handle = handle;
        let mut may_fall_back = true;

        while let Some(state) = handle.next().await {
            if let TileLoadState::Failed(FetchError::RateLimited { kind, .. }) = &state {
                if may_fall_back {
                    if let Some((rebound, replacement)) = self.fall_back(&ticket, *kind) {
                        ticket = rebound;
                        handle = replacement;
                        may_fall_back = false;
                        continue;
                    }
                }
            }
            self.map.publish(&ticket, state);
        }
    }

    fn request(&self, address: TileAddress) -> TileLoadHandle {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.loader.request(address)
    }

    /// Re-requests the ticket's tile from the fallback of `limited` and makes
    /// that fallback the active source.
    fn fall_back(
        &self,
        ticket: &LoadTicket,
        limited: SourceKind,
    ) -> Option<(LoadTicket, TileLoadHandle)> {
        let fallback = *self.config.fallbacks.get(&limited)?;
        let requested = ticket.address.with_source(fallback);
        let rebound = self.map.rebind(ticket, requested)?;

        {
            let mut active = self.active_source.lock();
            if *active == limited {
                warn!(
                    from = %limited,
                    to = %fallback,
                    "Tile source rate limited, switching to fallback"
                );
                *active = fallback;
            }
        }
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        debug!(tile = %ticket.address, fallback = %requested, "Re-requesting from fallback source");
        Some((rebound, self.request(requested)))
    }
}

/// Screen rectangle of `address` for `viewport`.
///
/// Tiles from another zoom level are scaled to match, and columns are drawn
/// at the wrap nearest to the center.
fn place(viewport: &Viewport, address: TileAddress) -> TilePlacement {
    let zoom = address.zoom();
    let origin = geo_to_tile(&viewport.center, zoom);
    let magnify = viewport.digital_zoom * 2f64.powi(i32::from(viewport.zoom) - i32::from(zoom));

    let side = f64::from(tiles_per_side(zoom));
    let column = f64::from(address.column());
    let column = column + ((origin.x - (column + 0.5)) / side).round() * side;

    let corner = TilePoint::new(column, f64::from(address.row()));
    let top_left = screen_position_of(corner, origin, viewport.canvas, magnify);
    TilePlacement {
        address,
        x: top_left.x,
        y: top_left.y,
        size: TILE_SIZE * magnify,
    }
}
