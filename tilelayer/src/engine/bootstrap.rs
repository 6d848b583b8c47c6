//! Engine bootstrap implementation.
//!
//! [`TileEngine`] wires registry, cache, fetcher, loader and scheduler in
//! dependency order and owns them for the lifetime of the map view.

use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::broadcast;
use tracing::info;

use super::config::EngineConfig;
use super::error::EngineError;
use crate::cache::{CacheStats, EvictionReport, TileCache};
use crate::config::format_size;
use crate::coord::{CanvasSize, GeoCoordinate};
use crate::fetch::{TileFetch, TileFetcher};
use crate::loader::{LoaderStats, ProgressiveTileLoader};
use crate::provider::{AsyncReqwestClient, ProviderRegistry};
use crate::scheduler::{
    ConnectionClass, PlacedTile, PublishedTile, SchedulerStats, TileUpdate, Viewport,
    ViewportOutcome, ViewportScheduler,
};
use crate::tile::{SourceKind, TileAddress};

/// The tile engine behind one map view.
///
/// Start it once, feed it viewports, and paint what it publishes:
///
/// ```ignore
/// use tilelayer::{EngineConfig, TileEngine};
///
/// let engine = TileEngine::start(EngineConfig::default()).await?;
/// let mut updates = engine.subscribe();
/// engine.set_viewport(center, 12, 1.0, CanvasSize::new(800.0, 600.0))?;
/// while let Ok(update) = updates.recv().await {
///     // repaint update.address with update.state
/// }
/// ```
pub struct TileEngine {
    cache: Arc<TileCache>,
    registry: Arc<ProviderRegistry>,
    loader: ProgressiveTileLoader,
    scheduler: ViewportScheduler,
    config: EngineConfig,

    /// Owned runtime when created via [`start_sync`](Self::start_sync).
    runtime: Option<Runtime>,
}

impl TileEngine {
    /// Starts the engine on the current Tokio runtime, downloading over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is inconsistent, the disk tier
    /// cannot be opened, or the HTTP client cannot be built.
    pub async fn start(config: EngineConfig) -> Result<Self, EngineError> {
        Self::start_internal(config, None, Handle::current()).await
    }

    /// Starts the engine with a custom tile source in place of the HTTP
    /// fetcher.
    pub async fn start_with_fetcher(
        config: EngineConfig,
        fetcher: Arc<dyn TileFetch>,
    ) -> Result<Self, EngineError> {
        Self::start_internal(config, Some(fetcher), Handle::current()).await
    }

    /// Starts the engine synchronously on a runtime it creates and owns.
    ///
    /// For hosts without a Tokio runtime. The runtime lives as long as the
    /// engine. Must not be called from within an async context.
    pub fn start_sync(config: EngineConfig) -> Result<Self, EngineError> {
        let runtime = Runtime::new().map_err(|e| EngineError::RuntimeCreation(e.to_string()))?;
        let handle = runtime.handle().clone();
        let mut engine = runtime.block_on(Self::start_internal(config, None, handle))?;
        engine.runtime = Some(runtime);
        Ok(engine)
    }

    async fn start_internal(
        config: EngineConfig,
        fetcher: Option<Arc<dyn TileFetch>>,
        runtime: Handle,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        info!("Starting tile engine");

        let registry = Arc::new(ProviderRegistry::with_defaults(&config.sources));

        let fetcher: Arc<dyn TileFetch> = match fetcher {
            Some(fetcher) => fetcher,
            None => {
                let client = AsyncReqwestClient::with_timeout(config.http_timeout)?;
                Arc::new(TileFetcher::new(
                    client,
                    Arc::clone(&registry),
                    config.fetcher.clone(),
                ))
            }
        };

        let cache = Arc::new(TileCache::open(config.cache.clone()).await?);
        info!(
            memory = %format_size(config.cache.memory.max_bytes),
            memory_entries = config.cache.memory.max_entries,
            disk = cache.has_disk_tier(),
            "Tile cache opened"
        );

        let loader = ProgressiveTileLoader::new(Arc::clone(&cache), fetcher, config.loader);

        let mut scheduler_config = config.scheduler.clone();
        for kind in registry.kinds() {
            if let Some(fallback) = registry.fallback_for(kind) {
                scheduler_config.fallbacks.entry(kind).or_insert(fallback);
            }
        }
        let scheduler = ViewportScheduler::with_runtime(loader.clone(), scheduler_config, runtime);

        info!(
            source = %scheduler.active_source(),
            max_concurrent_fetches = config.loader.max_concurrent_fetches,
            "Tile engine started"
        );

        Ok(Self {
            cache,
            registry,
            loader,
            scheduler,
            config,
            runtime: None,
        })
    }

    /// Applies a new viewport on the active source. Returns immediately;
    /// tiles arrive through [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Viewport`] for a zoom above
    /// [`MAX_ZOOM`](crate::tile::MAX_ZOOM); nothing is requested or cancelled.
    pub fn set_viewport(
        &self,
        center: GeoCoordinate,
        zoom: u8,
        digital_zoom: f64,
        canvas: CanvasSize,
    ) -> Result<ViewportOutcome, EngineError> {
        let viewport = Viewport::new(center, zoom, canvas, self.scheduler.active_source())
            .with_digital_zoom(digital_zoom);
        Ok(self.scheduler.set_viewport(viewport)?)
    }

    /// Switches the map source; the next viewport loads from it.
    pub fn set_source(&self, source: SourceKind) {
        self.scheduler.set_source(source);
    }

    pub fn active_source(&self) -> SourceKind {
        self.scheduler.active_source()
    }

    /// Stream of published tile changes.
    pub fn subscribe(&self) -> broadcast::Receiver<TileUpdate> {
        self.scheduler.updates()
    }

    /// Screen rectangles of every published tile.
    pub fn placements(&self) -> Vec<PlacedTile> {
        self.scheduler.placements()
    }

    pub fn state_of(&self, address: &TileAddress) -> Option<PublishedTile> {
        self.scheduler.state_of(address)
    }

    pub fn set_connection_class(&self, connection: ConnectionClass) {
        self.scheduler.set_connection_class(connection);
    }

    pub fn cache_stats(&self, source: Option<SourceKind>) -> CacheStats {
        self.cache.stats(source)
    }

    /// Host memory-pressure hook. Safe to call at any time.
    pub fn handle_memory_pressure(&self) -> EvictionReport {
        self.cache.handle_memory_pressure()
    }

    /// Drops cached tiles of `source`, or every tile.
    pub async fn clear_cache(&self, source: Option<SourceKind>) {
        self.cache.clear(source).await;
    }

    pub fn loader_stats(&self) -> LoaderStats {
        self.loader.stats()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle of the runtime the engine's tasks run on.
    ///
    /// # Panics
    ///
    /// Panics if the engine was started with [`start`](Self::start) and no
    /// runtime is active on the calling thread.
    pub fn runtime_handle(&self) -> Handle {
        self.runtime
            .as_ref()
            .map(|r| r.handle().clone())
            .unwrap_or_else(Handle::current)
    }

    /// Cancels all loading and releases the engine.
    ///
    /// An owned runtime is shut down without waiting for blocking work.
    pub fn shutdown(self) {
        info!("Shutting down tile engine");
        self.scheduler.shutdown();
        self.loader.cancel_all();
        if let Some(runtime) = self.runtime {
            runtime.shutdown_background();
        }
        info!("Tile engine shutdown complete");
    }
}
