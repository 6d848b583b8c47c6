//! Integration tests for the progressive tile loader.
//!
//! Covers the cache-hit, progressive-upgrade and coalescing scenarios
//! against a real two-tier cache, plus the HTTP fetch path.
//!
//! Run with: `cargo test --test loader_integration`

mod common;

use std::sync::Arc;

use common::{image_for, RoutedHttp, ScriptedFetch};

use tilelayer::cache::{CacheConfig, DiskTierConfig, MemoryTierConfig, TileCache};
use tilelayer::fetch::{FetchError, FetcherConfig, FormatSupport, RetryPolicy, TileFetcher};
use tilelayer::loader::{LoaderConfig, ProgressiveTileLoader};
use tilelayer::provider::{ProviderRegistry, SourceConfig};
use tilelayer::{SourceKind, TileAddress, TileLoadState};

// ============================================================================
// Helper Functions
// ============================================================================

fn memory_cache() -> Arc<TileCache> {
    Arc::new(TileCache::memory_only(MemoryTierConfig::default()))
}

fn loader(cache: Arc<TileCache>, fetch: ScriptedFetch) -> ProgressiveTileLoader {
    ProgressiveTileLoader::new(cache, Arc::new(fetch), LoaderConfig::default())
}

fn tile(column: u32, row: u32, zoom: u8, source: SourceKind) -> TileAddress {
    TileAddress::new(column, row, zoom, source).unwrap()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// A cached tile is served without touching the network.
#[tokio::test]
async fn test_cache_hit_skips_network() {
    let cache = memory_cache();
    let fetch = ScriptedFetch::new();
    let address = tile(5, 3, 10, SourceKind::Street);
    cache.put(&address, image_for(&address)).await;

    let states = loader(cache, fetch.clone()).request(address).collect().await;

    assert_eq!(
        states,
        vec![TileLoadState::Loading, TileLoadState::HighRes(image_for(&address))]
    );
    assert!(fetch.calls().is_empty());
}

/// A disk hit survives reopening the cache and is promoted into memory.
#[tokio::test]
async fn test_disk_hit_after_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::default()
        .with_disk(DiskTierConfig::split_evenly(temp_dir.path(), 3 * 1024 * 1024));
    let address = tile(5, 3, 10, SourceKind::Satellite);

    let first = Arc::new(TileCache::open(config.clone()).await.unwrap());
    let fetch = ScriptedFetch::new();
    let states = loader(first, fetch.clone()).request(address).collect().await;
    assert_eq!(states.last(), Some(&TileLoadState::HighRes(image_for(&address))));
    assert_eq!(fetch.calls_for(&address), 1);

    let reopened = Arc::new(TileCache::open(config).await.unwrap());
    assert!(reopened.get_memory(&address).is_none());
    let fetch = ScriptedFetch::new();
    let states = loader(Arc::clone(&reopened), fetch.clone())
        .request(address)
        .collect()
        .await;

    assert_eq!(states.last(), Some(&TileLoadState::HighRes(image_for(&address))));
    assert!(fetch.calls().is_empty());
    assert!(reopened.get_memory(&address).is_some());
}

/// Zoom 14 tile with its zoom 12 ancestor cached: Loading, LowRes, HighRes.
#[tokio::test]
async fn test_progressive_upgrade() {
    let cache = memory_cache();
    let (fetch, gate) = ScriptedFetch::gated();
    let address = tile(5, 3, 14, SourceKind::Street);
    let (ancestor, region) = address.ancestor(2, 0).unwrap();
    assert_eq!(ancestor, tile(1, 0, 12, SourceKind::Street));
    cache.put(&ancestor, image_for(&ancestor)).await;

    let mut handle = loader(cache, fetch.clone()).request(address);
    assert_eq!(handle.next().await, Some(TileLoadState::Loading));

    match handle.next().await {
        Some(TileLoadState::LowRes {
            image,
            region: low_res_region,
            ancestor: low_res_ancestor,
        }) => {
            assert_eq!(image, image_for(&ancestor));
            assert_eq!(low_res_ancestor, ancestor);
            assert_eq!(low_res_region, region);
            assert_eq!(low_res_region.size, 0.25);
            assert_eq!(low_res_region.x, 0.25);
            assert_eq!(low_res_region.y, 0.75);
        }
        other => panic!("expected LowRes, got {:?}", other),
    }

    gate.add_permits(1);
    assert_eq!(handle.next().await, Some(TileLoadState::HighRes(image_for(&address))));
    assert_eq!(handle.next().await, None);
    assert_eq!(fetch.calls(), vec![address]);
}

/// Concurrent requests for one address share a single fetch.
#[tokio::test]
async fn test_no_duplicate_in_flight_fetch() {
    let cache = memory_cache();
    let (fetch, gate) = ScriptedFetch::gated();
    let loader = loader(cache, fetch.clone());
    let address = tile(300, 200, 9, SourceKind::Satellite);

    let handles: Vec<_> = (0..16).map(|_| loader.request(address)).collect();
    common::eventually("fetch started", || fetch.calls_for(&address) == 1).await;
    gate.add_permits(16);

    let results = futures::future::join_all(handles.into_iter().map(|h| h.collect())).await;
    for states in results {
        assert_eq!(states.first(), Some(&TileLoadState::Loading));
        assert_eq!(states.last(), Some(&TileLoadState::HighRes(image_for(&address))));
    }
    assert_eq!(fetch.calls_for(&address), 1);

    let stats = loader.stats();
    assert_eq!(stats.requests, 16);
    assert_eq!(stats.fetches_started, 1);
    assert_eq!(stats.coalesced, 15);
    assert_eq!(stats.in_flight, 0);
}

/// States never go backwards, whatever the timing.
#[tokio::test]
async fn test_states_monotonic_under_load() {
    let cache = memory_cache();
    let fetch = ScriptedFetch::new().with_delay(std::time::Duration::from_millis(2));
    let loader = loader(Arc::clone(&cache), fetch);

    // Half the ancestors cached so both paths run
    let addresses: Vec<_> = (0..32).map(|i| tile(i * 4, 7, 8, SourceKind::Street)).collect();
    for address in addresses.iter().step_by(2) {
        let (ancestor, _) = address.ancestor(2, 0).unwrap();
        cache.put(&ancestor, image_for(&ancestor)).await;
    }

    let handles: Vec<_> = addresses.iter().map(|a| loader.request(*a)).collect();
    for states in futures::future::join_all(handles.into_iter().map(|h| h.collect())).await {
        let ranks: Vec<u8> = states.iter().map(|s| s.rank()).collect();
        assert!(ranks.windows(2).all(|w| w[0] < w[1]), "non-monotonic: {:?}", ranks);
        assert!(states.last().unwrap().is_terminal());
    }
}

/// A rate-limited source surfaces as Failed(RateLimited) through the real fetcher.
#[tokio::test]
async fn test_http_rate_limit_classified() {
    let http = RoutedHttp::new()
        .route("MapServer", 429)
        .route("virtualearth", 200);
    let registry = Arc::new(ProviderRegistry::with_defaults(&SourceConfig::default()));
    let config = FetcherConfig::default()
        .with_format_support(FormatSupport::all())
        .with_retry(RetryPolicy::exponential(3));
    let fetcher = Arc::new(TileFetcher::new(http.clone(), registry, config));
    let loader = ProgressiveTileLoader::new(memory_cache(), fetcher, LoaderConfig::default());

    let limited = tile(10, 20, 6, SourceKind::Satellite);
    let states = loader.request(limited).collect().await;
    assert_eq!(
        states.last(),
        Some(&TileLoadState::Failed(FetchError::RateLimited {
            kind: SourceKind::Satellite,
            status: 429,
        }))
    );
    // Rate limits are not retried
    assert_eq!(http.calls_matching("MapServer"), 1);

    let alt = limited.with_source(SourceKind::SatelliteAlt);
    let states = loader.request(alt).collect().await;
    assert!(matches!(states.last(), Some(TileLoadState::HighRes(_))));
    assert_eq!(http.calls_matching("virtualearth"), 1);
}
