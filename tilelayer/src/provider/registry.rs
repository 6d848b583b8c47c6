//! Source kind to provider bindings.

use std::collections::HashMap;
use std::sync::Arc;

use super::arcgis::{ArcGisProvider, DEFAULT_ARCGIS_BASE};
use super::quadkey::{QuadkeyProvider, DEFAULT_QUADKEY_BASE};
use super::street::{StreetProvider, DEFAULT_STREET_HOST};
use super::types::{ProviderError, TileSourceProvider};
use crate::tile::SourceKind;

/// Endpoints for the built-in providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Host for street tiles, e.g. `openstreetmap.org`
    pub street_host: String,
    /// ArcGIS service base (without `/MapServer`)
    pub arcgis_base: String,
    /// Quadkey tile server base
    pub quadkey_base: String,
    /// Source shown before the user picks one
    pub default_source: SourceKind,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            street_host: DEFAULT_STREET_HOST.to_string(),
            arcgis_base: DEFAULT_ARCGIS_BASE.to_string(),
            quadkey_base: DEFAULT_QUADKEY_BASE.to_string(),
            default_source: SourceKind::Street,
        }
    }
}

/// Maps every [`SourceKind`] to the provider that serves it.
///
/// Also owns the rate-limit fallback chain: when a source answers 403/429,
/// the scheduler asks [`fallback_for`](Self::fallback_for) which source to
/// switch to.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<SourceKind, Arc<dyn TileSourceProvider>>,
    fallbacks: HashMap<SourceKind, SourceKind>,
}

impl ProviderRegistry {
    /// An empty registry with no fallbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the three built-in providers and the default fallback
    /// chain (the two satellite sources back each other up).
    pub fn with_defaults(config: &SourceConfig) -> Self {
        let mut registry = Self::new();
        registry.register(
            SourceKind::Street,
            Arc::new(StreetProvider::new(config.street_host.clone())),
        );
        registry.register(
            SourceKind::Satellite,
            Arc::new(ArcGisProvider::new(config.arcgis_base.clone())),
        );
        registry.register(
            SourceKind::SatelliteAlt,
            Arc::new(QuadkeyProvider::new(config.quadkey_base.clone())),
        );
        registry.set_fallback(SourceKind::Satellite, SourceKind::SatelliteAlt);
        registry.set_fallback(SourceKind::SatelliteAlt, SourceKind::Satellite);
        registry
    }

    /// Binds `kind` to `provider`, replacing any previous binding.
    pub fn register(&mut self, kind: SourceKind, provider: Arc<dyn TileSourceProvider>) {
        self.providers.insert(kind, provider);
    }

    pub fn set_fallback(&mut self, from: SourceKind, to: SourceKind) {
        if from != to {
            self.fallbacks.insert(from, to);
        }
    }

    pub fn get(&self, kind: SourceKind) -> Result<Arc<dyn TileSourceProvider>, ProviderError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(ProviderError::Unregistered(kind))
    }

    /// Source to switch to when `kind` is rate limited.
    ///
    /// Only returns kinds that actually have a provider registered.
    pub fn fallback_for(&self, kind: SourceKind) -> Option<SourceKind> {
        self.fallbacks
            .get(&kind)
            .copied()
            .filter(|to| self.providers.contains_key(to))
    }

    /// Minimum zoom of the provider for `kind`, 0 if unregistered.
    pub fn min_zoom(&self, kind: SourceKind) -> u8 {
        self.providers
            .get(&kind)
            .map_or(0, |provider| provider.zoom_range().0)
    }

    pub fn kinds(&self) -> impl Iterator<Item = SourceKind> + '_ {
        SourceKind::ALL
            .into_iter()
            .filter(|kind| self.providers.contains_key(kind))
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<(SourceKind, &str)> = self
            .kinds()
            .filter_map(|kind| Some((kind, self.providers.get(&kind)?.name())))
            .collect();
        f.debug_struct("ProviderRegistry")
            .field("providers", &names)
            .field("fallbacks", &self.fallbacks)
            .finish()
    }
}
