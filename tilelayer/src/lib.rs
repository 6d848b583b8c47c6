//! TileLayer - Raster map tile cache and progressive loading engine
//!
//! This library turns a geographic viewport (center, zoom, digital zoom,
//! canvas size) into a set of raster tiles that are fetched from remote tile
//! sources, cached across memory and disk tiers, and upgraded progressively
//! from low-resolution placeholders to full-resolution imagery.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   set_viewport   ┌───────────────────┐
//! │  TileEngine  │ ───────────────► │ ViewportScheduler │ ──► TileStateMap ──► consumers
//! └──────────────┘                  └─────────┬─────────┘
//!                                             │ request / cancel
//!                                             ▼
//!                                 ┌────────────────────────┐
//!                                 │ ProgressiveTileLoader  │
//!                                 └─────┬────────────┬─────┘
//!                                       │            │
//!                                       ▼            ▼
//!                                 ┌──────────┐  ┌─────────────┐
//!                                 │TileCache │  │ TileFetcher │ ──► ProviderRegistry
//!                                 └──────────┘  └─────────────┘
//! ```
//!
//! The engine only fetches, caches, and supplies raster tiles and coordinate
//! transforms. Painting is left to the host.

pub mod cache;
pub mod config;
pub mod coord;
pub mod engine;
pub mod fetch;
pub mod loader;
pub mod logging;
pub mod provider;
pub mod scheduler;
pub mod tile;

pub use engine::{EngineConfig, EngineError, TileEngine};
pub use loader::TileLoadState;
pub use tile::{EncodedImage, SourceKind, TileAddress, TileEncoding};
