//! Engine bootstrap and consumer-facing API.
//!
//! [`TileEngine`] is the one type a host talks to. It builds every
//! component in dependency order:
//!
//! ```text
//! ProviderRegistry ──► TileFetcher ─┐
//!                                   ├──► ProgressiveTileLoader ──► ViewportScheduler
//! TileCache (memory + disk) ────────┘
//! ```
//!
//! and forwards viewport changes, memory-pressure signals and network
//! hints to them. Tiles come back as [`TileUpdate`](crate::scheduler::TileUpdate)s.

mod bootstrap;
mod config;
mod error;

pub use bootstrap::TileEngine;
pub use config::{EngineConfig, DEFAULT_HTTP_TIMEOUT};
pub use error::EngineError;
