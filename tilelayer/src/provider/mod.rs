//! Tile source provider abstraction
//!
//! A provider turns a [`TileAddress`](crate::tile::TileAddress) into a
//! download URL for one remote tile source. Three built-in providers cover
//! the source kinds the engine knows:
//!
//! | Kind | Provider | URL shape |
//! |---|---|---|
//! | `street` | [`StreetProvider`] | `https://tile.{host}/{z}/{x}/{y}.png` |
//! | `satellite` | [`ArcGisProvider`] | `{base}/MapServer/tile/{z}/{y}/{x}` |
//! | `satellitealt` | [`QuadkeyProvider`] | `{base}/tiles/a{quadkey}.jpeg?g=1` |
//!
//! The [`ProviderRegistry`] binds kinds to providers; everything downstream
//! goes through it, so adding a source means registering one more provider.
//!
//! Downloads go through [`AsyncHttpClient`], which the fetcher takes by
//! injection so tests can script responses.

mod arcgis;
mod http;
mod quadkey;
mod registry;
mod street;
mod types;

pub use arcgis::{ArcGisProvider, DEFAULT_ARCGIS_BASE};
pub use http::{AsyncHttpClient, AsyncReqwestClient, HttpResponse, TransportError};
pub use quadkey::{QuadkeyProvider, DEFAULT_QUADKEY_BASE};
pub use registry::{ProviderRegistry, SourceConfig};
pub use street::{StreetProvider, DEFAULT_STREET_HOST};
pub use types::{ProviderError, TileSourceProvider};

#[cfg(test)]
pub use http::tests::MockAsyncHttpClient;
