//! Error types for tile fetching.

use thiserror::Error;

use crate::tile::SourceKind;

/// Why a tile could not be fetched.
///
/// `Clone` so one result can be broadcast to every coalesced requester and
/// stored in a `Failed` load state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Address not servable by its provider (zoom out of range, no provider)
    #[error("Invalid tile address: {0}")]
    InvalidAddress(String),

    /// Source refused with 403 or 429
    #[error("Source '{kind}' rate limited the request (HTTP {status})")]
    RateLimited { kind: SourceKind, status: u16 },

    /// Timeout, connection failure or 5xx after all retries
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Any other non-success status
    #[error("HTTP {status}")]
    Http { status: u16 },

    /// Body empty or not a decodable image
    #[error("Could not decode tile: {0}")]
    Decode(String),

    /// Request was cancelled before completion
    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether another attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }

    /// Maps an HTTP status to an error, `None` for success codes.
    pub fn from_status(kind: SourceKind, status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            403 | 429 => Some(FetchError::RateLimited { kind, status }),
            500..=599 => Some(FetchError::Transient(format!("HTTP {}", status))),
            _ => Some(FetchError::Http { status }),
        }
    }
}
