//! In-flight request coalescing for full-resolution fetches.
//!
//! When several requests for the same tile overlap (the same address planned
//! by consecutive viewports, or requested directly by the host), only the
//! first one fetches. Later requesters subscribe to its broadcast result.
//!
//! ```text
//! request A ─┐
//!            │                          leader (A)
//! request B ─┼──► RequestCoalescer ───► cache → fetch → cache put
//!            │          │                   │
//! request C ─┘          ▼                   ▼
//!                 B, C subscribe ◄──── broadcast result
//! ```
//!
//! Each entry carries an id, so a leader that finishes after its entry was
//! cancelled and replaced cannot complete someone else's entry, and a
//! `CancellationToken` shared with every subscriber.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::fetch::FetchError;
use crate::tile::{EncodedImage, TileAddress};

/// Result shared with every coalesced requester.
pub type FetchOutcome = Result<EncodedImage, FetchError>;

/// Only ever one message per entry.
const RESULT_CAPACITY: usize = 1;

struct InFlight {
    id: u64,
    sender: broadcast::Sender<FetchOutcome>,
    token: CancellationToken,
}

/// What [`RequestCoalescer::register`] decided.
pub enum Registration {
    /// First requester: do the work, then call [`RequestCoalescer::complete`].
    Leader { id: u64, token: CancellationToken },
    /// Someone else is already fetching: wait on `receiver`.
    Follower {
        receiver: broadcast::Receiver<FetchOutcome>,
        token: CancellationToken,
    },
}

impl Registration {
    pub fn is_leader(&self) -> bool {
        matches!(self, Registration::Leader { .. })
    }

    pub fn token(&self) -> &CancellationToken {
        match self {
            Registration::Leader { token, .. } | Registration::Follower { token, .. } => token,
        }
    }
}

/// Coalescing counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    pub total_requests: u64,
    /// Requests that joined an in-flight fetch
    pub coalesced_requests: u64,
    /// Requests that started a fetch
    pub new_requests: u64,
    pub cancelled: u64,
}

impl CoalescerStats {
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.coalesced_requests as f64 / self.total_requests as f64
        }
    }
}

/// Tracks which tiles have a full-resolution fetch in flight.
#[derive(Default)]
pub struct RequestCoalescer {
    in_flight: DashMap<TileAddress, InFlight>,
    next_id: AtomicU64,
    total_requests: AtomicU64,
    coalesced_requests: AtomicU64,
    new_requests: AtomicU64,
    cancelled: AtomicU64,
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `address`.
    ///
    /// The entry API makes check-and-insert atomic, so two racing callers can
    /// never both become leader.
    pub fn register(&self, address: TileAddress) -> Registration {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        match self.in_flight.entry(address) {
            Entry::Occupied(entry) => {
                self.coalesced_requests.fetch_add(1, Ordering::Relaxed);
                debug!(tile = %address, "Joining in-flight fetch");
                Registration::Follower {
                    receiver: entry.get().sender.subscribe(),
                    token: entry.get().token.clone(),
                }
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let token = CancellationToken::new();
                let (sender, _) = broadcast::channel(RESULT_CAPACITY);
                entry.insert(InFlight {
                    id,
                    sender,
                    token: token.clone(),
                });
                self.new_requests.fetch_add(1, Ordering::Relaxed);
                Registration::Leader { id, token }
            }
        }
    }

    /// Publishes the leader's result and retires the entry.
    ///
    /// Ignored when the entry `id` is no longer current.
    pub fn complete(&self, address: TileAddress, id: u64, outcome: FetchOutcome) {
        if let Some((_, in_flight)) = self.in_flight.remove_if(&address, |_, f| f.id == id) {
            let waiters = in_flight.sender.receiver_count();
            // No receivers is fine: nobody joined
            let _ = in_flight.sender.send(outcome);
            if waiters > 0 {
                debug!(tile = %address, waiters, "Broadcast fetch result");
            }
        }
    }

    /// Cancels the in-flight fetch for `address`, if any.
    ///
    /// Subscribers see their channel close and the shared token fire.
    pub fn cancel(&self, address: &TileAddress) -> bool {
        match self.in_flight.remove(address) {
            Some((_, in_flight)) => {
                in_flight.token.cancel();
                self.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(tile = %address, "Cancelled in-flight fetch");
                true
            }
            None => false,
        }
    }

    /// Cancels every in-flight fetch.
    pub fn cancel_all(&self) {
        let addresses: Vec<TileAddress> = self.in_flight.iter().map(|e| *e.key()).collect();
        for address in addresses {
            self.cancel(&address);
        }
    }

    pub fn is_in_flight(&self, address: &TileAddress) -> bool {
        self.in_flight.contains_key(address)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            new_requests: self.new_requests.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}
