//! Published tile states shared with consumers.
//!
//! The map holds one slot per planned tile. Each slot is bound to the load
//! currently working for it through a load id; a result is only written if
//! the slot still exists and still carries the id of the work that produced
//! it. Dropping a slot on a viewport change therefore discards everything
//! its old work still emits.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use crate::loader::TileLoadState;
use crate::tile::TileAddress;

/// State last published for a tile, with the generation it was published in.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedTile {
    pub state: TileLoadState,
    pub generation: u64,
}

/// One change to the published map.
#[derive(Debug, Clone, PartialEq)]
pub struct TileUpdate {
    pub address: TileAddress,
    pub state: TileLoadState,
    pub generation: u64,
}

/// Identifies the work a slot currently expects results from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    pub address: TileAddress,
    pub load_id: u64,
}

/// Result of switching the map to a new working set.
#[derive(Debug, Default)]
pub struct GenerationChange {
    pub generation: u64,
    /// Addresses whose loads should be cancelled (what was actually requested)
    pub cancelled: Vec<TileAddress>,
    /// Slots still waiting for a load, keyed by planned address
    pub pending: HashMap<TileAddress, LoadTicket>,
    pub retained: usize,
}

#[derive(Debug)]
struct Slot {
    load_id: u64,
    /// Address handed to the loader, once dispatched
    requested: Option<TileAddress>,
    published: Option<PublishedTile>,
}

#[derive(Debug, Default)]
struct MapState {
    generation: u64,
    next_load_id: u64,
    slots: HashMap<TileAddress, Slot>,
}

impl MapState {
    fn next_id(&mut self) -> u64 {
        self.next_load_id += 1;
        self.next_load_id
    }
}

/// Shared, versioned map of tile states.
pub struct TileStateMap {
    state: Mutex<MapState>,
    updates: broadcast::Sender<TileUpdate>,
    stale_dropped: AtomicU64,
}

impl TileStateMap {
    pub fn new(update_capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(update_capacity.max(1));
        Self {
            state: Mutex::new(MapState::default()),
            updates,
            stale_dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TileUpdate> {
        self.updates.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Starts a new generation whose working set is `planned`.
    ///
    /// Slots outside `planned` are dropped. Retained slots keep their
    /// published state and their load. New slots get a fresh ticket.
    pub fn begin_generation(&self, planned: &HashSet<TileAddress>) -> GenerationChange {
        let mut state = self.state.lock();
        state.generation += 1;

        let mut change = GenerationChange {
            generation: state.generation,
            ..Default::default()
        };

        state.slots.retain(|address, slot| {
            let keep = planned.contains(address);
            if !keep {
                if let Some(requested) = slot.requested {
                    change.cancelled.push(requested);
                }
            }
            keep
        });
        change.retained = state.slots.len();

        for address in planned {
            if !state.slots.contains_key(address) {
                let load_id = state.next_id();
                state.slots.insert(
                    *address,
                    Slot {
                        load_id,
                        requested: None,
                        published: None,
                    },
                );
            }
        }

        // Retained slots the previous dispatch never reached are pending too
        for (address, slot) in &state.slots {
            if slot.requested.is_none() {
                change.pending.insert(
                    *address,
                    LoadTicket {
                        address: *address,
                        load_id: slot.load_id,
                    },
                );
            }
        }
        change
    }

    /// Marks `ticket` as dispatched. `false` if the slot moved on.
    pub fn claim(&self, ticket: &LoadTicket) -> bool {
        let mut state = self.state.lock();
        match state.slots.get_mut(&ticket.address) {
            Some(slot) if slot.load_id == ticket.load_id && slot.requested.is_none() => {
                slot.requested = Some(ticket.address);
                true
            }
            _ => false,
        }
    }

    /// Hands the slot to a replacement load of `requested`.
    ///
    /// The published state is kept. Returns the new ticket, or `None` if
    /// `ticket` no longer owns the slot.
    pub fn rebind(&self, ticket: &LoadTicket, requested: TileAddress) -> Option<LoadTicket> {
        let mut state = self.state.lock();
        let load_id = state.next_id();
        let slot = state.slots.get_mut(&ticket.address)?;
        if slot.load_id != ticket.load_id {
            return None;
        }
        slot.load_id = load_id;
        slot.requested = Some(requested);
        Some(LoadTicket {
            address: ticket.address,
            load_id,
        })
    }

    /// Publishes `tile_state` for the ticket's slot.
    ///
    /// Refused when the slot is gone, belongs to other work, or already
    /// shows a state of equal or higher rank.
    pub fn publish(&self, ticket: &LoadTicket, tile_state: TileLoadState) -> bool {
        let mut state = self.state.lock();
        let generation = state.generation;
        let Some(slot) = state.slots.get_mut(&ticket.address) else {
            self.stale_dropped.fetch_add(1, Ordering::Relaxed);
            trace!(tile = %ticket.address, "Dropping result for unplanned tile");
            return false;
        };
        if slot.load_id != ticket.load_id {
            self.stale_dropped.fetch_add(1, Ordering::Relaxed);
            trace!(tile = %ticket.address, "Dropping result from superseded load");
            return false;
        }
        if let Some(current) = &slot.published {
            if tile_state.rank() <= current.state.rank() {
                return false;
            }
        }

        slot.published = Some(PublishedTile {
            state: tile_state.clone(),
            generation,
        });
        // Sent under the lock so update order matches map order.
        // No receivers is fine.
        let _ = self.updates.send(TileUpdate {
            address: ticket.address,
            state: tile_state,
            generation,
        });
        true
    }

    pub fn get(&self, address: &TileAddress) -> Option<PublishedTile> {
        self.state
            .lock()
            .slots
            .get(address)
            .and_then(|slot| slot.published.clone())
    }

    /// Every slot that has published something.
    pub fn published(&self) -> Vec<(TileAddress, PublishedTile)> {
        self.state
            .lock()
            .slots
            .iter()
            .filter_map(|(address, slot)| Some((*address, slot.published.clone()?)))
            .collect()
    }

    /// Addresses in the current working set.
    pub fn planned(&self) -> Vec<TileAddress> {
        self.state.lock().slots.keys().copied().collect()
    }

    /// Drops every slot; returns what was requested for them.
    pub fn clear(&self) -> Vec<TileAddress> {
        let mut state = self.state.lock();
        state.generation += 1;
        state
            .slots
            .drain()
            .filter_map(|(_, slot)| slot.requested)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{EncodedImage, SourceKind, TileEncoding};

    fn tile(column: u32) -> TileAddress {
        TileAddress::new(column, 1, 6, SourceKind::Satellite).unwrap()
    }

    fn planned(columns: &[u32]) -> HashSet<TileAddress> {
        columns.iter().map(|c| tile(*c)).collect()
    }

    fn high_res() -> TileLoadState {
        TileLoadState::HighRes(EncodedImage::new(vec![1], TileEncoding::Jpeg))
    }

    #[test]
    fn test_new_generation_tickets_all_tiles() {
        let map = TileStateMap::new(16);
        let change = map.begin_generation(&planned(&[1, 2, 3]));
        assert_eq!(change.generation, 1);
        assert_eq!(change.pending.len(), 3);
        assert!(change.cancelled.is_empty());
    }

    #[test]
    fn test_publish_and_subscribe() {
        let map = TileStateMap::new(16);
        let mut updates = map.subscribe();
        let change = map.begin_generation(&planned(&[1]));
        let ticket = change.pending[&tile(1)];
        assert!(map.claim(&ticket));

        assert!(map.publish(&ticket, TileLoadState::Loading));
        assert!(map.publish(&ticket, high_res()));
        assert!(!map.publish(&ticket, TileLoadState::Loading));

        assert_eq!(map.get(&tile(1)).unwrap().state, high_res());
        assert_eq!(updates.try_recv().unwrap().state, TileLoadState::Loading);
        let update = updates.try_recv().unwrap();
        assert_eq!(update.state, high_res());
        assert_eq!(update.generation, 1);
    }

    #[test]
    fn test_removed_tiles_reject_stale_results() {
        let map = TileStateMap::new(16);
        let change = map.begin_generation(&planned(&[1, 2]));
        let old = change.pending[&tile(1)];
        assert!(map.claim(&old));

        let change = map.begin_generation(&planned(&[2, 3]));
        assert_eq!(change.cancelled, vec![tile(1)]);
        assert_eq!(change.retained, 1);
        assert!(!map.publish(&old, high_res()));
        assert!(map.get(&tile(1)).is_none());
        assert_eq!(map.stale_dropped(), 1);

        // Re-planning the same address later needs a fresh load
        let change = map.begin_generation(&planned(&[1]));
        assert!(!map.publish(&old, high_res()));
        assert_ne!(change.pending[&tile(1)].load_id, old.load_id);
    }

    #[test]
    fn test_retained_tiles_keep_state_and_load() {
        let map = TileStateMap::new(16);
        let change = map.begin_generation(&planned(&[1, 2]));
        let ticket = change.pending[&tile(1)];
        assert!(map.claim(&ticket));
        assert!(map.publish(&ticket, TileLoadState::Loading));

        let change = map.begin_generation(&planned(&[1, 2, 3]));
        // tile 2 was never dispatched, so it is still pending
        assert!(!change.pending.contains_key(&tile(1)));
        assert!(change.pending.contains_key(&tile(2)));
        assert!(change.pending.contains_key(&tile(3)));

        assert!(map.publish(&ticket, high_res()));
        assert_eq!(map.get(&tile(1)).unwrap().generation, 2);
    }

    #[test]
    fn test_rebind_keeps_published_state() {
        let map = TileStateMap::new(16);
        let change = map.begin_generation(&planned(&[1]));
        let ticket = change.pending[&tile(1)];
        map.claim(&ticket);
        map.publish(&ticket, TileLoadState::Loading);

        let fallback = tile(1).with_source(SourceKind::SatelliteAlt);
        let rebound = map.rebind(&ticket, fallback).unwrap();
        assert!(!map.publish(&ticket, high_res()));
        assert!(map.publish(&rebound, high_res()));
        assert!(map.rebind(&ticket, fallback).is_none());

        let change = map.begin_generation(&HashSet::new());
        assert_eq!(change.cancelled, vec![fallback]);
    }
}
