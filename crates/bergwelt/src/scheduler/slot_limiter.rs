use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::tile::TileId;

pub const DEFAULT_SLOT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueuedQuad {
    batch: u64,
    id: TileId,
}

impl Ord for QueuedQuad {
    fn cmp(&self, other: &Self) -> Ordering {
        // released order: earliest batch first, deeper zoom first within a
        // batch (detail nearest the camera), id as a stable tiebreak
        other
            .batch
            .cmp(&self.batch)
            .then(self.id.zoom_level.cmp(&other.id.zoom_level))
            .then(other.id.cmp(&self.id))
    }
}

impl PartialOrd for QueuedQuad {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Caps the number of quads in flight. Overflow requests queue and are
/// released one-for-one as in-flight quads complete.
#[derive(Debug)]
pub struct SlotLimiter {
    capacity: usize,
    in_flight: HashSet<u64>,
    queued: HashSet<u64>,
    queue: BinaryHeap<QueuedQuad>,
}

impl SlotLimiter {
    pub fn new(capacity: usize) -> Self {
        SlotLimiter {
            capacity: capacity.max(1),
            in_flight: HashSet::new(),
            queued: HashSet::new(),
            queue: BinaryHeap::new(),
        }
    }

    /// Returns true when the quad may start immediately. A re-request of
    /// a queued or in-flight quad is a no-op (returns false).
    pub fn request(&mut self, id: TileId, batch: u64) -> bool {
        let key = id.pack();
        if self.in_flight.contains(&key) || self.queued.contains(&key) {
            return false;
        }
        if self.in_flight.len() < self.capacity {
            self.in_flight.insert(key);
            true
        } else {
            self.queued.insert(key);
            self.queue.push(QueuedQuad { batch, id });
            false
        }
    }

    /// Completes an in-flight quad (success or failure alike) and moves
    /// the next queued quad into flight, if any.
    pub fn complete(&mut self, id: TileId) -> Option<TileId> {
        if !self.in_flight.remove(&id.pack()) {
            return None;
        }
        while let Some(next) = self.queue.pop() {
            let key = next.id.pack();
            if self.queued.remove(&key) {
                self.in_flight.insert(key);
                return Some(next.id);
            }
            // stale heap entry from forget(); skip
        }
        None
    }

    /// Drops a quad that is still queued. In-flight quads are left to
    /// complete (the heap entry is lazily discarded).
    pub fn forget_queued(&mut self, id: TileId) {
        self.queued.remove(&id.pack());
    }

    pub fn queued_ids(&self) -> Vec<TileId> {
        self.queued.iter().map(|&key| TileId::unpack(key)).collect()
    }

    pub fn is_pending(&self, id: TileId) -> bool {
        let key = id.pack();
        self.in_flight.contains(&key) || self.queued.contains(&key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Scheme;

    fn id(z: u8, x: u32, y: u32) -> TileId {
        TileId::new(z, x, y, Scheme::Tms)
    }

    #[test]
    fn in_flight_never_exceeds_capacity() {
        let mut limiter = SlotLimiter::new(3);
        let mut started = Vec::new();
        for i in 0..10u32 {
            if limiter.request(id(5, i, 0), 1) {
                started.push(i);
            }
            assert!(limiter.in_flight_count() <= 3);
        }
        assert_eq!(started.len(), 3);
        assert_eq!(limiter.queued_count(), 7);

        for i in started {
            let released = limiter.complete(id(5, i, 0));
            assert!(released.is_some());
            assert!(limiter.in_flight_count() <= 3);
        }
    }

    #[test]
    fn queue_releases_deeper_zoom_first_within_a_batch() {
        let mut limiter = SlotLimiter::new(1);
        assert!(limiter.request(id(3, 0, 0), 1));
        limiter.request(id(4, 0, 0), 2);
        limiter.request(id(9, 0, 0), 2);
        limiter.request(id(6, 0, 0), 2);

        assert_eq!(limiter.complete(id(3, 0, 0)), Some(id(9, 0, 0)));
        assert_eq!(limiter.complete(id(9, 0, 0)), Some(id(6, 0, 0)));
        assert_eq!(limiter.complete(id(6, 0, 0)), Some(id(4, 0, 0)));
        assert_eq!(limiter.complete(id(4, 0, 0)), None);
    }

    #[test]
    fn earlier_batches_win_over_deeper_zoom() {
        let mut limiter = SlotLimiter::new(1);
        assert!(limiter.request(id(3, 0, 0), 1));
        limiter.request(id(4, 0, 0), 1);
        limiter.request(id(12, 0, 0), 2);
        assert_eq!(limiter.complete(id(3, 0, 0)), Some(id(4, 0, 0)));
    }

    #[test]
    fn re_request_is_a_no_op() {
        let mut limiter = SlotLimiter::new(1);
        assert!(limiter.request(id(3, 0, 0), 1));
        assert!(!limiter.request(id(3, 0, 0), 2));
        limiter.request(id(4, 0, 0), 2);
        assert!(!limiter.request(id(4, 0, 0), 3));
        assert_eq!(limiter.queued_count(), 1);
    }

    #[test]
    fn forgotten_queued_quads_are_skipped_on_release() {
        let mut limiter = SlotLimiter::new(1);
        assert!(limiter.request(id(3, 0, 0), 1));
        limiter.request(id(4, 0, 0), 1);
        limiter.request(id(5, 0, 0), 1);
        limiter.forget_queued(id(5, 0, 0));
        assert_eq!(limiter.complete(id(3, 0, 0)), Some(id(4, 0, 0)));
        assert_eq!(limiter.complete(id(4, 0, 0)), None);
    }
}
