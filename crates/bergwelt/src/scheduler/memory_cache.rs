use std::collections::{BTreeMap, HashMap};

use crate::tile::{DataQuad, TileId};

pub const DEFAULT_RAM_QUAD_LIMIT: usize = 12_000;

struct CacheEntry<B> {
    quad: DataQuad<B>,
    last_access: u64,
}

/// Content-addressed RAM cache of complete quads, LRU-evicted against a
/// fixed quad limit. Single-writer: lives on the scheduler's worker
/// thread and is never shared.
///
/// Evictions are returned synchronously and in LRU order so the caller
/// can forward them as deletions to the GPU side.
pub struct MemoryCache<B> {
    quad_limit: usize,
    entries: HashMap<u64, CacheEntry<B>>,
    recency: BTreeMap<u64, u64>,
    access_seq: u64,
}

impl<B> MemoryCache<B> {
    pub fn new(quad_limit: usize) -> Self {
        MemoryCache {
            quad_limit: quad_limit.max(1),
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            access_seq: 0,
        }
    }

    fn bump(&mut self, key: u64) {
        if let Some(entry) = self.entries.get_mut(&key) {
            self.recency.remove(&entry.last_access);
            self.access_seq += 1;
            entry.last_access = self.access_seq;
            self.recency.insert(self.access_seq, key);
        }
    }

    fn evict_down_to(&mut self, limit: usize) -> Vec<TileId> {
        let mut evicted = Vec::new();
        while self.entries.len() > limit {
            let Some((&seq, &key)) = self.recency.iter().next() else {
                break;
            };
            self.recency.remove(&seq);
            if let Some(entry) = self.entries.remove(&key) {
                evicted.push(entry.quad.id);
            }
        }
        evicted
    }

    /// Inserts (or replaces) a quad and returns the quads this pushed
    /// out, least recently used first.
    pub fn insert(&mut self, quad: DataQuad<B>) -> Vec<TileId> {
        let key = quad.id.pack();
        self.access_seq += 1;
        if let Some(old) = self.entries.insert(
            key,
            CacheEntry {
                quad,
                last_access: self.access_seq,
            },
        ) {
            self.recency.remove(&old.last_access);
        }
        self.recency.insert(self.access_seq, key);
        self.evict_down_to(self.quad_limit)
    }

    /// Presence check that counts as a use.
    pub fn contains(&mut self, id: TileId) -> bool {
        let key = id.pack();
        if self.entries.contains_key(&key) {
            self.bump(key);
            true
        } else {
            false
        }
    }

    /// Presence check without touching recency, for planning and gates.
    pub fn peek(&self, id: TileId) -> bool {
        self.entries.contains_key(&id.pack())
    }

    pub fn get(&mut self, id: TileId) -> Option<&DataQuad<B>> {
        let key = id.pack();
        if !self.entries.contains_key(&key) {
            return None;
        }
        self.bump(key);
        self.entries.get(&key).map(|e| &e.quad)
    }

    /// Shrinks (or grows) the limit; shrinking reports the overflow in
    /// LRU order.
    pub fn set_quad_limit(&mut self, quad_limit: usize) -> Vec<TileId> {
        self.quad_limit = quad_limit.max(1);
        self.evict_down_to(self.quad_limit)
    }

    pub fn quad_limit(&self) -> usize {
        self.quad_limit
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
