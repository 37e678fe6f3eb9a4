use std::collections::HashMap;

use crate::tile::{Aabb, TileId};

#[derive(Debug, Clone)]
pub struct ResidentTile {
    pub id: TileId,
    pub layer: u32,
    pub bounds: Aabb,
    last_used: u64,
}

impl ResidentTile {
    pub fn last_used(&self) -> u64 {
        self.last_used
    }
}

/// Pure bookkeeping for the array-texture slots: which tile occupies
/// which layer. Factored out of the GPU wrapper so its invariants hold
/// with or without a device: every resident id maps to exactly one layer
/// in [0, layer_count), and admission is idempotent.
///
/// `layer_count` is the physical layer space of the backing arrays and
/// never changes; `budget` is the adjustable residency limit. Lowering
/// the budget frees layers without touching texture storage.
#[derive(Debug)]
pub struct LayerPool {
    layer_count: u32,
    budget: u32,
    free: Vec<u32>,
    resident: HashMap<u64, ResidentTile>,
    use_stamp: u64,
}

impl LayerPool {
    pub fn new(layer_count: u32) -> Self {
        LayerPool {
            layer_count,
            budget: layer_count,
            // pop order makes low layers fill first, which keeps early
            // traffic inside the first texture array
            free: (0..layer_count).rev().collect(),
            resident: HashMap::new(),
            use_stamp: 0,
        }
    }

    /// Admits a tile, handing back its layer. Re-admission of a resident
    /// tile returns the existing layer (the caller overwrites the texels,
    /// which makes redelivery idempotent). None when the budget or the
    /// layer space is exhausted.
    pub fn allocate(&mut self, id: TileId, bounds: Aabb) -> Option<u32> {
        self.use_stamp += 1;
        let stamp = self.use_stamp;
        if let Some(tile) = self.resident.get_mut(&id.pack()) {
            tile.bounds = bounds;
            tile.last_used = stamp;
            return Some(tile.layer);
        }
        if self.resident.len() >= self.budget as usize {
            return None;
        }
        let layer = self.free.pop()?;
        self.resident.insert(
            id.pack(),
            ResidentTile {
                id,
                layer,
                bounds,
                last_used: stamp,
            },
        );
        Some(layer)
    }

    /// Frees a tile's layer. Unknown ids are a no-op (deletions are
    /// allowed to race re-admission).
    pub fn release(&mut self, id: TileId) -> Option<u32> {
        let tile = self.resident.remove(&id.pack())?;
        self.free.push(tile.layer);
        Some(tile.layer)
    }

    pub fn get(&self, id: TileId) -> Option<&ResidentTile> {
        self.resident.get(&id.pack())
    }

    pub fn layer_of(&self, id: TileId) -> Option<u32> {
        self.resident.get(&id.pack()).map(|t| t.layer)
    }

    pub fn is_resident(&self, id: TileId) -> bool {
        self.resident.contains_key(&id.pack())
    }

    /// Marks a tile as used this frame, for LRU decisions on shrink.
    pub fn touch(&mut self, id: TileId) {
        self.use_stamp += 1;
        let stamp = self.use_stamp;
        if let Some(tile) = self.resident.get_mut(&id.pack()) {
            tile.last_used = stamp;
        }
    }

    /// Adjusts the residency budget; shrinking evicts least-recently-used
    /// tiles until the residents fit. Returns the evicted tiles.
    pub fn set_budget(&mut self, budget: u32) -> Vec<ResidentTile> {
        self.budget = budget.min(self.layer_count);
        let mut evicted = Vec::new();
        while self.resident.len() > self.budget as usize {
            let oldest = self
                .resident
                .values()
                .min_by_key(|t| t.last_used)
                .map(|t| t.id)
                .expect("non-empty");
            if let Some(tile) = self.resident.remove(&oldest.pack()) {
                self.free.push(tile.layer);
                evicted.push(tile);
            }
        }
        evicted
    }

    pub fn residents(&self) -> impl Iterator<Item = &ResidentTile> {
        self.resident.values()
    }

    pub fn len(&self) -> usize {
        self.resident.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resident.is_empty()
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Scheme;
    use std::collections::HashSet;

    fn id(z: u8, x: u32, y: u32) -> TileId {
        TileId::new(z, x, y, Scheme::Tms)
    }

    fn check_unique_layers(pool: &LayerPool) {
        let layers: HashSet<u32> = pool.residents().map(|t| t.layer).collect();
        assert_eq!(layers.len(), pool.len(), "duplicate layer handed out");
        assert!(layers.iter().all(|&l| l < pool.layer_count()));
    }

    #[test]
    fn every_resident_gets_a_unique_layer() {
        let mut pool = LayerPool::new(16);
        for i in 0..16u32 {
            assert!(pool.allocate(id(4, i, 0), Aabb::zero()).is_some());
            check_unique_layers(&pool);
        }
        assert!(pool.allocate(id(4, 0, 1), Aabb::zero()).is_none());
        assert_eq!(pool.len(), 16);
    }

    #[test]
    fn readmission_returns_the_same_layer() {
        let mut pool = LayerPool::new(4);
        let first = pool.allocate(id(3, 1, 1), Aabb::zero()).unwrap();
        let second = pool.allocate(id(3, 1, 1), Aabb::zero()).unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn released_layers_are_reused() {
        let mut pool = LayerPool::new(2);
        pool.allocate(id(2, 0, 0), Aabb::zero()).unwrap();
        let l = pool.allocate(id(2, 1, 0), Aabb::zero()).unwrap();
        assert!(pool.allocate(id(2, 2, 0), Aabb::zero()).is_none());
        assert_eq!(pool.release(id(2, 1, 0)), Some(l));
        assert_eq!(pool.allocate(id(2, 2, 0), Aabb::zero()), Some(l));
        check_unique_layers(&pool);
    }

    #[test]
    fn release_of_unknown_id_is_a_no_op() {
        let mut pool = LayerPool::new(2);
        assert_eq!(pool.release(id(9, 9, 9)), None);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn batches_apply_idempotently() {
        // applying the same (new, deleted) batch twice must land in the
        // same state as applying it once
        let new = [id(5, 0, 0), id(5, 1, 0)];
        let deleted = [id(5, 2, 2)];

        let apply = |pool: &mut LayerPool| {
            for d in deleted {
                pool.release(d);
            }
            for n in new {
                pool.allocate(n, Aabb::zero());
            }
        };

        let mut once = LayerPool::new(8);
        once.allocate(id(5, 2, 2), Aabb::zero());
        let mut twice = LayerPool::new(8);
        twice.allocate(id(5, 2, 2), Aabb::zero());

        apply(&mut once);
        apply(&mut twice);
        apply(&mut twice);

        let snapshot = |pool: &LayerPool| {
            let mut v: Vec<(u64, u32)> =
                pool.residents().map(|t| (t.id.pack(), t.layer)).collect();
            v.sort();
            v
        };
        assert_eq!(snapshot(&once), snapshot(&twice));
        check_unique_layers(&twice);
    }

    #[test]
    fn lowering_the_budget_evicts_least_recently_used_first() {
        let mut pool = LayerPool::new(8);
        for i in 0..6u32 {
            pool.allocate(id(4, i, 0), Aabb::zero());
        }
        pool.touch(id(4, 0, 0));
        pool.touch(id(4, 1, 0));

        let evicted = pool.set_budget(3);
        assert_eq!(evicted.len(), 3);
        let evicted_ids: HashSet<u64> = evicted.iter().map(|t| t.id.pack()).collect();
        for i in [2u32, 3, 4] {
            assert!(evicted_ids.contains(&id(4, i, 0).pack()));
        }
        assert!(pool.layer_of(id(4, 0, 0)).is_some());
        assert!(pool.layer_of(id(4, 1, 0)).is_some());
        check_unique_layers(&pool);

        // the freed layers honour the new budget
        assert!(pool.allocate(id(4, 9, 9), Aabb::zero()).is_none());
        pool.release(id(4, 5, 0));
        assert!(pool.allocate(id(4, 9, 9), Aabb::zero()).is_some());
    }
}
