use std::collections::HashMap;

use crate::tile::{DataQuad, TileData, TileId};

struct QuadSlots<B> {
    id: TileId,
    tiles: [Option<TileData<B>>; 4],
}

impl<B> QuadSlots<B> {
    fn new(id: TileId) -> Self {
        QuadSlots {
            id,
            tiles: [None, None, None, None],
        }
    }

    fn is_complete(&self) -> bool {
        self.tiles.iter().all(|t| t.is_some())
    }
}

/// Joins four child-tile loads into one logical quad. A quad completes on
/// the last child, whatever its terminal status, and is emitted exactly
/// once.
pub struct QuadAssembler<B> {
    pending: HashMap<u64, QuadSlots<B>>,
}

impl<B> Default for QuadAssembler<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> QuadAssembler<B> {
    pub fn new() -> Self {
        QuadAssembler {
            pending: HashMap::new(),
        }
    }

    /// Opens a slot table for the quad. Re-opening an active quad is a
    /// no-op so that partially arrived children survive.
    pub fn begin(&mut self, quad_id: TileId) {
        self.pending
            .entry(quad_id.pack())
            .or_insert_with(|| QuadSlots::new(quad_id));
    }

    /// Records a terminal child result. Returns the complete quad when
    /// this was the last missing child; the entry is removed so a quad
    /// can never be emitted twice. Children of unknown (forgotten) quads
    /// are dropped.
    pub fn deliver(&mut self, tile: TileData<B>) -> Option<DataQuad<B>> {
        let parent = tile.id.parent()?;
        let key = parent.pack();
        let slots = self.pending.get_mut(&key)?;
        let child_index = tile.id.child_index();
        slots.tiles[child_index] = Some(tile);
        if !slots.is_complete() {
            return None;
        }
        let slots = self.pending.remove(&key)?;
        let mut tiles = slots.tiles;
        Some(DataQuad {
            id: slots.id,
            tiles: [
                tiles[0].take()?,
                tiles[1].take()?,
                tiles[2].take()?,
                tiles[3].take()?,
            ],
        })
    }

    /// Clears assembly state for a quad without emitting it.
    pub fn forget(&mut self, quad_id: TileId) {
        self.pending.remove(&quad_id.pack());
    }

    pub fn contains(&self, quad_id: TileId) -> bool {
        self.pending.contains_key(&quad_id.pack())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{NetworkInfo, NetworkStatus, Scheme};

    fn quad() -> TileId {
        TileId::new(3, 2, 5, Scheme::Tms)
    }

    fn child_data(id: TileId, status: NetworkStatus) -> TileData<u32> {
        TileData {
            id,
            network_info: NetworkInfo::now(status),
            payload: (status == NetworkStatus::Good).then_some(7),
        }
    }

    #[test]
    fn emits_exactly_once_on_last_child() {
        let mut asm = QuadAssembler::new();
        asm.begin(quad());
        let children = quad().children();
        for child in &children[..3] {
            assert!(asm
                .deliver(child_data(*child, NetworkStatus::Good))
                .is_none());
        }
        let emitted = asm
            .deliver(child_data(children[3], NetworkStatus::Good))
            .expect("last child completes the quad");
        assert_eq!(emitted.id, quad());
        assert_eq!(emitted.n_good(), 4);
        assert!(!asm.contains(quad()));

        // a straggler after emission is dropped
        assert!(asm
            .deliver(child_data(children[0], NetworkStatus::Good))
            .is_none());
    }

    #[test]
    fn failed_children_complete_the_quad_too() {
        let mut asm = QuadAssembler::new();
        asm.begin(quad());
        let children = quad().children();
        asm.deliver(child_data(children[0], NetworkStatus::Good));
        asm.deliver(child_data(children[1], NetworkStatus::NotFound));
        asm.deliver(child_data(children[2], NetworkStatus::NetworkError));
        let emitted = asm
            .deliver(child_data(children[3], NetworkStatus::Good))
            .unwrap();
        assert_eq!(emitted.n_good(), 2);
        assert_eq!(
            emitted.tiles[1].network_info.status,
            NetworkStatus::NotFound
        );
    }

    #[test]
    fn random_arrival_order_emits_each_quad_once() {
        use rand::seq::SliceRandom;
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let mut asm = QuadAssembler::new();
            let quads = [quad(), TileId::new(3, 0, 0, Scheme::Tms)];
            let mut events = Vec::new();
            for q in quads {
                asm.begin(q);
                events.extend(q.children());
            }
            events.shuffle(&mut rng);
            let mut emitted = Vec::new();
            for child in events {
                if let Some(q) = asm.deliver(child_data(child, NetworkStatus::Good)) {
                    emitted.push(q.id);
                }
            }
            emitted.sort();
            assert_eq!(emitted, {
                let mut v = quads.to_vec();
                v.sort();
                v
            });
            assert!(asm.is_empty());
        }
    }

    #[test]
    fn forget_clears_state_without_emitting() {
        let mut asm = QuadAssembler::new();
        asm.begin(quad());
        let children = quad().children();
        asm.deliver(child_data(children[0], NetworkStatus::Good));
        asm.forget(quad());
        assert!(!asm.contains(quad()));
        for child in children {
            assert!(asm
                .deliver(child_data(child, NetworkStatus::Good))
                .is_none());
        }
    }
}
