use std::collections::HashMap;

use cgmath::Vector3;

use crate::tile::{tile_bounds, Aabb, Scheme, TileId};

/// Coarse min/max elevation pyramid, typically populated at zoom levels
/// 5 to 8. Queries walk up to the deepest ancestor that carries an entry.
#[derive(Debug, Clone, Default)]
pub struct TileHeights {
    entries: HashMap<u64, (f32, f32)>,
}

impl TileHeights {
    pub fn new() -> Self {
        TileHeights {
            entries: HashMap::new(),
        }
    }

    pub fn emplace(&mut self, id: TileId, min_max: (f32, f32)) {
        debug_assert!(min_max.0 <= min_max.1);
        self.entries.insert(id.to_scheme(Scheme::Tms).pack(), min_max);
    }

    pub fn query(&self, id: TileId) -> Option<(f32, f32)> {
        let mut cursor = Some(id.to_scheme(Scheme::Tms));
        while let Some(t) = cursor {
            if let Some(&range) = self.entries.get(&t.pack()) {
                return Some(range);
            }
            cursor = t.parent();
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decorates the tile-id quadtree with world-space bounding boxes.
/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AabbDecorator {
    heights: TileHeights,
    fallback: (f32, f32),
}

/// Covers everything from the Dead Sea shore to just above Mount Everest.
const GLOBAL_HEIGHT_RANGE: (f32, f32) = (-500.0, 9000.0);

impl AabbDecorator {
    pub fn new(heights: TileHeights) -> Self {
        AabbDecorator {
            heights,
            fallback: GLOBAL_HEIGHT_RANGE,
        }
    }

    pub fn with_fallback(heights: TileHeights, fallback: (f32, f32)) -> Self {
        AabbDecorator { heights, fallback }
    }

    /// x/y from the web-mercator grid, z from the deepest pyramid ancestor
    /// (global range when the pyramid has no entry on the path).
    pub fn aabb(&self, id: TileId) -> Aabb {
        let b = tile_bounds(id);
        let (z_min, z_max) = self.heights.query(id).unwrap_or(self.fallback);
        Aabb::new(
            Vector3::new(b.min.x, b.min.y, z_min as f64),
            Vector3::new(b.max.x, b.max.y, z_max as f64),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(z: u8, x: u32, y: u32) -> TileId {
        TileId::new(z, x, y, Scheme::Tms)
    }

    fn decorator() -> AabbDecorator {
        let mut h = TileHeights::new();
        h.emplace(id(0, 0, 0), (100.0, 4000.0));
        h.emplace(id(6, 33, 41), (900.0, 3100.0));
        AabbDecorator::new(h)
    }

    #[test]
    fn z_comes_from_deepest_ancestor() {
        let d = decorator();
        let root = d.aabb(id(0, 0, 0));
        assert_eq!(root.min.z, 100.0);
        assert_eq!(root.max.z, 4000.0);

        // a descendant of 6/33/41 picks the deeper, tighter range
        let deep = d.aabb(id(8, 33 * 4 + 1, 41 * 4 + 2));
        assert_eq!(deep.min.z, 900.0);
        assert_eq!(deep.max.z, 3100.0);

        // a sibling branch falls back to the root entry
        let other = d.aabb(id(8, 0, 0));
        assert_eq!(other.min.z, 100.0);
    }

    #[test]
    fn fallback_applies_without_pyramid() {
        let d = AabbDecorator::with_fallback(TileHeights::new(), (0.0, 1000.0));
        let bb = d.aabb(id(3, 1, 2));
        assert_eq!(bb.min.z, 0.0);
        assert_eq!(bb.max.z, 1000.0);
    }

    #[test]
    fn child_aabbs_nest_in_parent_xy() {
        use rand::Rng;
        let d = decorator();
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let z = rng.gen_range(0..17u8);
            let n = 1u32 << z;
            let parent = id(z, rng.gen_range(0..n), rng.gen_range(0..n));
            let pb = d.aabb(parent);
            for child in parent.children() {
                assert!(pb.contains_xy(&d.aabb(child)), "{parent} !> {child}");
            }
        }
    }
}
