use std::collections::HashSet;
use std::sync::Arc;

use crate::dynamics::Camera;
use crate::tile::{is_aabb_visible, AabbDecorator, TileId, TILE_RESOLUTION};

pub const DEFAULT_PERMISSIBLE_SCREEN_SPACE_ERROR: f64 = 2.0;

/// Selects the view-dependent tile set by walking the AABB-decorated
/// quadtree top down. Pure over a value-copied camera, so it can run on
/// the worker as well as the render thread.
#[derive(Debug, Clone)]
pub struct DrawListGenerator {
    decorator: Arc<AabbDecorator>,
    permissible_screen_space_error: f64,
    max_zoom: u8,
}

impl DrawListGenerator {
    pub fn new(decorator: Arc<AabbDecorator>, max_zoom: u8) -> Self {
        DrawListGenerator {
            decorator,
            permissible_screen_space_error: DEFAULT_PERMISSIBLE_SCREEN_SPACE_ERROR,
            max_zoom,
        }
    }

    pub fn set_permissible_screen_space_error(&mut self, threshold: f64) {
        self.permissible_screen_space_error = threshold.max(1e-3);
    }

    pub fn permissible_screen_space_error(&self) -> f64 {
        self.permissible_screen_space_error
    }

    pub fn set_aabb_decorator(&mut self, decorator: Arc<AabbDecorator>) {
        self.decorator = decorator;
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Projected size in pixels of one texel of this tile, the error that
    /// drawing the tile instead of its children would commit.
    pub fn screen_space_error(&self, id: TileId, camera: &Camera) -> f64 {
        let aabb = self.decorator.aabb(id);
        let texel_size = (aabb.max.x - aabb.min.x) / TILE_RESOLUTION as f64;
        let distance = aabb.distance_to(camera.position());
        camera.to_screen_space(texel_size, distance)
    }

    /// Top-down refinement. A node splits while its error exceeds the
    /// threshold and zoom allows; otherwise it is accepted. The result is
    /// an antichain of the quadtree: no accepted tile covers another.
    pub fn requested_set(&self, camera: &Camera) -> HashSet<TileId> {
        let mut accepted = HashSet::new();
        let mut stack = vec![TileId::root()];
        while let Some(id) = stack.pop() {
            let refine = id.zoom_level < self.max_zoom
                && self.screen_space_error(id, camera) > self.permissible_screen_space_error;
            if refine {
                stack.extend(id.children());
            } else {
                accepted.insert(id);
            }
        }
        accepted
    }

    /// Drops ids whose box lies fully outside the frustum. Conservative:
    /// keeping an invisible tile is fine, culling a visible one is not.
    pub fn cull(&self, set: &HashSet<TileId>, camera: &Camera) -> HashSet<TileId> {
        let planes = camera.planes();
        set.iter()
            .filter(|id| is_aabb_visible(&planes, &self.decorator.aabb(**id)))
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{Scheme, TileHeights, MAX_ZOOM_GEOMETRY};

    fn generator() -> DrawListGenerator {
        let mut h = TileHeights::new();
        h.emplace(TileId::root(), (100.0, 4000.0));
        DrawListGenerator::new(Arc::new(AabbDecorator::new(h)), MAX_ZOOM_GEOMETRY)
    }

    fn vienna(alt: f64) -> Camera {
        Camera::from_lat_long_alt(48.2086939, 16.3726561, alt, (1920, 1080))
    }

    #[test]
    fn requested_set_is_an_antichain() {
        let gen = generator();
        for alt in [500.0, 5_000.0, 500_000.0] {
            let set = gen.requested_set(&vienna(alt));
            assert!(!set.is_empty());
            let v: Vec<_> = set.iter().copied().collect();
            for a in &v {
                for b in &v {
                    assert!(
                        a == b || !a.is_ancestor_of(b),
                        "{a} is an ancestor of {b} (alt {alt})"
                    );
                }
            }
        }
    }

    #[test]
    fn refinement_deepens_near_the_camera() {
        let gen = generator();
        let set = gen.requested_set(&vienna(2_000.0));
        let deepest = set.iter().map(|t| t.zoom_level).max().unwrap();
        let shallowest = set.iter().map(|t| t.zoom_level).min().unwrap();
        assert!(deepest > shallowest, "uniform refinement is wrong");
        assert!(deepest >= 12, "camera at 2 km should want fine detail");
        // the whole globe stays covered by coarse tiles away from the eye
        assert!(shallowest <= 4);
    }

    #[test]
    fn max_zoom_caps_refinement() {
        let mut h = TileHeights::new();
        h.emplace(TileId::root(), (100.0, 4000.0));
        let gen = DrawListGenerator::new(Arc::new(AabbDecorator::new(h)), 6);
        let set = gen.requested_set(&vienna(100.0));
        assert!(set.iter().all(|t| t.zoom_level <= 6));
    }

    #[test]
    fn tighter_threshold_requests_more_tiles() {
        let mut gen = generator();
        let coarse = gen.requested_set(&vienna(10_000.0)).len();
        gen.set_permissible_screen_space_error(0.5);
        let fine = gen.requested_set(&vienna(10_000.0)).len();
        assert!(fine > coarse);
    }

    #[test]
    fn cull_never_drops_the_tile_under_the_camera() {
        let gen = generator();
        let cam = vienna(1_500.0);
        let set = gen.requested_set(&cam);
        let culled = gen.cull(&set, &cam);
        assert!(!culled.is_empty());
        assert!(culled.len() <= set.len());

        // the tile containing the camera footprint must survive
        let eye = crate::tile::lat_long_to_world(48.2086939, 16.3726561);
        let under = set.iter().copied().find(|id| {
            let b = crate::tile::tile_bounds(*id);
            b.min.x <= eye.x && eye.x <= b.max.x && b.min.y <= eye.y && eye.y <= b.max.y
        });
        let under = under.expect("requested set must cover the camera");
        assert!(culled.contains(&under));
        assert_eq!(under.scheme, Scheme::Tms);
    }
}
