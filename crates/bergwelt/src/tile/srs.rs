use cgmath::{Vector2, Vector3};

use crate::tile::{Scheme, TileId};

/// Half the web-mercator world extent, meters (pi * WGS84 semi-major axis).
pub const ORIGIN_SHIFT: f64 = 20037508.342789244;

/// Texel count along one tile edge; drives the meters-per-texel error metric.
pub const TILE_RESOLUTION: u32 = 256;

pub fn number_of_horizontal_tiles_for_zoom_level(z: u8) -> u32 {
    1u32 << z
}

pub fn number_of_vertical_tiles_for_zoom_level(z: u8) -> u32 {
    1u32 << z
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SrsBounds {
    pub min: Vector2<f64>,
    pub max: Vector2<f64>,
}

impl SrsBounds {
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn contains(&self, other: &SrsBounds) -> bool {
        const EPS: f64 = 1e-6;
        self.min.x <= other.min.x + EPS
            && self.min.y <= other.min.y + EPS
            && self.max.x + EPS >= other.max.x
            && self.max.y + EPS >= other.max.y
    }
}

/// EPSG:3857 bounds of a tile. Row 0 sits at the south edge (TMS
/// convention, which everything internal uses).
pub fn tile_bounds(id: TileId) -> SrsBounds {
    let id = id.to_scheme(Scheme::Tms);
    let n = number_of_horizontal_tiles_for_zoom_level(id.zoom_level) as f64;
    let side = 2.0 * ORIGIN_SHIFT / n;
    let min = Vector2::new(
        -ORIGIN_SHIFT + id.x as f64 * side,
        -ORIGIN_SHIFT + id.y as f64 * side,
    );
    SrsBounds {
        min,
        max: min + Vector2::new(side, side),
    }
}

pub fn lat_long_to_world(lat_deg: f64, long_deg: f64) -> Vector2<f64> {
    let x = long_deg / 180.0 * ORIGIN_SHIFT;
    let lat = lat_deg.to_radians();
    let y = (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln() / std::f64::consts::PI
        * ORIGIN_SHIFT;
    Vector2::new(x, y)
}

/// Returns (lat, long) in degrees.
pub fn world_to_lat_long(p: Vector2<f64>) -> (f64, f64) {
    let long = p.x / ORIGIN_SHIFT * 180.0;
    let lat_rad =
        2.0 * ((p.y / ORIGIN_SHIFT * std::f64::consts::PI).exp().atan()) - std::f64::consts::FRAC_PI_2;
    (lat_rad.to_degrees(), long)
}

/// Altitude is stretched by the local mercator scale factor so that
/// vertical distances keep their proportion to horizontal ones.
pub fn lat_long_alt_to_world(lat_deg: f64, long_deg: f64, alt_m: f64) -> Vector3<f64> {
    let xy = lat_long_to_world(lat_deg, long_deg);
    let z = alt_m / lat_deg.to_radians().cos().abs();
    Vector3::new(xy.x, xy.y, z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Scheme;

    fn id(z: u8, x: u32, y: u32) -> TileId {
        TileId::new(z, x, y, Scheme::Tms)
    }

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() <= eps
    }

    #[test]
    fn number_of_tiles_per_level() {
        assert_eq!(number_of_horizontal_tiles_for_zoom_level(0), 1);
        assert_eq!(number_of_horizontal_tiles_for_zoom_level(1), 2);
        assert_eq!(number_of_horizontal_tiles_for_zoom_level(4), 16);
        assert_eq!(number_of_vertical_tiles_for_zoom_level(0), 1);
        assert_eq!(number_of_vertical_tiles_for_zoom_level(4), 16);
    }

    #[test]
    fn bounds_of_root_and_zoom_one() {
        let b = ORIGIN_SHIFT;
        let root = tile_bounds(id(0, 0, 0));
        assert!(close(root.min.x, -b, 1e-6) && close(root.min.y, -b, 1e-6));
        assert!(close(root.max.x, b, 1e-6) && close(root.max.y, b, 1e-6));

        // y tile 0 is south
        let sw = tile_bounds(id(1, 0, 0));
        assert!(close(sw.min.x, -b, 1e-6) && close(sw.min.y, -b, 1e-6));
        assert!(close(sw.max.x, 0.0, 1e-6) && close(sw.max.y, 0.0, 1e-6));

        let nw = tile_bounds(id(1, 0, 1));
        assert!(close(nw.min.y, 0.0, 1e-6) && close(nw.max.y, b, 1e-6));

        let se = tile_bounds(id(1, 1, 0));
        assert!(close(se.min.x, 0.0, 1e-6) && close(se.max.y, 0.0, 1e-6));
    }

    #[test]
    fn bounds_of_deep_tile_match_terrain_builder() {
        // computed with the alpine terrain builder
        let b = tile_bounds(id(16, 34420, 42241));
        assert!(close(b.min.x, 1010191.76581689, 1e-5));
        assert!(close(b.min.y, 5792703.751563799, 1e-5));
        assert!(close(b.max.x, 1010803.262043171, 1e-5));
        assert!(close(b.max.y, 5793315.24779008, 1e-5));
    }

    #[test]
    fn child_bounds_nest_in_parent_bounds() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let z = rng.gen_range(0..18u8);
            let n = 1u32 << z;
            let parent = id(z, rng.gen_range(0..n), rng.gen_range(0..n));
            let pb = tile_bounds(parent);
            for child in parent.children() {
                assert!(pb.contains(&tile_bounds(child)), "{parent} !> {child}");
            }
        }
    }

    #[test]
    fn srs_conversion_known_points() {
        assert!(close(lat_long_to_world(0.0, 0.0).x, 0.0, 1e-4));
        assert!(close(lat_long_to_world(0.0, 0.0).y, 0.0, 1e-4));

        let max_lat = 85.05112878;
        let p = lat_long_to_world(max_lat, 180.0);
        assert!(close(p.x, 20037508.342789244, 1e-4));
        assert!(close(p.y, 20037508.342789244, 1e-3));

        // https://epsg.io/transform#s_srs=4326&t_srs=3857&x=16.3726561&y=48.2086939
        let p = lat_long_to_world(48.2086939, 16.3726561);
        assert!(close(p.x, 1822595.7412222677, 1e-4));
        assert!(close(p.y, 6141644.553721141, 1e-4));
    }

    #[test]
    fn srs_conversion_two_way() {
        for (lat, long) in [
            (48.2086939, 16.3726561),
            (12.565, -125.54),
            (-12.565, -165.54),
            (-65.565, 135.54),
            (85.0, 179.9),
            (-85.0, -179.9),
        ] {
            let (lat2, long2) = world_to_lat_long(lat_long_to_world(lat, long));
            assert!(close(lat, lat2, 1e-6), "lat {lat} -> {lat2}");
            assert!(close(long, long2, 1e-6), "long {long} -> {long2}");
        }
    }

    #[test]
    fn srs_conversion_with_height() {
        let p = lat_long_alt_to_world(0.0, 0.0, 10.0);
        assert!(close(p.z, 10.0, 1e-6));

        let (lat, long, alt) = (48.2086939, 16.3726561, 100.0);
        let p = lat_long_alt_to_world(lat, long, alt);
        let xy = lat_long_to_world(lat, long);
        assert!(close(p.x, xy.x, 1e-9) && close(p.y, xy.y, 1e-9));
        assert!(p.z >= alt);
        assert!(close(p.z, alt / lat.to_radians().cos().abs(), 1e-9));
    }
}
