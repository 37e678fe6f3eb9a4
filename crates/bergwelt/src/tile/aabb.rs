use cgmath::{InnerSpace, Vector3, Zero};

/// World-space axis-aligned box, EPSG:3857 x/y plus meters z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Aabb {
    pub fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Aabb { min, max }
    }

    pub fn zero() -> Self {
        Aabb {
            min: Vector3::zero(),
            max: Vector3::zero(),
        }
    }

    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn centre(&self) -> Vector3<f64> {
        (self.min + self.max) / 2.0
    }

    pub fn corners(&self) -> [Vector3<f64>; 8] {
        let mut corners = [Vector3::zero(); 8];
        for (i, c) in corners.iter_mut().enumerate() {
            *c = Vector3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
        }
        corners
    }

    pub fn contains_xy(&self, other: &Aabb) -> bool {
        const EPS: f64 = 1e-6;
        self.min.x <= other.min.x + EPS
            && self.min.y <= other.min.y + EPS
            && self.max.x + EPS >= other.max.x
            && self.max.y + EPS >= other.max.y
    }

    /// Distance from a point to the box, 0 inside.
    pub fn distance_to(&self, p: Vector3<f64>) -> f64 {
        let clamped = Vector3::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        );
        (p - clamped).magnitude()
    }
}

/// (unit normal, d) pairs; a point q is inside the half space when
/// dot(n, q) + d >= 0. Order: left, right, bottom, top, near, far.
pub type FrustumPlanes = [(Vector3<f64>, f64); 6];

/// Conservative AABB-vs-frustum test. May report an outside box as
/// visible (false positive); never culls a visible one.
pub fn is_aabb_visible(planes: &FrustumPlanes, bb: &Aabb) -> bool {
    for &(normal, d) in planes {
        // p-vertex: the corner furthest along the plane normal
        let p = Vector3::new(
            if normal.x >= 0.0 { bb.max.x } else { bb.min.x },
            if normal.y >= 0.0 { bb.max.y } else { bb.min.y },
            if normal.z >= 0.0 { bb.max.z } else { bb.min.z },
        );
        if normal.dot(p) + d < 0.0 {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb {
        Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn corners_span_the_box() {
        let c = unit_box().corners();
        assert_eq!(c.len(), 8);
        assert!(c.contains(&Vector3::new(0.0, 0.0, 0.0)));
        assert!(c.contains(&Vector3::new(1.0, 1.0, 1.0)));
        assert!(c.contains(&Vector3::new(1.0, 0.0, 1.0)));
    }

    #[test]
    fn distance_is_zero_inside_and_euclidean_outside() {
        let bb = unit_box();
        assert_eq!(bb.distance_to(Vector3::new(0.5, 0.5, 0.5)), 0.0);
        assert!((bb.distance_to(Vector3::new(2.0, 0.5, 0.5)) - 1.0).abs() < 1e-12);
        let d = bb.distance_to(Vector3::new(2.0, 2.0, 1.0));
        assert!((d - std::f64::consts::SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn half_space_test_culls_and_keeps() {
        // single plane x >= 2
        let planes: FrustumPlanes = [
            (Vector3::new(1.0, 0.0, 0.0), -2.0),
            (Vector3::new(0.0, 0.0, 1.0), 1e9),
            (Vector3::new(0.0, 0.0, 1.0), 1e9),
            (Vector3::new(0.0, 0.0, 1.0), 1e9),
            (Vector3::new(0.0, 0.0, 1.0), 1e9),
            (Vector3::new(0.0, 0.0, 1.0), 1e9),
        ];
        assert!(!is_aabb_visible(&planes, &unit_box()));
        let shifted = Aabb::new(Vector3::new(1.5, 0.0, 0.0), Vector3::new(2.5, 1.0, 1.0));
        assert!(is_aabb_visible(&planes, &shifted));
    }
}
