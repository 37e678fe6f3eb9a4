use cgmath::{
    Deg, EuclideanSpace, InnerSpace, Matrix, Matrix4, Point3, Vector2, Vector3, Vector4,
};

use crate::tile::{lat_long_alt_to_world, FrustumPlanes};

const NEAR_MIN: f64 = 0.1;
const NEAR_MAX: f64 = 10_000.0;

/// A value-type camera. All quantities are double precision on the CPU;
/// the f32 cut happens at the GPU boundary. Copies are cheap, which is
/// what lets the draw-list generator stay pure and thread-agnostic.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vector3<f64>,
    view: Matrix4<f64>,
    projection: Matrix4<f64>,
    viewport: (u32, u32),
    fovy: Deg<f64>,
}

impl Camera {
    pub fn look_at(
        position: Vector3<f64>,
        target: Vector3<f64>,
        up: Vector3<f64>,
        fovy: Deg<f64>,
        viewport: (u32, u32),
    ) -> Self {
        let aspect = viewport.0.max(1) as f64 / viewport.1.max(1) as f64;
        // near scales with altitude for depth precision, far covers the
        // whole visible slab of the mercator plane
        let altitude = position.z.abs().max(1.0);
        let near = (altitude * 0.25).clamp(NEAR_MIN, NEAR_MAX);
        let far = (altitude * 1e4).max(1e6);
        let projection = cgmath::perspective(fovy, aspect, near, far);
        let view = Matrix4::look_at_rh(
            Point3::from_vec(position),
            Point3::from_vec(target),
            up,
        );
        Camera {
            position,
            view,
            projection,
            viewport,
            fovy,
        }
    }

    /// Camera hovering over a geodetic position, looking straight down
    /// with north up.
    pub fn from_lat_long_alt(
        lat_deg: f64,
        long_deg: f64,
        alt_m: f64,
        viewport: (u32, u32),
    ) -> Self {
        let eye = lat_long_alt_to_world(lat_deg, long_deg, alt_m);
        let target = Vector3::new(eye.x, eye.y, 0.0);
        Camera::look_at(eye, target, Vector3::unit_y(), Deg(45.0), viewport)
    }

    pub fn position(&self) -> Vector3<f64> {
        self.position
    }

    pub fn view(&self) -> Matrix4<f64> {
        self.view
    }

    pub fn projection(&self) -> Matrix4<f64> {
        self.projection
    }

    pub fn view_projection(&self) -> Matrix4<f64> {
        self.projection * self.view
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn fovy(&self) -> Deg<f64> {
        self.fovy
    }

    pub fn set_viewport(&mut self, viewport: (u32, u32)) {
        *self = Camera::look_at_matrices(self.position, self.view, self.fovy, viewport);
    }

    fn look_at_matrices(
        position: Vector3<f64>,
        view: Matrix4<f64>,
        fovy: Deg<f64>,
        viewport: (u32, u32),
    ) -> Self {
        let aspect = viewport.0.max(1) as f64 / viewport.1.max(1) as f64;
        let altitude = position.z.abs().max(1.0);
        let near = (altitude * 0.25).clamp(NEAR_MIN, NEAR_MAX);
        let far = (altitude * 1e4).max(1e6);
        Camera {
            position,
            view,
            projection: cgmath::perspective(fovy, aspect, near, far),
            viewport,
            fovy,
        }
    }

    /// Gribb-Hartmann plane extraction from the combined matrix.
    /// Order: left, right, bottom, top, near, far.
    pub fn planes(&self) -> FrustumPlanes {
        let m = self.view_projection();
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];
        let raw: [Vector4<f64>; 6] = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            rows[3] + rows[2],
            rows[3] - rows[2],
        ];
        let mut planes = [(Vector3::new(0.0, 0.0, 1.0), 0.0); 6];
        for (i, p) in raw.iter().enumerate() {
            let normal = Vector3::new(p.x, p.y, p.z);
            let len = normal.magnitude();
            if len > 0.0 {
                planes[i] = (normal / len, p.w / len);
            }
        }
        planes
    }

    /// Projected size in pixels of a world-space length at the given
    /// distance. The spatial pixel pitch at distance d is
    /// 2 d tan(fovy / 2) / viewport_height.
    pub fn to_screen_space(&self, world_size: f64, distance: f64) -> f64 {
        let d = distance.max(NEAR_MIN);
        let fovy_rad: f64 = cgmath::Rad::from(self.fovy).0;
        world_size * self.viewport.1 as f64 / (2.0 * d * (fovy_rad / 2.0).tan())
    }

    /// Planar distance on the mercator plane, used for front-to-back
    /// draw ordering.
    pub fn planar_distance_to(&self, p: Vector2<f64>) -> f64 {
        let d = Vector2::new(self.position.x - p.x, self.position.y - p.y);
        d.magnitude()
    }
}
