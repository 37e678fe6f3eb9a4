use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::render::DEFAULT_GPU_QUAD_LIMIT;
use crate::scheduler::{SchedulerSettings, DEFAULT_RAM_QUAD_LIMIT};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Geodetic {
    pub lat: f64,
    pub long: f64,
    pub alt_m: f64,
}

impl From<(f64, f64, f64)> for Geodetic {
    fn from(t: (f64, f64, f64)) -> Self {
        Self {
            lat: t.0,
            long: t.1,
            alt_m: t.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Height tiles: ZXY path order, north-up rows, PNG payload.
    pub height_url: String,
    /// Ortho imagery: ZYX path order, south-up rows, JPEG payload.
    pub ortho_url: String,
    /// POI vector tiles: ZXY path order, south-up rows, raw MVT payload.
    pub poi_url: String,

    pub start_position: Geodetic,
    pub render_quality: f64,

    pub ram_quad_limit: usize,
    pub gpu_quad_limit: usize,
    pub slot_capacity: usize,
    pub rate_capacity: f64,
    pub rate_refill_per_s: f64,
    pub debounce_ms: u64,
    pub tile_timeout_s: u64,
    pub retry_max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,
    pub loader_threads: usize,

    /// Multiplier from raw 16-bit height samples to meters.
    pub height_scale: f32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            height_url: "https://alpinemaps.cg.tuwien.ac.at/tiles/alpine_png".to_string(),
            ortho_url: "https://mapsneu.wien.gv.at/basemap/bmaporthofoto30cm/normal/google3857"
                .to_string(),
            poi_url: "https://osm.cg.tuwien.ac.at/vector_tiles/poi_v1".to_string(),
            start_position: (47.0742, 12.6947, 3798.0).into(), // Grossglockner
            render_quality: 1.0,
            ram_quad_limit: DEFAULT_RAM_QUAD_LIMIT,
            gpu_quad_limit: DEFAULT_GPU_QUAD_LIMIT,
            slot_capacity: 32,
            rate_capacity: 30.0,
            rate_refill_per_s: 30.0,
            debounce_ms: 100,
            tile_timeout_s: 8,
            retry_max_attempts: 5,
            retry_base_ms: 1_000,
            retry_cap_ms: 30_000,
            loader_threads: 12,
            height_scale: 8191.875 / 65535.0,
        }
    }
}

impl Config {
    pub fn scheduler_settings(&self, max_zoom: u8) -> SchedulerSettings {
        SchedulerSettings {
            max_zoom,
            ram_quad_limit: self.ram_quad_limit,
            slot_capacity: self.slot_capacity,
            rate_capacity: self.rate_capacity,
            rate_refill_per_s: self.rate_refill_per_s,
            debounce: Duration::from_millis(self.debounce_ms),
            retry_max_attempts: self.retry_max_attempts,
            retry_base: Duration::from_millis(self.retry_base_ms),
            retry_cap: Duration::from_millis(self.retry_cap_ms),
            ancestor_padding: 2,
        }
    }

    pub fn tile_timeout(&self) -> Duration {
        Duration::from_secs(self.tile_timeout_s)
    }

    pub fn permissible_screen_space_error(&self) -> f64 {
        1.0 / self.render_quality.clamp(0.1, 2.0)
    }
}
