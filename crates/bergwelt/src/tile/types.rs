use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::tile::{Aabb, TileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Good,
    NotFound,
    NetworkError,
}

impl NetworkStatus {
    /// Whether the pipeline may retry this status.
    pub fn is_transient(&self) -> bool {
        matches!(self, NetworkStatus::NetworkError)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub timestamp_ms: u64,
}

impl NetworkInfo {
    pub fn now(status: NetworkStatus) -> Self {
        NetworkInfo {
            status,
            timestamp_ms: now_ms(),
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One tile as it comes out of the network layer. The payload stays
/// opaque here; interpretation belongs to the consuming pipeline.
#[derive(Debug, Clone)]
pub struct TileData<B> {
    pub id: TileId,
    pub network_info: NetworkInfo,
    pub payload: Option<B>,
}

impl<B> TileData<B> {
    pub fn is_good(&self) -> bool {
        self.network_info.status == NetworkStatus::Good && self.payload.is_some()
    }
}

/// A complete four-child bundle, keyed by the parent id. Children keep
/// their terminal status; a failed child never blocks the bundle.
#[derive(Debug, Clone)]
pub struct DataQuad<B> {
    pub id: TileId,
    pub tiles: [TileData<B>; 4],
}

impl<B> DataQuad<B> {
    pub const N_TILES: usize = 4;

    pub fn n_good(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_good()).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

impl<T: Copy> Raster<T> {
    pub fn new(width: u32, height: u32, fill: T) -> Self {
        Raster {
            width,
            height,
            data: vec![fill; (width * height) as usize],
        }
    }

    pub fn from_vec(width: u32, height: u32, data: Vec<T>) -> Option<Self> {
        if data.len() != (width * height) as usize {
            return None;
        }
        Some(Raster {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> T {
        self.data[(y * self.width + x) as usize]
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Nearest-neighbour resample to a new square size.
    pub fn resampled(&self, size: u32) -> Raster<T> {
        if self.width == size && self.height == size {
            return self.clone();
        }
        let mut data = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            let sy = (y as u64 * (self.height as u64 - 1) / (size as u64 - 1).max(1)) as u32;
            for x in 0..size {
                let sx = (x as u64 * (self.width as u64 - 1) / (size as u64 - 1).max(1)) as u32;
                data.push(self.pixel(sx, sy));
            }
        }
        Raster {
            width: size,
            height: size,
            data,
        }
    }
}

/// Decoded RGBA8 image data ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ColourTexture {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ColourTexture {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != (width * height * 4) as usize {
            return None;
        }
        Some(ColourTexture {
            width,
            height,
            data,
        })
    }

    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        ColourTexture {
            width,
            height,
            data: rgba.repeat((width * height) as usize),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn n_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// One decoded tile as shipped to the GPU side. Ownership moves to the
/// render thread on delivery.
#[derive(Debug, Clone)]
pub struct GpuTile {
    pub id: TileId,
    pub bounds: Aabb,
    pub height: Raster<u16>,
    pub ortho: ColourTexture,
}

#[derive(Debug, Clone)]
pub struct GpuTileQuad {
    pub id: TileId,
    pub tiles: [GpuTile; 4],
}

/// Point-of-interest tile payload; stays raw MVT bytes here, parsing is
/// the label subsystem's business.
#[derive(Debug, Clone)]
pub struct PoiTile {
    pub id: TileId,
    pub data: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct PoiQuad {
    pub id: TileId,
    pub tiles: [PoiTile; 4],
}
