mod context;
mod decode;
mod dynamics;
mod helpers;
mod render;
mod scheduler;
mod tile;

#[cfg(test)]
mod tests;

pub use context::{load_config, Config, Geodetic, RenderingContext};
pub use decode::{decode_height, decode_ortho, N_EDGE_VERTICES};
pub use dynamics::Camera;
pub use helpers::{init_logging, BwError, DecodeContext, TileLoadingContext};
pub use render::{
    build_terrain_pipeline, surface_quads, surface_quads_with_curtains, FrameUniforms, LayerPool,
    ResidentTile, TerrainPipeline, TileManager,
};
pub use scheduler::{
    DualFetcher, GpuQuadUpdate, MemoryCache, QuadAssembler, QuadDecoder, RateLimiter, Scheduler,
    SchedulerCommand, SchedulerSettings, ShipGate, SlotLimiter, TerrainPayload, TileDispatch,
    TileFetcher, TileLoadResult, TileLoadService, UrlPattern,
};
pub use tile::{
    is_aabb_visible, lat_long_alt_to_world, lat_long_to_world,
    number_of_horizontal_tiles_for_zoom_level, number_of_vertical_tiles_for_zoom_level,
    tile_bounds, world_to_lat_long, Aabb, AabbDecorator, ColourTexture, DataQuad,
    DrawListGenerator, FrustumPlanes, GpuTile, GpuTileQuad, NetworkInfo, NetworkStatus, PoiQuad,
    PoiTile, Raster, Scheme, SrsBounds, TileData, TileHeights, TileId, MAX_ZOOM_GEOMETRY,
    MAX_ZOOM_IMAGERY,
};
