use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rayon::prelude::*;
use threadpool::ThreadPool;

use crate::context::Config;
use crate::decode::{decode_height_for_gpu, decode_ortho, N_EDGE_VERTICES};
use crate::helpers::channel::{channel, Receiver, RecvTimeoutError, Sender};
use crate::helpers::BwError;
use crate::scheduler::{
    DualFetcher, GpuQuadUpdate, Scheduler, SchedulerCommand, TerrainPayload, TileFetcher,
    TileLoadResult, TileLoadService, UrlPattern,
};
use crate::tile::{
    now_ms, AabbDecorator, ColourTexture, DataQuad, GpuTile, GpuTileQuad, PoiQuad, PoiTile,
    Raster, TileId, MAX_ZOOM_GEOMETRY,
};

/// Everything the single worker thread reacts to, multiplexed over one
/// channel so timers and completions interleave deterministically.
pub enum WorkerEvent {
    Command(SchedulerCommand),
    TerrainLoaded(TileLoadResult<TerrainPayload>),
    PoiLoaded(TileLoadResult<Bytes>),
}

pub struct WorkerHandle {
    pub event_tx: Sender<WorkerEvent>,
    pub terrain_rx: Receiver<GpuQuadUpdate<GpuTileQuad>>,
    pub poi_rx: Receiver<GpuQuadUpdate<PoiQuad>>,
    pub stopped_rx: Receiver<()>,
    pub join: Option<JoinHandle<()>>,
}

const EVENT_CHANNEL_BOUND: usize = 1024;
const GPU_CHANNEL_BOUND: usize = 256;
const IDLE_TIMEOUT: Duration = Duration::from_millis(250);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawns the worker thread hosting the terrain and POI scheduler
/// chains. Returns once the worker signalled readiness.
pub fn spawn_worker(config: &Config, decorator: Arc<AabbDecorator>) -> Result<WorkerHandle, BwError> {
    let timeout = config.tile_timeout();
    let heights = TileLoadService::with_timeout(
        &config.height_url,
        UrlPattern::Zxy,
        crate::tile::Scheme::SlippyMap,
        "png",
        timeout,
    )?;
    let ortho = TileLoadService::with_timeout(
        &config.ortho_url,
        UrlPattern::Zyx,
        crate::tile::Scheme::Tms,
        "jpeg",
        timeout,
    )?;
    let poi = TileLoadService::with_timeout(
        &config.poi_url,
        UrlPattern::Zxy,
        crate::tile::Scheme::Tms,
        "",
        timeout,
    )?;

    let pool = ThreadPool::with_name(
        "bw-loader".to_string(),
        config.loader_threads.clamp(1, num_cpus::get().max(4) * 2),
    );

    let (event_tx, event_rx) = channel::<WorkerEvent>(EVENT_CHANNEL_BOUND);
    let (terrain_gpu_tx, terrain_rx) = channel(GPU_CHANNEL_BOUND);
    let (poi_gpu_tx, poi_rx) = channel(GPU_CHANNEL_BOUND);
    let (ready_tx, ready_rx) = channel::<()>(1);
    let (stopped_tx, stopped_rx) = channel::<()>(1);

    let now = Instant::now();
    let terrain_scheduler = Scheduler::new(
        config.scheduler_settings(MAX_ZOOM_GEOMETRY),
        Arc::clone(&decorator),
        pooled_dispatch(&pool, Arc::new(DualFetcher { heights, ortho }), &event_tx, WorkerEvent::TerrainLoaded),
        Box::new(decode_terrain_quad),
        terrain_gpu_tx,
        now,
    );
    let poi_scheduler = Scheduler::new(
        config.scheduler_settings(MAX_ZOOM_GEOMETRY),
        Arc::clone(&decorator),
        pooled_dispatch(&pool, Arc::new(poi), &event_tx, WorkerEvent::PoiLoaded),
        Box::new(decode_poi_quad),
        poi_gpu_tx,
        now,
    );

    let join = std::thread::Builder::new()
        .name("bw-tile-worker".to_string())
        .spawn(move || {
            let _ = ready_tx.send(());
            worker_loop(event_rx, terrain_scheduler, poi_scheduler);
            let _ = stopped_tx.send(());
        })
        .map_err(|e| BwError::Internal(format!("Failed to spawn worker thread: {e}")))?;

    // one-shot startup barrier: construction and teardown are serialized
    if ready_rx.recv_timeout(STARTUP_TIMEOUT).is_err() {
        return Err(BwError::Internal("Worker thread failed to start".into()));
    }

    Ok(WorkerHandle {
        event_tx,
        terrain_rx,
        poi_rx,
        stopped_rx,
        join: Some(join),
    })
}

/// Wraps a fetcher into the scheduler's dispatch hook: each child fetch
/// runs as one blocking job on the loader pool and reports back through
/// the worker's event channel.
fn pooled_dispatch<F, E>(
    pool: &ThreadPool,
    fetcher: Arc<F>,
    event_tx: &Sender<WorkerEvent>,
    wrap: E,
) -> Box<dyn FnMut(TileId) + Send>
where
    F: TileFetcher,
    E: Fn(TileLoadResult<F::Payload>) -> WorkerEvent + Send + Copy + 'static,
{
    let pool = pool.clone();
    let event_tx = event_tx.clone();
    Box::new(move |id: TileId| {
        let fetcher = Arc::clone(&fetcher);
        let event_tx = event_tx.clone();
        pool.execute(move || {
            let (payload, status) = fetcher.fetch(id);
            // a dropped receiver just means we are shutting down
            let _ = event_tx.send(wrap(TileLoadResult {
                id,
                payload,
                status,
                timestamp_ms: now_ms(),
            }));
        });
    })
}

fn worker_loop(
    event_rx: Receiver<WorkerEvent>,
    mut terrain: Scheduler<TerrainPayload, GpuTileQuad>,
    mut poi: Scheduler<Bytes, PoiQuad>,
) {
    let always = |_: TileId| true;
    loop {
        let now = Instant::now();
        let deadline = [terrain.next_deadline(now), poi.next_deadline(now)]
            .into_iter()
            .flatten()
            .min();
        let timeout = deadline
            .map(|d| d.saturating_duration_since(now))
            .unwrap_or(IDLE_TIMEOUT)
            .min(IDLE_TIMEOUT);

        match event_rx.recv_timeout(timeout) {
            Ok(WorkerEvent::Command(command)) => {
                let now = Instant::now();
                match command {
                    SchedulerCommand::CameraUpdated(camera) => {
                        terrain.set_camera(camera.clone(), now);
                        poi.set_camera(camera, now);
                    }
                    SchedulerCommand::SetQuality(quality) => {
                        terrain.set_quality(quality, now);
                        poi.set_quality(quality, now);
                    }
                    SchedulerCommand::SetNetworkReachability(reachable) => {
                        terrain.set_reachability(reachable, now);
                        poi.set_reachability(reachable, now);
                    }
                    SchedulerCommand::SetRamQuadLimit(limit) => {
                        terrain.set_ram_quad_limit(limit);
                        poi.set_ram_quad_limit(limit);
                    }
                    SchedulerCommand::Quit => break,
                }
            }
            Ok(WorkerEvent::TerrainLoaded(result)) => {
                terrain.on_tile_loaded(result, Instant::now(), &always);
                // a terrain arrival may open the POI ship gate
                let gate = |id: TileId| terrain.cache_contains(id);
                poi.ship_ready(&gate);
            }
            Ok(WorkerEvent::PoiLoaded(result)) => {
                let gate = |id: TileId| terrain.cache_contains(id);
                poi.on_tile_loaded(result, Instant::now(), &gate);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        terrain.tick(now, &always);
        let gate = |id: TileId| terrain.cache_contains(id);
        poi.tick(now, &gate);
    }
    log::info!("Tile worker stopped");
}

/// Decodes a raw terrain quad into GPU-ready rasters. Failed or
/// undecodable children keep their slot with neutral content so the quad
/// shape stays intact; the error itself never travels to the GPU side.
pub fn decode_terrain_quad(quad: &DataQuad<TerrainPayload>, decorator: &AabbDecorator) -> GpuTileQuad {
    let tiles: Vec<GpuTile> = quad
        .tiles
        .par_iter()
        .map(|tile| {
            let bounds = decorator.aabb(tile.id);
            let decoded = tile.payload.as_ref().filter(|_| tile.is_good()).and_then(
                |payload| match (
                    decode_height_for_gpu(&payload.height),
                    decode_ortho(&payload.ortho),
                ) {
                    (Ok(height), Ok(ortho)) => Some((height, ortho)),
                    (Err(e), _) | (_, Err(e)) => {
                        // a malformed payload counts as missing, no retry
                        log::warn!("Dropping undecodable tile {}: {}", tile.id, e);
                        None
                    }
                },
            );
            let (height, ortho) = decoded.unwrap_or_else(|| {
                (
                    Raster::new(N_EDGE_VERTICES, N_EDGE_VERTICES, 0),
                    ColourTexture::filled(256, 256, [255, 255, 255, 255]),
                )
            });
            GpuTile {
                id: tile.id,
                bounds,
                height,
                ortho,
            }
        })
        .collect();
    let tiles: [GpuTile; 4] = tiles.try_into().expect("a quad has exactly four tiles");
    GpuTileQuad { id: quad.id, tiles }
}

pub fn decode_poi_quad(quad: &DataQuad<Bytes>, _decorator: &AabbDecorator) -> PoiQuad {
    PoiQuad {
        id: quad.id,
        tiles: [0, 1, 2, 3].map(|i| PoiTile {
            id: quad.tiles[i].id,
            data: quad.tiles[i].payload.clone(),
        }),
    }
}
