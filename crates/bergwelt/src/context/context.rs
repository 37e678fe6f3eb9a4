use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::context::{spawn_worker, Config, WorkerEvent, WorkerHandle};
use crate::dynamics::Camera;
use crate::helpers::BwError;
use crate::render::{build_terrain_pipeline, FrameUniforms, TerrainPipeline, TileManager};
use crate::scheduler::{GpuQuadUpdate, SchedulerCommand};
use crate::tile::{AabbDecorator, DrawListGenerator, PoiQuad, TileHeights, TileId, MAX_ZOOM_GEOMETRY};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Wires the whole streaming stack together: owns the worker thread with
/// its scheduler chains on one side and the GPU tile manager on the
/// other. Lives on the render thread.
pub struct RenderingContext {
    config: Config,
    decorator: Arc<AabbDecorator>,
    draw_list: DrawListGenerator,
    tile_manager: TileManager,
    pipeline: TerrainPipeline,
    worker: WorkerHandle,
}

impl RenderingContext {
    /// `heights` is the coarse min/max elevation pyramid the AABB
    /// decorator is built from; collaborators fetch it at startup.
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        config: Config,
        heights: TileHeights,
    ) -> Result<Self, BwError> {
        let decorator = Arc::new(AabbDecorator::new(heights));

        let mut draw_list =
            DrawListGenerator::new(Arc::clone(&decorator), MAX_ZOOM_GEOMETRY);
        draw_list.set_permissible_screen_space_error(config.permissible_screen_space_error());

        let mut tile_manager = TileManager::new(device, config.gpu_quad_limit);
        tile_manager.set_aabb_decorator(Arc::clone(&decorator));
        let pipeline =
            build_terrain_pipeline(device, surface_format, tile_manager.bind_group_layout());

        let worker = spawn_worker(&config, Arc::clone(&decorator))?;

        Ok(RenderingContext {
            config,
            decorator,
            draw_list,
            tile_manager,
            pipeline,
            worker,
        })
    }

    pub fn tile_manager(&self) -> &TileManager {
        &self.tile_manager
    }

    pub fn decorator(&self) -> &Arc<AabbDecorator> {
        &self.decorator
    }

    // ---------- worker-facing controls ----------

    pub fn update_camera(&self, camera: Camera) {
        self.send(SchedulerCommand::CameraUpdated(camera));
    }

    pub fn set_render_quality(&mut self, quality: f64) {
        self.config.render_quality = quality.clamp(0.1, 2.0);
        self.draw_list
            .set_permissible_screen_space_error(self.config.permissible_screen_space_error());
        self.send(SchedulerCommand::SetQuality(quality));
    }

    pub fn set_network_reachability(&self, reachable: bool) {
        self.send(SchedulerCommand::SetNetworkReachability(reachable));
    }

    pub fn set_ram_quad_limit(&self, quad_limit: usize) {
        self.send(SchedulerCommand::SetRamQuadLimit(quad_limit));
    }

    pub fn set_gpu_quad_limit(&mut self, device: &wgpu::Device, quad_limit: usize) {
        let dropped = self.tile_manager.set_quad_limit(device, quad_limit);
        if !dropped.is_empty() {
            log::info!("GPU quad limit change dropped {} resident tiles", dropped.len());
        }
    }

    fn send(&self, command: SchedulerCommand) {
        if self.worker.event_tx.send(WorkerEvent::Command(command)).is_err() {
            log::warn!("Tile worker is gone, command dropped");
        }
    }

    // ---------- frame-boundary operations (render thread) ----------

    /// Applies pending residency deliveries. Call once per frame before
    /// recording; the resident map then stays consistent for the frame.
    pub fn apply_gpu_updates(&mut self, queue: &wgpu::Queue) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.worker.terrain_rx.try_recv() {
            self.tile_manager
                .update_gpu_quads(queue, update.new_quads, &update.deleted_quads);
            applied += 1;
        }
        applied
    }

    /// Drains POI deliveries for the label subsystem.
    pub fn poi_updates(&mut self) -> Vec<GpuQuadUpdate<PoiQuad>> {
        let mut updates = Vec::new();
        while let Ok(update) = self.worker.poi_rx.try_recv() {
            updates.push(update);
        }
        updates
    }

    /// The tiles this camera wants drawn. Zoom 0 expands to the root
    /// quad's children, since residency starts one level below the root.
    pub fn draw_set(&self, camera: &Camera) -> HashSet<TileId> {
        let requested = self.draw_list.requested_set(camera);
        let culled = self.draw_list.cull(&requested, camera);
        let mut set = HashSet::with_capacity(culled.len() + 4);
        for id in culled {
            if id.zoom_level == 0 {
                set.extend(id.children());
            } else {
                set.insert(id);
            }
        }
        set
    }

    /// Records the terrain draws for this frame. Returns the number of
    /// draw calls issued.
    pub fn draw(
        &mut self,
        queue: &wgpu::Queue,
        render_pass: &mut wgpu::RenderPass,
        camera: &Camera,
    ) -> usize {
        let uniforms = FrameUniforms::from_camera(camera, self.config.height_scale);
        self.pipeline.write_frame(queue, &uniforms);

        render_pass.set_pipeline(&self.pipeline.pipeline);
        render_pass.set_bind_group(0, &self.pipeline.frame_bind_group, &[]);

        let draw_set = self.draw_set(camera);
        self.tile_manager
            .draw(queue, render_pass, camera, &draw_set, true)
    }

    /// Stops the worker, draining within the shutdown budget. GPU
    /// resources die with this struct on the render thread.
    pub fn shutdown(&mut self) {
        if self.worker.join.is_none() {
            return;
        }
        self.send(SchedulerCommand::Quit);
        if self.worker.stopped_rx.recv_timeout(SHUTDOWN_TIMEOUT).is_err() {
            log::warn!(
                "Tile worker did not stop within {:?}; detaching",
                SHUTDOWN_TIMEOUT
            );
            self.worker.join = None;
            return;
        }
        if let Some(join) = self.worker.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for RenderingContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
