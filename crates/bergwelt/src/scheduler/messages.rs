use crate::dynamics::Camera;
use crate::tile::{NetworkStatus, TileId};

/// Control input to the worker. Values move; nothing is shared.
#[derive(Debug, Clone)]
pub enum SchedulerCommand {
    CameraUpdated(Camera),
    SetQuality(f64),
    SetNetworkReachability(bool),
    SetRamQuadLimit(usize),
    Quit,
}

/// One completed fetch, reported from the loader pool back to the worker.
#[derive(Debug)]
pub struct TileLoadResult<B> {
    pub id: TileId,
    pub payload: Option<B>,
    pub status: NetworkStatus,
    pub timestamp_ms: u64,
}

/// Batched residency change shipped to the render thread. For every id
/// the `new` event always precedes any `deleted` event, and a batch never
/// contains the same quad on both sides.
#[derive(Debug)]
pub struct GpuQuadUpdate<G> {
    pub new_quads: Vec<G>,
    pub deleted_quads: Vec<TileId>,
}

impl<G> GpuQuadUpdate<G> {
    pub fn is_empty(&self) -> bool {
        self.new_quads.is_empty() && self.deleted_quads.is_empty()
    }
}
