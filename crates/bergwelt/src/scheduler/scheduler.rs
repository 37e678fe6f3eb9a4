use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{event, Level};

use crate::dynamics::Camera;
use crate::helpers::channel::Sender;
use crate::scheduler::{
    GpuQuadUpdate, MemoryCache, QuadAssembler, RateLimiter, SlotLimiter, TileLoadResult,
    DEFAULT_RAM_QUAD_LIMIT, DEFAULT_RATE_CAPACITY, DEFAULT_RATE_REFILL_PER_S,
    DEFAULT_SLOT_CAPACITY,
};
use crate::tile::{
    AabbDecorator, DataQuad, DrawListGenerator, NetworkInfo, TileData, TileId, MAX_ZOOM_GEOMETRY,
};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_zoom: u8,
    pub ram_quad_limit: usize,
    pub slot_capacity: usize,
    pub rate_capacity: f64,
    pub rate_refill_per_s: f64,
    pub debounce: Duration,
    pub retry_max_attempts: u32,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    pub ancestor_padding: u8,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            max_zoom: MAX_ZOOM_GEOMETRY,
            ram_quad_limit: DEFAULT_RAM_QUAD_LIMIT,
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            rate_capacity: DEFAULT_RATE_CAPACITY,
            rate_refill_per_s: DEFAULT_RATE_REFILL_PER_S,
            debounce: Duration::from_millis(100),
            retry_max_attempts: 5,
            retry_base: Duration::from_secs(1),
            retry_cap: Duration::from_secs(30),
            ancestor_padding: 2,
        }
    }
}

/// Turns a complete raw quad into whatever the render side consumes.
pub type QuadDecoder<B, G> = Box<dyn Fn(&DataQuad<B>, &AabbDecorator) -> G + Send>;

/// Hands a child tile to the loader pool. The pool replies through the
/// worker's event channel as a `TileLoadResult`.
pub type TileDispatch = Box<dyn FnMut(TileId) + Send>;

/// Subtype hook: whether a cached quad may ship to the GPU side right
/// now. The default deployment always says yes (presence in the cache is
/// checked by the scheduler itself); the POI deployment gates on the
/// terrain cache.
pub type ShipGate<'a> = &'a dyn Fn(TileId) -> bool;

#[derive(Debug, PartialEq, Eq)]
struct RetryAt {
    at: Instant,
    id: TileId,
}

impl Ord for RetryAt {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.at.cmp(&other.at).then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for RetryAt {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The orchestrator: reacts to camera updates, quad deliveries and
/// reachability changes, drives the slot/rate limiters and the assembler,
/// owns the RAM cache and decides what ships to the GPU side.
///
/// Confined to the worker thread; all inputs arrive as values.
pub struct Scheduler<B, G> {
    settings: SchedulerSettings,
    decorator: Arc<AabbDecorator>,
    draw_list: DrawListGenerator,
    dispatch: TileDispatch,
    decode: QuadDecoder<B, G>,
    gpu_tx: Sender<GpuQuadUpdate<G>>,

    slots: SlotLimiter,
    rate: RateLimiter,
    assembler: QuadAssembler<B>,
    cache: MemoryCache<B>,

    pending_children: VecDeque<TileId>,
    retries: BinaryHeap<Reverse<RetryAt>>,
    attempts: HashMap<u64, u32>,

    latest_camera: Option<Camera>,
    camera_deadline: Option<Instant>,
    last_visible_quads: HashSet<u64>,

    gpu_quads: HashSet<u64>,
    reachable: bool,
    batch_seq: u64,
    diffs_evaluated: u64,
}

impl<B, G> Scheduler<B, G> {
    pub fn new(
        settings: SchedulerSettings,
        decorator: Arc<AabbDecorator>,
        dispatch: TileDispatch,
        decode: QuadDecoder<B, G>,
        gpu_tx: Sender<GpuQuadUpdate<G>>,
        now: Instant,
    ) -> Self {
        let draw_list = DrawListGenerator::new(Arc::clone(&decorator), settings.max_zoom);
        Scheduler {
            slots: SlotLimiter::new(settings.slot_capacity),
            rate: RateLimiter::new(settings.rate_capacity, settings.rate_refill_per_s, now),
            assembler: QuadAssembler::new(),
            cache: MemoryCache::new(settings.ram_quad_limit),
            settings,
            decorator,
            draw_list,
            dispatch,
            decode,
            gpu_tx,
            pending_children: VecDeque::new(),
            retries: BinaryHeap::new(),
            attempts: HashMap::new(),
            latest_camera: None,
            camera_deadline: None,
            last_visible_quads: HashSet::new(),
            gpu_quads: HashSet::new(),
            reachable: true,
            batch_seq: 0,
            diffs_evaluated: 0,
        }
    }

    // ---------- inputs ----------

    /// Coalescing camera input: updates within the debounce window fold
    /// into one evaluation of the latest camera.
    pub fn set_camera(&mut self, camera: Camera, now: Instant) {
        self.latest_camera = Some(camera);
        self.camera_deadline
            .get_or_insert(now + self.settings.debounce);
    }

    pub fn set_quality(&mut self, quality: f64, now: Instant) {
        let threshold = 1.0 / quality.clamp(0.1, 2.0);
        self.draw_list.set_permissible_screen_space_error(threshold);
        if self.latest_camera.is_some() {
            self.camera_deadline.get_or_insert(now);
        }
    }

    pub fn set_reachability(&mut self, reachable: bool, now: Instant) {
        if self.reachable != reachable {
            event!(Level::INFO, reachable, "network reachability changed");
        }
        self.reachable = reachable;
        if reachable {
            self.drain_dispatch(now);
        }
    }

    pub fn set_ram_quad_limit(&mut self, quad_limit: usize) {
        let evicted = self.cache.set_quad_limit(quad_limit);
        let mut update = UpdateBatch::new();
        for id in evicted {
            self.note_evicted(id, &mut update);
        }
        self.flush(update);
    }

    pub fn set_aabb_decorator(&mut self, decorator: Arc<AabbDecorator>) {
        self.decorator = Arc::clone(&decorator);
        self.draw_list.set_aabb_decorator(decorator);
    }

    /// Terminal or transient result for one child tile.
    pub fn on_tile_loaded(&mut self, result: TileLoadResult<B>, now: Instant, gate: ShipGate) {
        let key = result.id.pack();
        if result.status.is_transient() {
            let attempt = self.attempts.get(&key).copied().unwrap_or(0) + 1;
            if attempt <= self.settings.retry_max_attempts {
                self.attempts.insert(key, attempt);
                let delay = self.backoff_delay(attempt);
                self.retries.push(Reverse(RetryAt {
                    at: now + delay,
                    id: result.id,
                }));
                event!(
                    Level::DEBUG,
                    tile = %result.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling tile retry"
                );
                return;
            }
            log::warn!(
                "Tile {} failed after {} attempts, giving up",
                result.id,
                self.settings.retry_max_attempts
            );
        }
        self.attempts.remove(&key);

        let tile = TileData {
            id: result.id,
            network_info: NetworkInfo {
                status: result.status,
                timestamp_ms: result.timestamp_ms,
            },
            payload: result.payload,
        };
        if let Some(quad) = self.assembler.deliver(tile) {
            self.on_quad_complete(quad, now, gate);
        }
    }

    /// Timer-driven work: debounced camera evaluation, due retries and
    /// token-gated dispatch.
    pub fn tick(&mut self, now: Instant, gate: ShipGate) {
        if self.camera_deadline.is_some_and(|d| d <= now) {
            self.camera_deadline = None;
            self.evaluate_camera(now, gate);
        }
        while self.retries.peek().is_some_and(|r| r.0.at <= now) {
            let Reverse(retry) = self.retries.pop().expect("peeked");
            self.pending_children.push_back(retry.id);
        }
        self.drain_dispatch(now);
    }

    /// The earliest instant at which `tick` has something to do.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        let mut deadline = self.camera_deadline;
        if let Some(Reverse(retry)) = self.retries.peek() {
            deadline = Some(deadline.map_or(retry.at, |d| d.min(retry.at)));
        }
        if self.reachable && !self.pending_children.is_empty() {
            let at = self.rate.next_token_at(now).unwrap_or(now);
            deadline = Some(deadline.map_or(at, |d| d.min(at)));
        }
        deadline
    }

    /// Ships cached, still-wanted quads whose gate has newly opened.
    /// Used by deployments whose gate depends on another pipeline.
    pub fn ship_ready(&mut self, gate: ShipGate) {
        let candidates: Vec<TileId> = self
            .last_visible_quads
            .iter()
            .filter(|key| !self.gpu_quads.contains(key))
            .map(|&key| TileId::unpack(key))
            .filter(|id| self.cache.peek(*id))
            .collect();
        let mut update = UpdateBatch::new();
        for id in candidates {
            if gate(id) {
                self.ship_cached(id, &mut update);
            }
        }
        self.flush(update);
    }

    // ---------- introspection (used by wiring and tests) ----------

    pub fn cache_contains(&self, id: TileId) -> bool {
        self.cache.peek(id)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.slots.in_flight_count()
    }

    pub fn pending_dispatch_count(&self) -> usize {
        self.pending_children.len()
    }

    pub fn diffs_evaluated(&self) -> u64 {
        self.diffs_evaluated
    }

    pub fn gpu_quad_count(&self) -> usize {
        self.gpu_quads.len()
    }

    // ---------- internals ----------

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .settings
            .retry_base
            .saturating_mul(1u32 << (attempt - 1).min(16))
            .min(self.settings.retry_cap);
        // full jitter over the exponential ceiling
        Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..=exp.as_secs_f64()))
    }

    /// The quad that delivers this drawable tile.
    fn quad_for(id: TileId) -> TileId {
        id.parent().unwrap_or_else(TileId::root)
    }

    fn evaluate_camera(&mut self, now: Instant, gate: ShipGate) {
        let Some(camera) = self.latest_camera.clone() else {
            return;
        };
        self.diffs_evaluated += 1;
        let _span = tracing::debug_span!("evaluate_camera").entered();

        let requested = self.draw_list.requested_set(&camera);
        let culled = self.draw_list.cull(&requested, &camera);

        // drawable tiles come as quads of four; pad with ancestors so a
        // partially resident view always has a coarser fallback, and keep
        // the root quad as the bootstrap of last resort
        let mut visible: HashSet<TileId> = HashSet::new();
        for tile in &culled {
            let mut quad = Self::quad_for(*tile);
            visible.insert(quad);
            for _ in 0..self.settings.ancestor_padding {
                match quad.parent() {
                    Some(p) => {
                        quad = p;
                        visible.insert(quad);
                    }
                    None => break,
                }
            }
        }
        visible.insert(TileId::root());
        self.last_visible_quads = visible.iter().map(|id| id.pack()).collect();

        let mut update = UpdateBatch::new();
        let mut to_request: Vec<TileId> = Vec::new();
        for quad in &visible {
            if self.cache.contains(*quad) {
                if !self.gpu_quads.contains(&quad.pack()) && gate(*quad) {
                    self.ship_cached(*quad, &mut update);
                }
            } else if !self.slots.is_pending(*quad) && !self.assembler.contains(*quad) {
                to_request.push(*quad);
            }
        }

        // deeper detail first, then by how badly the tile misses its
        // error budget
        to_request.sort_by(|a, b| {
            b.zoom_level.cmp(&a.zoom_level).then(
                self.draw_list
                    .screen_space_error(*b, &camera)
                    .total_cmp(&self.draw_list.screen_space_error(*a, &camera)),
            )
        });

        // a quad that was queued for a previous camera and fell out of
        // view is not worth its slot any more
        for queued in self.slots.queued_ids() {
            if !visible.contains(&queued) {
                self.slots.forget_queued(queued);
            }
        }

        self.batch_seq += 1;
        let request_count = to_request.len();
        for quad in to_request {
            if self.slots.request(quad, self.batch_seq) {
                self.start_quad(quad, now);
            }
        }

        event!(
            Level::DEBUG,
            visible = visible.len(),
            requested = request_count,
            in_flight = self.slots.in_flight_count(),
            cache = self.cache.len(),
            "camera diff evaluated"
        );
        self.flush(update);
    }

    fn start_quad(&mut self, quad: TileId, now: Instant) {
        self.assembler.begin(quad);
        for child in quad.children() {
            self.pending_children.push_back(child);
        }
        self.drain_dispatch(now);
    }

    fn drain_dispatch(&mut self, now: Instant) {
        while self.reachable && !self.pending_children.is_empty() {
            if !self.rate.try_acquire(now) {
                break;
            }
            let child = self.pending_children.pop_front().expect("checked");
            (self.dispatch)(child);
        }
    }

    fn on_quad_complete(&mut self, quad: DataQuad<B>, now: Instant, gate: ShipGate) {
        let quad_id = quad.id;
        if let Some(released) = self.slots.complete(quad_id) {
            self.start_quad(released, now);
        }

        let mut update = UpdateBatch::new();
        for evicted in self.cache.insert(quad) {
            self.note_evicted(evicted, &mut update);
        }
        if self.last_visible_quads.is_empty() || self.last_visible_quads.contains(&quad_id.pack())
        {
            if gate(quad_id) {
                self.ship_cached(quad_id, &mut update);
            }
        }
        self.flush(update);
    }

    fn ship_cached(&mut self, id: TileId, update: &mut UpdateBatch<G>) {
        let Some(quad) = self.cache.get(id) else {
            return;
        };
        let gpu_quad = (self.decode)(quad, &self.decorator);
        update.new_quads.push((id, gpu_quad));
        self.gpu_quads.insert(id.pack());
    }

    fn note_evicted(&mut self, id: TileId, update: &mut UpdateBatch<G>) {
        let key = id.pack();
        if let Some(pos) = update.new_quads.iter().position(|(nid, _)| *nid == id) {
            // admitted and evicted within one batch: net zero, the GPU
            // side must never see it
            update.new_quads.remove(pos);
            self.gpu_quads.remove(&key);
        } else if self.gpu_quads.remove(&key) {
            update.deleted_quads.push(id);
        }
    }

    fn flush(&mut self, update: UpdateBatch<G>) {
        if update.new_quads.is_empty() && update.deleted_quads.is_empty() {
            return;
        }
        let message = GpuQuadUpdate {
            new_quads: update.new_quads.into_iter().map(|(_, g)| g).collect(),
            deleted_quads: update.deleted_quads,
        };
        if self.gpu_tx.send(message).is_err() {
            log::warn!("GPU update receiver is gone, dropping batch");
        }
    }
}

struct UpdateBatch<G> {
    new_quads: Vec<(TileId, G)>,
    deleted_quads: Vec<TileId>,
}

impl<G> UpdateBatch<G> {
    fn new() -> Self {
        UpdateBatch {
            new_quads: Vec::new(),
            deleted_quads: Vec::new(),
        }
    }
}
