//! One streaming region: height data, chunk grid, culling and cross-fade
//!
//! Loading is a small pipeline driven by [`TerrainRegion::poll`]:
//!
//! 1. the coarse heightmap is read on the I/O runtime and installed (chunk
//!    height bounds are computed as part of that),
//! 2. the chunk creator builds every chunk box on the rayon pool,
//! 3. the boxes are registered into the region's BVH.
//!
//! Fine tiles stream independently. When the tile queue drains, the region
//! cross-fades from coarse to fine heights and then drops the coarse buffer.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;

use crate::core::config::{HeightChannel, StreamingConfig};
use crate::core::types::{Vec2, Vec3};
use crate::core::{Camera, Error, Result};
use crate::culling::{CullResult, OcclusionOracle, SpatialCulling};
use crate::math::{Aabb, Frustum};
use crate::render::context::UploadQueue;
use crate::render::renderer::BlendParams;
use crate::streaming::cancel::CancelToken;
use crate::streaming::chunk::{Chunk, ChunkBox, Entity, EntityId, RegionItem};
use crate::streaming::chunk_creator::{ChunkCreator, ChunkGridInput};
use crate::streaming::coord::RegionCoord;
use crate::streaming::heightmap::{self, read_heightmap_async};
use crate::streaming::terrain_data::{LowResInstall, TerrainData, prepare_low_res};

type SharedData = Arc<RwLock<TerrainData>>;

fn read_data(data: &SharedData) -> RwLockReadGuard<'_, TerrainData> {
    data.read().unwrap_or_else(|poisoned| {
        log::warn!("Terrain data lock poisoned, continuing with last state");
        poisoned.into_inner()
    })
}

fn write_data(data: &SharedData) -> RwLockWriteGuard<'_, TerrainData> {
    data.write().unwrap_or_else(|poisoned| {
        log::warn!("Terrain data lock poisoned, continuing with last state");
        poisoned.into_inner()
    })
}

/// Lifecycle of a region instance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionState {
    Unloaded,
    Loading,
    Active,
    /// Parked in the recent-region cache
    UnActive,
    Unloading,
}

/// Linear coarse-to-fine cross-fade
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendState {
    blending: bool,
    timer: f32,
    factor: f32,
    duration: f32,
}

impl BlendState {
    pub fn new(duration: f32) -> Self {
        Self {
            blending: false,
            timer: 0.0,
            factor: 0.0,
            duration,
        }
    }

    pub fn start(&mut self) {
        self.blending = true;
        self.timer = 0.0;
        self.factor = 0.0;
    }

    /// Advance by `dt` seconds. Returns `true` on the frame the fade completes.
    pub fn advance(&mut self, dt: f32) -> bool {
        if !self.blending {
            return false;
        }
        self.timer += dt.max(0.0);
        if self.timer >= self.duration {
            self.factor = 1.0;
            self.blending = false;
            return true;
        }
        self.factor = (self.timer / self.duration).clamp(0.0, 1.0);
        false
    }

    pub fn is_blending(&self) -> bool {
        self.blending
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn timer(&self) -> f32 {
        self.timer
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.duration);
    }
}

/// What the coarse read produced
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CoarseOutcome {
    Loaded,
    Missing,
    Cancelled,
}

enum LoadStage {
    Idle,
    Coarse(oneshot::Receiver<Result<CoarseOutcome>>),
    Chunks,
    Done,
    /// Stopped by cancellation or a task fault; a reload starts over
    Interrupted,
}

impl LoadStage {
    fn name(&self) -> &'static str {
        match self {
            LoadStage::Idle => "idle",
            LoadStage::Coarse(_) => "coarse",
            LoadStage::Chunks => "chunks",
            LoadStage::Done => "done",
            LoadStage::Interrupted => "interrupted",
        }
    }
}

/// One square of world terrain
pub struct TerrainRegion {
    coord: RegionCoord,
    config: Arc<StreamingConfig>,
    uploads: UploadQueue,
    state: RegionState,
    data: SharedData,
    creator: ChunkCreator,
    culling: SpatialCulling<RegionItem>,
    chunks: Vec<Chunk>,
    representative: Entity,
    blend: BlendState,
    stage: LoadStage,
    tiles: Option<oneshot::Receiver<Result<usize>>>,
    tiles_applied: usize,
    tasks: Vec<JoinHandle<()>>,
    cancel: CancelToken,
}

impl TerrainRegion {
    pub fn new(coord: RegionCoord, config: Arc<StreamingConfig>, uploads: UploadQueue) -> Self {
        let data = TerrainData::new(coord, config.clone(), uploads.clone());
        let representative = Self::footprint_entity(coord, &config);
        Self {
            coord,
            blend: BlendState::new(config.blend_duration),
            config,
            uploads,
            state: RegionState::Unloaded,
            data: Arc::new(RwLock::new(data)),
            creator: ChunkCreator::new(),
            culling: SpatialCulling::new(),
            chunks: Vec::new(),
            representative,
            stage: LoadStage::Idle,
            tiles: None,
            tiles_applied: 0,
            tasks: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    fn representative_id(coord: RegionCoord) -> EntityId {
        EntityId(((coord.x as u32 as u64) << 32) | coord.y as u32 as u64)
    }

    /// Whole-region box spanning the full height range
    fn footprint_entity(coord: RegionCoord, config: &StreamingConfig) -> Entity {
        let size = config.region_size();
        let origin = coord.world_origin(size);
        Entity::new(
            Self::representative_id(coord),
            format!("region_{}", coord),
            Aabb::new(origin.extend(0.0), Vec3::new(origin.x + size, origin.y + size, config.height_scale)),
        )
    }

    pub fn coord(&self) -> RegionCoord {
        self.coord
    }

    pub fn state(&self) -> RegionState {
        self.state
    }

    /// Start the load pipeline on `handle`'s runtime.
    pub fn begin_load(&mut self, handle: &Handle) -> Result<()> {
        if self.state != RegionState::Unloaded {
            return Err(Error::InvalidState(format!(
                "region {} asked to load while {:?}",
                self.coord, self.state
            )));
        }

        self.state = RegionState::Loading;
        self.cancel = CancelToken::new();
        self.representative = Self::footprint_entity(self.coord, &self.config);

        let (coarse_tx, coarse_rx) = oneshot::channel();
        let data = self.data.clone();
        let (coord, config) = (self.coord, self.config.clone());
        let cancel = self.cancel.clone();
        self.tasks.push(handle.spawn(async move {
            let _ = coarse_tx.send(load_coarse(data, coord, config, cancel).await);
        }));
        self.stage = LoadStage::Coarse(coarse_rx);

        let (tiles_tx, tiles_rx) = oneshot::channel();
        let job = TileJob {
            data: self.data.clone(),
            root: self.config.data_root.clone(),
            coord: self.coord,
            tile_grid: self.config.tile_grid,
            channel: self.config.height_channel,
            per_yield: self.config.tiles_per_task_yield.max(1),
            cancel: self.cancel.clone(),
        };
        self.tasks.push(handle.spawn(async move {
            let _ = tiles_tx.send(stream_tiles(job).await);
        }));
        self.tiles = Some(tiles_rx);

        log::debug!("Region {}: load started", self.coord);
        Ok(())
    }

    /// Advance the load pipeline without culling.
    pub fn poll(&mut self) {
        self.poll_stage();
        self.poll_tiles();
        if self.state == RegionState::Loading
            && matches!(self.stage, LoadStage::Done | LoadStage::Interrupted)
        {
            self.state = RegionState::Active;
        }
    }

    fn poll_stage(&mut self) {
        self.stage = match std::mem::replace(&mut self.stage, LoadStage::Idle) {
            LoadStage::Coarse(mut rx) => match rx.try_recv() {
                Err(TryRecvError::Empty) => LoadStage::Coarse(rx),
                Ok(Ok(CoarseOutcome::Loaded)) => self.on_coarse_loaded(),
                Ok(Ok(CoarseOutcome::Missing)) => {
                    log::warn!("Region {}: no coarse heightmap, staying flat", self.coord);
                    LoadStage::Done
                }
                Ok(Ok(CoarseOutcome::Cancelled)) => LoadStage::Interrupted,
                Ok(Err(e)) => {
                    log::error!("Region {}: coarse load failed: {}", self.coord, e);
                    LoadStage::Done
                }
                Err(TryRecvError::Closed) => {
                    log::error!(
                        "Region {}: {}",
                        self.coord,
                        Error::Concurrency("coarse load task ended without a result".into())
                    );
                    LoadStage::Interrupted
                }
            },
            LoadStage::Chunks => {
                if let Some(boxes) = self.creator.get_result() {
                    self.register_chunks(boxes);
                    LoadStage::Done
                } else if self.creator.is_aborted() {
                    LoadStage::Interrupted
                } else {
                    LoadStage::Chunks
                }
            }
            other => other,
        };
    }

    fn poll_tiles(&mut self) {
        let Some(rx) = self.tiles.as_mut() else {
            return;
        };
        let outcome = match rx.try_recv() {
            Err(TryRecvError::Empty) => return,
            Ok(outcome) => outcome,
            Err(TryRecvError::Closed) => Err(Error::Concurrency("tile task ended without a result".into())),
        };
        self.tiles = None;

        match outcome {
            Ok(applied) => {
                self.tiles_applied = applied;
                let ready = read_data(&self.data).is_high_res_loaded();
                if ready {
                    log::info!("Region {}: {} fine tiles loaded, blending", self.coord, applied);
                    self.blend.start();
                }
            }
            Err(e) => log::error!("Region {}: tile streaming failed: {}", self.coord, e),
        }
    }

    fn on_coarse_loaded(&mut self) -> LoadStage {
        let (bounds, range) = {
            let data = read_data(&self.data);
            (data.chunk_bounds().to_vec(), data.height_range())
        };

        if let Some((mut lo, mut hi)) = range {
            let extent = self.config.min_chunk_height_extent;
            if hi - lo < extent {
                let mid = (lo + hi) * 0.5;
                lo = mid - extent * 0.5;
                hi = mid + extent * 0.5;
            }
            let aabb = &mut self.representative.aabb;
            aabb.min.z = lo;
            aabb.max.z = hi;
        }

        let input = ChunkGridInput {
            origin: self.coord.world_origin(self.config.region_size()),
            chunk_size: self.config.chunk_size,
            chunks_per_side: self.config.chunks_per_side(),
            bounds,
            min_height_extent: self.config.min_chunk_height_extent,
        };
        match self.creator.start(input) {
            Ok(()) => LoadStage::Chunks,
            Err(e) => {
                log::error!("Region {}: chunk creation not started: {}", self.coord, e);
                LoadStage::Interrupted
            }
        }
    }

    fn register_chunks(&mut self, boxes: Vec<ChunkBox>) {
        self.chunks = boxes
            .iter()
            .map(|b| Chunk::new(format!("chunk_{}_{}", self.coord, b.index), b))
            .collect();
        let entries = boxes
            .iter()
            .map(|b| (b.aabb, RegionItem::Chunk(b.index)))
            .collect();
        self.culling.rebuild(entries);
        log::debug!("Region {}: {} chunks registered", self.coord, self.chunks.len());
    }

    /// Per-frame work: pipeline, two-stage cull, cross-fade.
    pub fn update(
        &mut self,
        camera: &Camera,
        frustum: &Frustum,
        oracle: &dyn OcclusionOracle,
        dt: f32,
    ) -> Result<()> {
        self.poll();

        if !self.culling.is_empty() {
            self.culling.frustum_pass(frustum.planes());
            self.culling
                .occlusion_pass(oracle, &camera.view_matrix(), &camera.view_projection())?;
            self.culling.extract()?;
        }

        if self.blend.advance(dt) && write_data(&self.data).swap_to_high_res() {
            log::info!("Region {}: now high resolution", self.coord);
        }
        Ok(())
    }

    /// Park in the cache. In-flight loads are asked to stop.
    pub fn deactivate(&mut self) {
        if matches!(self.state, RegionState::Active | RegionState::Loading) {
            self.cancel_loads();
            self.state = RegionState::UnActive;
        }
    }

    /// Ask background work to stop without waiting for it
    pub fn cancel_loads(&self) {
        self.cancel.cancel();
        self.creator.cancel();
    }

    /// Bring back from the cache. A region whose load was interrupted is
    /// reset and loaded again from scratch.
    pub fn activate(&mut self, handle: &Handle) -> Result<()> {
        if self.state != RegionState::UnActive {
            return Err(Error::InvalidState(format!(
                "region {} activated while {:?}",
                self.coord, self.state
            )));
        }

        if self.cancel.is_cancelled() {
            self.wait_for_tasks(handle);
            self.creator.wait();
            self.poll_stage();
            self.poll_tiles();
            if !self.is_fully_loaded() {
                log::debug!("Region {}: cached load was interrupted, reloading", self.coord);
                self.clear_contents();
                self.state = RegionState::Unloaded;
                return self.begin_load(handle);
            }
        }

        self.state = match self.stage {
            LoadStage::Done => RegionState::Active,
            _ => RegionState::Loading,
        };
        Ok(())
    }

    /// Coarse data, chunks and every queued tile are in
    pub fn is_fully_loaded(&self) -> bool {
        matches!(self.stage, LoadStage::Done)
            && self.tiles.is_none()
            && read_data(&self.data).is_all_tiles_loaded()
    }

    fn wait_for_tasks(&mut self, handle: &Handle) {
        for task in self.tasks.drain(..) {
            if let Err(e) = handle.block_on(task) {
                log::error!("Region {}: {}", self.coord, Error::Concurrency(e.to_string()));
            }
        }
    }

    fn clear_contents(&mut self) {
        self.creator.reset();
        self.culling.clear();
        self.chunks.clear();
        write_data(&self.data).reset(self.coord);
        self.uploads.discard_region(self.coord);
        self.stage = LoadStage::Idle;
        self.tiles = None;
        self.tiles_applied = 0;
        self.blend.reset();
        self.representative = Self::footprint_entity(self.coord, &self.config);
    }

    /// Cancel and wait for every background task, then drop all contents.
    /// Blocks until in-flight work has observed the cancellation.
    pub fn begin_unload(&mut self, handle: &Handle) {
        self.state = RegionState::Unloading;
        self.cancel_loads();
        self.wait_for_tasks(handle);
        self.creator.wait();
        self.clear_contents();
        self.state = RegionState::Unloaded;
        log::debug!("Region {}: unloaded", self.coord);
    }

    /// Point an unloaded instance at a new coordinate for reuse
    pub fn reassign(&mut self, coord: RegionCoord) -> Result<()> {
        if self.state != RegionState::Unloaded {
            return Err(Error::InvalidState(format!(
                "region {} reassigned while {:?}",
                self.coord, self.state
            )));
        }
        self.coord = coord;
        self.clear_contents();
        Ok(())
    }

    pub fn representative(&self) -> &Entity {
        &self.representative
    }

    pub fn representative_aabb(&self) -> Aabb {
        self.representative.aabb
    }

    pub fn chunk(&self, index: u32) -> Option<&Chunk> {
        self.chunks.get(index as usize)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Attach an entity to a chunk and make it cullable.
    ///
    /// An id already present in the chunk is rejected; remove it first to
    /// replace it.
    pub fn add_entity(&mut self, chunk_index: u32, entity: Entity) -> Result<()> {
        let coord = self.coord;
        let Some(chunk) = self.chunks.get_mut(chunk_index as usize) else {
            return Err(Error::InvalidState(format!(
                "region {} has no chunk {} yet",
                coord, chunk_index
            )));
        };
        if chunk.entity(entity.id).is_some() {
            return Err(Error::InvalidState(format!(
                "region {} chunk {} already holds entity {:?}",
                coord, chunk_index, entity.id
            )));
        }
        let entity = Arc::new(entity);
        chunk.add_entity(entity.clone());
        self.culling.insert(
            entity.aabb,
            RegionItem::Entity {
                chunk: chunk_index,
                entity,
            },
        );
        Ok(())
    }

    /// Detach an entity and drop its leaf from the BVH
    pub fn remove_entity(&mut self, chunk_index: u32, id: EntityId) -> Result<Option<Arc<Entity>>> {
        let Some(chunk) = self.chunks.get_mut(chunk_index as usize) else {
            return Err(Error::InvalidState(format!(
                "region {} has no chunk {} yet",
                self.coord, chunk_index
            )));
        };
        let removed = chunk.remove_entity(id);
        if removed.is_some() {
            self.rebuild_culling();
        }
        Ok(removed)
    }

    /// Rebuild the BVH from the chunk boxes and their attached entities
    fn rebuild_culling(&mut self) {
        let mut entries: Vec<(Aabb, RegionItem)> = self
            .chunks
            .iter()
            .map(|c| (c.aabb, RegionItem::Chunk(c.index)))
            .collect();
        for chunk in &self.chunks {
            entries.extend(chunk.entities().map(|e| {
                (
                    e.aabb,
                    RegionItem::Entity {
                        chunk: chunk.index,
                        entity: e.clone(),
                    },
                )
            }));
        }
        self.culling.rebuild(entries);
    }

    /// Leaves that survived the last cull
    pub fn visible(&self) -> &CullResult<RegionItem> {
        self.culling.last_result()
    }

    /// Chunks whose own box survived the last cull
    pub fn visible_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.culling
            .last_result()
            .visible_entities
            .iter()
            .filter_map(|item| match item {
                RegionItem::Chunk(index) => self.chunks.get(*index as usize),
                RegionItem::Entity { .. } => None,
            })
    }

    pub fn culling(&self) -> &SpatialCulling<RegionItem> {
        &self.culling
    }

    /// World height at `world` (x/y), blending resolutions by the current factor
    pub fn height_at(&self, world: Vec2) -> f32 {
        let local = world - self.coord.world_origin(self.config.region_size());
        read_data(&self.data).get_height(local, self.blend.factor())
    }

    pub fn blend(&self) -> &BlendState {
        &self.blend
    }

    pub fn blend_params(&self) -> BlendParams {
        let data = read_data(&self.data);
        BlendParams {
            factor: self.blend.factor(),
            blending: self.blend.is_blending(),
            high_res_ready: data.is_high_res_loaded(),
        }
    }

    /// Read access to the height data
    pub fn with_data<R>(&self, f: impl FnOnce(&TerrainData) -> R) -> R {
        f(&read_data(&self.data))
    }

    pub fn chunk_progress(&self) -> f32 {
        match self.stage {
            LoadStage::Done => 1.0,
            _ => self.creator.progress(),
        }
    }

    /// Short human-readable status for overlays
    pub fn status_line(&self) -> String {
        let data = read_data(&self.data);
        format!(
            "{:?} stage={} chunks={:.0}% tiles={:.0}% blend={:.2}",
            self.state,
            self.stage.name(),
            self.chunk_progress() * 100.0,
            data.tile_progress() * 100.0,
            self.blend.factor()
        )
    }
}

/// Read and prepare the coarse map off the lock, then install it under a
/// short write lock.
async fn load_coarse(
    data: SharedData,
    coord: RegionCoord,
    config: Arc<StreamingConfig>,
    cancel: CancelToken,
) -> Result<CoarseOutcome> {
    let path = heightmap::coarse_path(&config.data_root, coord);
    let Some(map) = read_heightmap_async(path.clone(), config.height_channel).await? else {
        log::warn!("Region {}: {}", coord, Error::MissingResource(path));
        return Ok(CoarseOutcome::Missing);
    };
    if cancel.is_cancelled() {
        return Ok(CoarseOutcome::Cancelled);
    }
    let prepared = tokio::task::spawn_blocking(move || prepare_low_res(coord, map, &config))
        .await
        .map_err(|e| Error::Concurrency(format!("coarse prepare task failed: {}", e)))??;
    if cancel.is_cancelled() {
        return Ok(CoarseOutcome::Cancelled);
    }
    install_coarse(&data, prepared)?;
    Ok(CoarseOutcome::Loaded)
}

fn install_coarse(data: &SharedData, prepared: LowResInstall) -> Result<()> {
    write_data(data).install_low_res(prepared)
}

struct TileJob {
    data: SharedData,
    root: std::path::PathBuf,
    coord: RegionCoord,
    tile_grid: u32,
    channel: HeightChannel,
    per_yield: usize,
    cancel: CancelToken,
}

fn pop_tile(data: &SharedData) -> Option<(u32, u32)> {
    write_data(data).next_pending_tile()
}

fn apply_tile(data: &SharedData, tx: u32, ty: u32, tile: heightmap::Heightmap) -> Result<()> {
    write_data(data).apply_tile(tx, ty, tile)
}

/// Pull tiles until the queue is empty or the job is cancelled.
/// Bad or missing tiles are logged and skipped.
async fn stream_tiles(job: TileJob) -> Result<usize> {
    let (root, coord, grid) = (job.root.clone(), job.coord, job.tile_grid);
    let tiles = tokio::task::spawn_blocking(move || heightmap::list_tiles(&root, coord, grid))
        .await
        .map_err(|e| Error::Concurrency(format!("tile listing task failed: {}", e)))?;
    write_data(&job.data).queue_tiles(tiles);

    let mut applied = 0;
    let mut since_yield = 0;
    while !job.cancel.is_cancelled() {
        let Some((tx, ty)) = pop_tile(&job.data) else {
            break;
        };
        let path = heightmap::tile_path(&job.root, job.coord, tx, ty);
        match read_heightmap_async(path.clone(), job.channel).await {
            Ok(Some(tile)) => match apply_tile(&job.data, tx, ty, tile) {
                Ok(()) => applied += 1,
                Err(e) => log::warn!("Region {}: skipping tile ({}, {}): {}", job.coord, tx, ty, e),
            },
            Ok(None) => log::warn!("Region {}: tile skipped: {}", job.coord, Error::MissingResource(path)),
            Err(e) => log::warn!("Region {}: tile {} unreadable: {}", job.coord, path.display(), e),
        }

        since_yield += 1;
        if since_yield >= job.per_yield {
            since_yield = 0;
            tokio::task::yield_now().await;
        }
    }
    Ok(applied)
}
