//! Region manager: keeps the 3x3 neighborhood around the viewer streamed in
//!
//! Each frame the viewer position picks the center region. When it changes,
//! regions that fell out of the neighborhood are parked in the LRU cache and
//! missing neighbors are loaded (from the cache, a pool of reset instances,
//! or fresh). Regions pushed out of the cache are unloaded and pooled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::{Handle, Runtime};

use crate::core::types::Vec3;
use crate::core::{Camera, Result, StreamingConfig};
use crate::culling::OcclusionOracle;
use crate::math::Aabb;
use crate::render::context::TerrainRenderContext;
use crate::render::renderer::{RenderBatch, ShaderHandle, TerrainRenderer};
use crate::render::texture::HeightTextureSink;
use crate::streaming::cache::RecentRegionCache;
use crate::streaming::coord::RegionCoord;
use crate::streaming::region::{RegionState, TerrainRegion};
use crate::streaming::simple::SimpleTerrainRing;

/// Counters refreshed every frame
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamingStats {
    pub frame: u64,
    pub active: usize,
    pub loading: usize,
    pub cached: usize,
    pub pooled: usize,
    pub visible: usize,
    pub simple_visible: usize,
    /// Totals since creation
    pub loads: usize,
    pub cache_hits: usize,
    pub evictions: usize,
    pub retired: usize,
}

/// What the last center change did
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionReport {
    pub from: Option<RegionCoord>,
    pub to: RegionCoord,
    /// Moved from the active set into the cache
    pub evicted: Vec<RegionCoord>,
    /// Newly made active, whether loaded or reused from the cache
    pub loaded: Vec<RegionCoord>,
    pub cache_hits: Vec<RegionCoord>,
    /// Pushed out of the cache and unloaded
    pub retired: Vec<RegionCoord>,
}

pub struct RegionManager {
    config: Arc<StreamingConfig>,
    /// Taken only when dropped inside another runtime
    runtime: Option<Runtime>,
    handle: Handle,
    context: TerrainRenderContext,
    active: HashMap<RegionCoord, TerrainRegion>,
    cache: RecentRegionCache<TerrainRegion>,
    pool: Vec<TerrainRegion>,
    simple: SimpleTerrainRing,
    current: Option<RegionCoord>,
    visible: Vec<RegionCoord>,
    released: Vec<RegionCoord>,
    stats: StreamingStats,
    last_transition: Option<TransitionReport>,
}

impl RegionManager {
    /// Create a manager with its own I/O runtime
    pub fn new(config: StreamingConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("terrastream-io")
            .build()?;
        log::info!(
            "Region manager: {} chunks per region, region size {}, data at {}",
            config.chunk_count(),
            config.region_size(),
            config.data_root.display()
        );

        Ok(Self {
            cache: RecentRegionCache::new(config.cache_capacity),
            pool: Vec::with_capacity(config.region_pool_capacity),
            simple: SimpleTerrainRing::new(config.simple_cache_capacity),
            config: Arc::new(config),
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            context: TerrainRenderContext::new(),
            active: HashMap::new(),
            current: None,
            visible: Vec::new(),
            released: Vec::new(),
            stats: StreamingStats::default(),
            last_transition: None,
        })
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Per-frame entry point
    pub fn update(&mut self, camera: &Camera, oracle: &dyn OcclusionOracle, dt: f32) -> Result<()> {
        let frame = self.context.begin_frame();
        let center = RegionCoord::from_world(camera.position, self.config.region_size());
        if self.current != Some(center) {
            self.transition(center)?;
        }

        let frustum = camera.frustum();
        self.simple.update(center, &frustum, &self.config, &self.handle);

        self.visible.clear();
        for (coord, region) in &self.active {
            if *coord == center || frustum.intersects_aabb(&region.representative_aabb()) {
                self.visible.push(*coord);
            }
        }
        self.visible.sort_by_key(|c| (*c != center, c.y, c.x));

        for (coord, region) in self.active.iter_mut() {
            if self.visible.contains(coord) {
                region.update(camera, &frustum, oracle, dt)?;
            } else {
                region.poll();
            }
            self.context.set_status(*coord, region.status_line());
        }

        self.refresh_stats(frame);
        Ok(())
    }

    fn transition(&mut self, center: RegionCoord) -> Result<()> {
        let start = Instant::now();
        let handle = self.handle.clone();
        let mut report = TransitionReport {
            from: self.current,
            to: center,
            ..Default::default()
        };

        let mut leaving: Vec<_> = self
            .active
            .keys()
            .filter(|c| c.chebyshev_distance(center) > 1)
            .copied()
            .collect();
        leaving.sort_by_key(|c| (c.y, c.x));
        for coord in leaving {
            let Some(mut region) = self.active.remove(&coord) else {
                continue;
            };
            region.deactivate();
            self.context.clear_status(coord);
            report.evicted.push(coord);
            if let Some((old, displaced)) = self.cache.cache_region(coord, region) {
                self.retire(displaced, &handle);
                report.retired.push(old);
            }
        }

        for coord in center.neighborhood() {
            if self.active.contains_key(&coord) {
                continue;
            }
            let region = match self.cache.take_region(coord) {
                Some(mut region) => {
                    region.activate(&handle)?;
                    report.cache_hits.push(coord);
                    region
                }
                None => {
                    let mut region = match self.pool.pop() {
                        Some(mut pooled) => {
                            pooled.reassign(coord)?;
                            pooled
                        }
                        None => TerrainRegion::new(coord, self.config.clone(), self.context.upload_queue()),
                    };
                    region.begin_load(&handle)?;
                    region
                }
            };
            report.loaded.push(coord);
            self.active.insert(coord, region);
        }

        log::info!(
            "Center {} -> {}: {} evicted, {} loaded ({} from cache), {} retired in {:.2}ms",
            report.from.map(|c| c.to_string()).unwrap_or_else(|| "none".into()),
            center,
            report.evicted.len(),
            report.loaded.len(),
            report.cache_hits.len(),
            report.retired.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        self.stats.loads += report.loaded.len() - report.cache_hits.len();
        self.stats.cache_hits += report.cache_hits.len();
        self.stats.evictions += report.evicted.len();
        self.stats.retired += report.retired.len();
        self.current = Some(center);
        self.last_transition = Some(report);
        Ok(())
    }

    fn retire(&mut self, mut region: TerrainRegion, handle: &Handle) {
        let coord = region.coord();
        region.begin_unload(handle);
        self.released.push(coord);
        if self.pool.len() < self.config.region_pool_capacity {
            self.pool.push(region);
        }
        log::debug!("Region {} retired, pool holds {}", coord, self.pool.len());
    }

    fn refresh_stats(&mut self, frame: u64) {
        self.stats.frame = frame;
        self.stats.active = self.active.len();
        self.stats.loading = self
            .active
            .values()
            .filter(|r| r.state() == RegionState::Loading)
            .count();
        self.stats.cached = self.cache.len();
        self.stats.pooled = self.pool.len();
        self.stats.visible = self.visible.len();
        self.stats.simple_visible = self.simple.visible().len();
    }

    /// World height under `position`, `None` outside the active set
    pub fn height_at(&self, position: Vec3) -> Option<f32> {
        let coord = RegionCoord::from_world(position, self.config.region_size());
        self.active.get(&coord).map(|r| r.height_at(position.truncate()))
    }

    /// Drain staged uploads into textures. Call on the render thread.
    ///
    /// Uploads for regions no longer resident are dropped; a bad upload is
    /// logged and skipped.
    pub fn apply_pending_updates(&mut self, sink: &mut dyn HeightTextureSink) -> Result<usize> {
        for coord in self.released.drain(..) {
            if !self.active.contains_key(&coord) {
                sink.release(coord);
            }
        }

        let mut applied = 0;
        for upload in self.context.upload_queue().drain() {
            if !self.active.contains_key(&upload.coord) && !self.cache.contains(upload.coord) {
                continue;
            }
            let texture = sink.texture_for(upload.coord, upload.resolution, upload.texture_size)?;
            match texture.apply(&upload) {
                Ok(()) => applied += 1,
                Err(e) => log::warn!("Upload for region {} rejected: {}", upload.coord, e),
            }
        }
        Ok(applied)
    }

    /// Submit everything visible. Regions without chunks yet are drawn as
    /// placeholders, as is the outer ring.
    pub fn render(&self, renderer: &mut dyn TerrainRenderer, shader: ShaderHandle, camera: &Camera) -> Result<()> {
        for coord in &self.visible {
            let Some(region) = self.active.get(coord) else {
                continue;
            };
            if region.culling().is_empty() {
                renderer.draw_placeholder(shader, *coord, &region.representative_aabb(), camera)?;
                continue;
            }
            let result = region.visible();
            let batch = RenderBatch {
                coord: *coord,
                aabbs: &result.visible_aabbs,
                items: &result.visible_entities,
                blend: region.blend_params(),
            };
            renderer.draw_region(shader, &batch, camera)?;
        }
        for (coord, aabb) in self.simple.visible() {
            renderer.draw_placeholder(shader, *coord, aabb, camera)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> &StreamingStats {
        &self.stats
    }

    pub fn last_transition(&self) -> Option<&TransitionReport> {
        self.last_transition.as_ref()
    }

    pub fn current_coord(&self) -> Option<RegionCoord> {
        self.current
    }

    /// Active coordinates sorted by `(y, x)`
    pub fn active_coords(&self) -> Vec<RegionCoord> {
        let mut coords: Vec<_> = self.active.keys().copied().collect();
        coords.sort_by_key(|c| (c.y, c.x));
        coords
    }

    /// Cached coordinates, least recently used first
    pub fn cached_coords(&self) -> Vec<RegionCoord> {
        self.cache.coords()
    }

    /// Regions updated this frame, viewer's region first
    pub fn visible_regions(&self) -> &[RegionCoord] {
        &self.visible
    }

    pub fn simple_visible(&self) -> &[(RegionCoord, Aabb)] {
        self.simple.visible()
    }

    pub fn region(&self, coord: RegionCoord) -> Option<&TerrainRegion> {
        self.active.get(&coord)
    }

    pub fn region_mut(&mut self, coord: RegionCoord) -> Option<&mut TerrainRegion> {
        self.active.get_mut(&coord)
    }

    pub fn context(&self) -> &TerrainRenderContext {
        &self.context
    }

    /// Every active region has finished its coarse, chunk and tile loads
    pub fn all_loaded(&self) -> bool {
        self.active.values().all(TerrainRegion::is_fully_loaded)
    }

    /// Advance load pipelines without culling (for headless waits)
    pub fn poll(&mut self) {
        for region in self.active.values_mut() {
            region.poll();
        }
    }

    /// Cancel and wait for every region, active and cached.
    ///
    /// Waiting blocks the calling thread. Called from inside an async
    /// context it only cancels and lets the tasks wind down on their own.
    pub fn shutdown(&mut self) {
        let can_block = Handle::try_current().is_err();
        if !can_block {
            log::warn!("Region manager shut down inside an async context, not waiting for loads");
        }
        let handle = self.handle.clone();
        let regions = self
            .active
            .drain()
            .chain(self.cache.drain())
            .collect::<Vec<_>>();
        let count = regions.len();
        for (_, mut region) in regions {
            if can_block {
                region.begin_unload(&handle);
            } else {
                region.cancel_loads();
            }
        }
        self.pool.clear();
        self.simple.clear();
        self.visible.clear();
        self.current = None;
        if count > 0 {
            log::info!("Region manager shut down, {} regions unloaded", count);
        }
    }
}

impl Drop for RegionManager {
    fn drop(&mut self) {
        self.shutdown();
        // Dropping a runtime blocks, which panics inside another runtime
        if let (Some(runtime), Ok(_)) = (self.runtime.take(), Handle::try_current()) {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::culling::AlwaysVisible;
    use crate::render::renderer::StatsRenderer;
    use crate::render::texture::CpuTextureSink;
    use crate::streaming::heightmap::{self, Heightmap, save_heightmap};
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(root: &std::path::Path) -> StreamingConfig {
        StreamingConfig {
            chunk_size: 10.0,
            half_chunks_per_side: 2,
            height_scale: 100.0,
            tile_grid: 2,
            cache_capacity: 4,
            region_pool_capacity: 2,
            ..StreamingConfig::with_root(root)
        }
    }

    fn camera_at(x: f32, y: f32) -> Camera {
        Camera::look_at(Vec3::new(x, y, 80.0), Vec3::new(x, y + 50.0, 40.0), Vec3::Z)
    }

    fn settle(manager: &mut RegionManager) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !manager.all_loaded() {
            assert!(Instant::now() < deadline, "regions did not finish loading");
            manager.poll();
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_first_frame_loads_neighborhood() {
        let dir = TempDir::new().unwrap();
        let mut manager = RegionManager::new(config(dir.path())).unwrap();
        manager.update(&camera_at(20.0, 20.0), &AlwaysVisible, 0.016).unwrap();

        let report = manager.last_transition().unwrap();
        assert_eq!(report.loaded.len(), 9);
        assert!(report.evicted.is_empty());
        assert_eq!(manager.active_coords().len(), 9);
        assert_eq!(manager.visible_regions()[0], RegionCoord::new(0, 0));
        assert_eq!(manager.stats().loads, 9);
    }

    #[test]
    fn test_move_evicts_into_cache_and_hits_on_return() {
        let dir = TempDir::new().unwrap();
        let mut manager = RegionManager::new(config(dir.path())).unwrap();
        manager.update(&camera_at(20.0, 20.0), &AlwaysVisible, 0.016).unwrap();
        settle(&mut manager);

        manager.update(&camera_at(60.0, 20.0), &AlwaysVisible, 0.016).unwrap();
        let report = manager.last_transition().unwrap().clone();
        assert_eq!(report.evicted.len(), 3);
        assert_eq!(report.loaded.len(), 3);
        assert!(report.evicted.iter().all(|c| c.x == -1));
        assert!(report.loaded.iter().all(|c| c.x == 2));
        assert_eq!(manager.cached_coords().len(), 3);

        manager.update(&camera_at(20.0, 20.0), &AlwaysVisible, 0.016).unwrap();
        let back = manager.last_transition().unwrap();
        assert_eq!(back.cache_hits.len(), 3);
        assert!(back.cache_hits.iter().all(|c| c.x == -1));
    }

    #[test]
    fn test_cache_overflow_retires_into_pool() {
        let dir = TempDir::new().unwrap();
        let mut manager = RegionManager::new(config(dir.path())).unwrap();
        for step in 0..4 {
            manager
                .update(&camera_at(20.0 + 40.0 * step as f32, 20.0), &AlwaysVisible, 0.016)
                .unwrap();
        }
        // Three moves evict nine regions into a cache of four
        assert_eq!(manager.cached_coords().len(), 4);
        assert_eq!(manager.stats().retired, 5);
        assert!(manager.stats().pooled <= 2);
        assert!(manager.stats().loads <= 18);
    }

    #[test]
    fn test_uploads_render_and_height() {
        let dir = TempDir::new().unwrap();
        let coord = RegionCoord::new(0, 0);
        save_heightmap(&heightmap::coarse_path(dir.path(), coord), &Heightmap::from_fn(17, 17, |_, _| 0.5)).unwrap();

        let mut manager = RegionManager::new(config(dir.path())).unwrap();
        let camera = camera_at(20.0, 20.0);
        manager.update(&camera, &AlwaysVisible, 0.016).unwrap();
        settle(&mut manager);
        manager.update(&camera, &AlwaysVisible, 0.016).unwrap();

        let mut sink = CpuTextureSink::new();
        assert_eq!(manager.apply_pending_updates(&mut sink).unwrap(), 1);
        assert!(sink.get(coord, crate::render::context::Resolution::Low).is_some());

        let mut renderer = StatsRenderer::default();
        manager.render(&mut renderer, ShaderHandle(0), &camera).unwrap();
        assert!(renderer.regions >= 1);
        assert!(renderer.boxes > 0);

        let h = manager.height_at(Vec3::new(20.0, 20.0, 0.0)).unwrap();
        assert!((h - 100.0 * 128.0 / 255.0).abs() < 1e-3);
        assert!(manager.height_at(Vec3::new(500.0, 500.0, 0.0)).is_none());
    }

    #[test]
    fn test_shutdown_empties_everything() {
        let dir = TempDir::new().unwrap();
        let mut manager = RegionManager::new(config(dir.path())).unwrap();
        manager.update(&camera_at(20.0, 20.0), &AlwaysVisible, 0.016).unwrap();
        manager.update(&camera_at(60.0, 20.0), &AlwaysVisible, 0.016).unwrap();
        manager.shutdown();
        assert!(manager.active_coords().is_empty());
        assert!(manager.cached_coords().is_empty());
        assert!(manager.current_coord().is_none());
    }

    #[test]
    fn test_outer_ring_fills_in_without_blocking() {
        let dir = TempDir::new().unwrap();
        let far = RegionCoord::new(0, 2);
        save_heightmap(&heightmap::simple_path(dir.path(), far), &Heightmap::from_fn(4, 4, |_, _| 0.0)).unwrap();

        let mut manager = RegionManager::new(config(dir.path())).unwrap();
        let camera = camera_at(20.0, 20.0);
        manager.update(&camera, &AlwaysVisible, 0.016).unwrap();
        // Placeholders are usable on the first frame, before any read lands
        let first = manager.simple_visible().iter().find(|(c, _)| *c == far).map(|(_, aabb)| *aabb);
        assert_eq!(first.map(|aabb| aabb.max.z), Some(100.0));

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            manager.update(&camera, &AlwaysVisible, 0.016).unwrap();
            let settled = manager.simple_visible().iter().any(|(c, aabb)| *c == far && aabb.max.z == 0.0);
            if settled {
                break;
            }
            assert!(Instant::now() < deadline, "placeholder read never swapped in");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_shutdown_and_drop_inside_async_context() {
        let dir = TempDir::new().unwrap();
        let mut manager = RegionManager::new(config(dir.path())).unwrap();
        manager.update(&camera_at(20.0, 20.0), &AlwaysVisible, 0.016).unwrap();

        let outer = tokio::runtime::Runtime::new().unwrap();
        outer.block_on(async {
            manager.shutdown();
        });
        assert!(manager.active_coords().is_empty());
        assert!(manager.current_coord().is_none());

        manager.update(&camera_at(20.0, 20.0), &AlwaysVisible, 0.016).unwrap();
        assert_eq!(manager.active_coords().len(), 9);
        outer.block_on(async move {
            drop(manager);
        });
    }
}
