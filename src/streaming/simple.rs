//! Outer-ring placeholders
//!
//! The 16 regions two steps away from the viewer are drawn as one coarse
//! quad each. They are kept in their own LRU cache and only frustum tested.
//! A new placeholder starts as a flat footprint spanning the full height
//! range; its image is read on the I/O runtime and swapped in on a later
//! update.

use std::collections::HashMap;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::core::Error;
use crate::core::config::{HeightChannel, StreamingConfig};
use crate::core::types::Vec3;
use crate::math::{Aabb, Frustum};
use crate::streaming::cache::RecentRegionCache;
use crate::streaming::coord::RegionCoord;
use crate::streaming::heightmap::{self, Heightmap, read_heightmap_async};

/// Coarse stand-in for a region outside the active neighborhood
#[derive(Clone, Debug)]
pub struct SimpleTerrain {
    pub coord: RegionCoord,
    pub aabb: Aabb,
    heights: Option<Heightmap>,
    loaded: bool,
}

impl SimpleTerrain {
    /// Flat box over the whole height range, used until the image arrives
    pub fn footprint(coord: RegionCoord, config: &StreamingConfig) -> Self {
        Self {
            coord,
            aabb: footprint_aabb(coord, config, 0.0, config.height_scale),
            heights: None,
            loaded: false,
        }
    }

    /// Finish a placeholder from the outcome of its read. Without heights it
    /// keeps the full-range footprint.
    pub fn from_heights(coord: RegionCoord, config: &StreamingConfig, heights: Option<Heightmap>) -> Self {
        let aabb = match &heights {
            Some(map) if !map.data().is_empty() => {
                let (lo, hi) = map.min_max();
                footprint_aabb(coord, config, lo * config.height_scale, hi * config.height_scale)
            }
            _ => footprint_aabb(coord, config, 0.0, config.height_scale),
        };
        Self {
            coord,
            aabb,
            heights,
            loaded: true,
        }
    }

    pub fn heights(&self) -> Option<&Heightmap> {
        self.heights.as_ref()
    }

    pub fn has_data(&self) -> bool {
        self.heights.is_some()
    }

    /// The read has finished, whether or not it found an image
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

fn footprint_aabb(coord: RegionCoord, config: &StreamingConfig, lo: f32, hi: f32) -> Aabb {
    let size = config.region_size();
    let origin = coord.world_origin(size);
    Aabb::new(origin.extend(lo), Vec3::new(origin.x + size, origin.y + size, hi))
}

/// Read `simple/region{X}x{Y}.png`. Missing or unreadable files give `None`.
async fn read_simple(coord: RegionCoord, path: std::path::PathBuf, channel: HeightChannel) -> Option<Heightmap> {
    match read_heightmap_async(path.clone(), channel).await {
        Ok(Some(map)) => Some(map),
        Ok(None) => {
            log::debug!("Simple terrain for region {}: {}", coord, Error::MissingResource(path));
            None
        }
        Err(e) => {
            log::warn!("Simple terrain {} unreadable: {}", path.display(), e);
            None
        }
    }
}

/// The distance-2 shell around the viewer's region
pub struct SimpleTerrainRing {
    cache: RecentRegionCache<SimpleTerrain>,
    center: Option<RegionCoord>,
    visible: Vec<(RegionCoord, Aabb)>,
    pending: HashMap<RegionCoord, oneshot::Receiver<Option<Heightmap>>>,
    loads: usize,
}

impl SimpleTerrainRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: RecentRegionCache::new(capacity),
            center: None,
            visible: Vec::new(),
            pending: HashMap::new(),
            loads: 0,
        }
    }

    /// Swap in finished reads, start reads for uncached ring coordinates,
    /// then frustum test the ring. Never blocks on I/O.
    pub fn update(
        &mut self,
        center: RegionCoord,
        frustum: &Frustum,
        config: &StreamingConfig,
        handle: &Handle,
    ) -> &[(RegionCoord, Aabb)] {
        if self.center != Some(center) {
            log::trace!("Simple ring recentred on {}", center);
            self.center = Some(center);
        }
        self.collect_finished(config);

        self.visible.clear();
        for coord in center.outer_ring() {
            let aabb = match self.cache.try_get_region(coord) {
                Some(terrain) => terrain.aabb,
                None => {
                    let terrain = SimpleTerrain::footprint(coord, config);
                    let aabb = terrain.aabb;
                    self.start_load(coord, config, handle);
                    if let Some((evicted, _)) = self.cache.cache_region(coord, terrain) {
                        self.pending.remove(&evicted);
                    }
                    aabb
                }
            };
            if frustum.intersects_aabb(&aabb) {
                self.visible.push((coord, aabb));
            }
        }
        &self.visible
    }

    fn start_load(&mut self, coord: RegionCoord, config: &StreamingConfig, handle: &Handle) {
        let (tx, rx) = oneshot::channel();
        let path = heightmap::simple_path(&config.data_root, coord);
        let channel = config.height_channel;
        handle.spawn(async move {
            let _ = tx.send(read_simple(coord, path, channel).await);
        });
        self.pending.insert(coord, rx);
        self.loads += 1;
    }

    fn collect_finished(&mut self, config: &StreamingConfig) {
        let mut finished = Vec::new();
        self.pending.retain(|coord, rx| match rx.try_recv() {
            Err(TryRecvError::Empty) => true,
            Ok(heights) => {
                finished.push((*coord, heights));
                false
            }
            Err(TryRecvError::Closed) => {
                log::warn!(
                    "Simple terrain for region {}: {}",
                    coord,
                    Error::Concurrency("read task ended without a result".into())
                );
                finished.push((*coord, None));
                false
            }
        });

        for (coord, heights) in finished {
            if let Some(terrain) = self.cache.values_mut().find(|t| t.coord == coord) {
                *terrain = SimpleTerrain::from_heights(coord, config, heights);
            }
        }
    }

    /// Placeholders that passed the last frustum test
    pub fn visible(&self) -> &[(RegionCoord, Aabb)] {
        &self.visible
    }

    pub fn get(&mut self, coord: RegionCoord) -> Option<&SimpleTerrain> {
        self.cache.try_get_region(coord).map(|t| &*t)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Reads started so far
    pub fn load_count(&self) -> usize {
        self.loads
    }

    /// Reads still in flight
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.cache.drain();
        self.pending.clear();
        self.visible.clear();
        self.center = None;
    }
}
